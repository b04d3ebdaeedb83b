//! Integration tests for the escalation router.
//!
//! Drives the full question → escalate → operator-reply loop against a
//! recording fake transport, validating the correlation invariants:
//! at-most-one delivery, no entry on a failed post, no delivery for
//! blank or unmatched replies.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use concierge::{
    ChatId, ChatTransport, CorrelationStore, EscalationId, EscalationRouter, ExactMatch,
    FuzzyMatch, KnowledgeBase, MatchPipeline, QuestionOutcome, ReplyOutcome, Requester,
    UserId,
};

const OPERATOR: ChatId = ChatId(-100);

/// Fake transport that records every outbound message and hands out
/// sequential message ids.
struct RecordingTransport {
    sent: Mutex<Vec<(ChatId, String)>>,
    next_id: AtomicI64,
    fail_operator_posts: AtomicBool,
}

impl RecordingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(500),
            fail_operator_posts: AtomicBool::new(false),
        })
    }

    fn messages_to(&self, chat: ChatId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == chat)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(&self, chat: ChatId, text: &str) -> Result<i64> {
        if chat == OPERATOR && self.fail_operator_posts.load(Ordering::SeqCst) {
            anyhow::bail!("operator chat unreachable");
        }
        self.sent.lock().unwrap().push((chat, text.to_string()));
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn reply_message(&self, chat: ChatId, _reply_to: i64, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push((chat, text.to_string()));
        Ok(())
    }
}

fn wifi_kb() -> KnowledgeBase {
    let mut kb = KnowledgeBase::new();
    kb.insert("есть ли wifi", "да, пароль указан в приветственном письме");
    kb
}

fn router(kb: KnowledgeBase, transport: Arc<RecordingTransport>) -> EscalationRouter {
    let pipeline = MatchPipeline::new().with(ExactMatch).with(FuzzyMatch::default());
    EscalationRouter::new(kb, pipeline, CorrelationStore::default(), transport, OPERATOR)
}

fn guest(user: i64) -> Requester {
    Requester {
        user: UserId(user),
        chat: ChatId(user),
    }
}

/// Test: a known question is answered directly, no correlation created
#[tokio::test]
async fn known_question_is_answered_without_escalation() {
    let transport = RecordingTransport::new();
    let router = router(wifi_kb(), Arc::clone(&transport));

    let outcome = router.handle_question(guest(42), "Есть ли Wifi").await.unwrap();

    assert_eq!(outcome, QuestionOutcome::Answered);
    assert_eq!(router.pending_count(), 0);
    assert_eq!(
        transport.messages_to(ChatId(42)),
        vec!["да, пароль указан в приветственном письме".to_string()]
    );
    assert!(transport.messages_to(OPERATOR).is_empty());
}

/// Test: with an empty knowledge base every question escalates, creating
/// exactly one correlation entry
#[tokio::test]
async fn empty_kb_escalates_with_single_entry() {
    let transport = RecordingTransport::new();
    let router = router(KnowledgeBase::new(), Arc::clone(&transport));

    let outcome = router
        .handle_question(guest(42), "можно с котом?")
        .await
        .unwrap();

    assert!(matches!(outcome, QuestionOutcome::Escalated(_)));
    assert_eq!(router.pending_count(), 1);

    let operator_msgs = transport.messages_to(OPERATOR);
    assert_eq!(operator_msgs.len(), 1);
    assert!(operator_msgs[0].contains("можно с котом?"));
    assert!(operator_msgs[0].contains("42"));
    // The guest got a forwarding acknowledgment.
    assert_eq!(transport.messages_to(ChatId(42)).len(), 1);
}

/// Test: the full loop — escalation 501 for guest 42, operator reply reaches
/// the guest, second reply finds nothing
#[tokio::test]
async fn operator_reply_reaches_original_guest_exactly_once() {
    let transport = RecordingTransport::new();
    let router = router(KnowledgeBase::new(), Arc::clone(&transport));

    let outcome = router
        .handle_question(guest(42), "во сколько заезд?")
        .await
        .unwrap();
    let escalation = match outcome {
        QuestionOutcome::Escalated(id) => id,
        other => panic!("expected escalation, got {other:?}"),
    };
    assert_eq!(escalation, EscalationId(501));

    let reply = router
        .handle_operator_reply(escalation, "Заезд в 14:00")
        .await
        .unwrap();
    assert_eq!(reply, ReplyOutcome::Delivered(guest(42)));
    assert!(transport
        .messages_to(ChatId(42))
        .contains(&"Заезд в 14:00".to_string()));

    // Second reply to the same escalation: operator gets a notice, the guest
    // gets nothing more.
    let guest_msgs_before = transport.messages_to(ChatId(42)).len();
    let second = router
        .handle_operator_reply(escalation, "Заезд в 15:00")
        .await
        .unwrap();
    assert_eq!(second, ReplyOutcome::NoPendingQuestion);
    assert_eq!(transport.messages_to(ChatId(42)).len(), guest_msgs_before);
}

/// Test: an empty or whitespace-only operator reply is never delivered
#[tokio::test]
async fn blank_operator_reply_is_ignored() {
    let transport = RecordingTransport::new();
    let router = router(KnowledgeBase::new(), Arc::clone(&transport));

    let outcome = router.handle_question(guest(7), "вопрос").await.unwrap();
    let escalation = match outcome {
        QuestionOutcome::Escalated(id) => id,
        other => panic!("expected escalation, got {other:?}"),
    };

    let reply = router.handle_operator_reply(escalation, "   ").await.unwrap();
    assert_eq!(reply, ReplyOutcome::Ignored);
    // Entry still pending; a real reply afterwards still works.
    assert_eq!(router.pending_count(), 1);
    let reply = router
        .handle_operator_reply(escalation, "настоящий ответ")
        .await
        .unwrap();
    assert!(matches!(reply, ReplyOutcome::Delivered(_)));
}

/// Test: empty guest input is ignored outright
#[tokio::test]
async fn blank_question_is_ignored() {
    let transport = RecordingTransport::new();
    let router = router(wifi_kb(), Arc::clone(&transport));

    let outcome = router.handle_question(guest(42), "  \n ").await.unwrap();
    assert_eq!(outcome, QuestionOutcome::Ignored);
    assert!(transport.sent.lock().unwrap().is_empty());
}

/// Test: a failed operator-chat post creates no correlation entry and tells
/// the guest forwarding failed
#[tokio::test]
async fn failed_escalation_post_leaves_no_entry() {
    let transport = RecordingTransport::new();
    transport.fail_operator_posts.store(true, Ordering::SeqCst);
    let router = router(KnowledgeBase::new(), Arc::clone(&transport));

    let outcome = router
        .handle_question(guest(42), "вопрос без ответа")
        .await
        .unwrap();

    assert_eq!(outcome, QuestionOutcome::EscalationFailed);
    assert_eq!(router.pending_count(), 0);
    let guest_msgs = transport.messages_to(ChatId(42));
    assert_eq!(guest_msgs.len(), 1);
    assert!(guest_msgs[0].contains("Не получилось"));
}

/// Test: concurrent replies to the same escalation deliver exactly once
#[tokio::test]
async fn concurrent_replies_deliver_exactly_once() {
    let transport = RecordingTransport::new();
    let router = Arc::new(router(KnowledgeBase::new(), Arc::clone(&transport)));

    let outcome = router.handle_question(guest(42), "вопрос").await.unwrap();
    let escalation = match outcome {
        QuestionOutcome::Escalated(id) => id,
        other => panic!("expected escalation, got {other:?}"),
    };
    let guest_msgs_before = transport.messages_to(ChatId(42)).len();

    let a = {
        let router = Arc::clone(&router);
        tokio::spawn(async move { router.handle_operator_reply(escalation, "ответ А").await })
    };
    let b = {
        let router = Arc::clone(&router);
        tokio::spawn(async move { router.handle_operator_reply(escalation, "ответ Б").await })
    };
    let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());

    let delivered = [&a, &b]
        .iter()
        .filter(|o| matches!(o, ReplyOutcome::Delivered(_)))
        .count();
    assert_eq!(delivered, 1, "exactly one reply may win the take");
    assert_eq!(
        [&a, &b]
            .iter()
            .filter(|o| matches!(o, ReplyOutcome::NoPendingQuestion))
            .count(),
        1
    );
    assert_eq!(transport.messages_to(ChatId(42)).len(), guest_msgs_before + 1);
}
