//! Escalation router — answer, escalate, or complete the loop.
//!
//! Per-inquiry state machine:
//!
//! ```text
//! New ── pipeline hit ──────────────► Matched   (answer sent, terminal)
//!  │
//!  └─ miss ─► Escalated ── operator reply ─► Resolved (terminal)
//!                │
//!                └─ post to operator chat fails → no correlation entry,
//!                   guest told forwarding failed
//! ```
//!
//! Ordering invariant: the correlation entry is created only after the
//! operator-chat post has succeeded and returned a message id. A reply that
//! finds no entry (already answered, expired, or never ours) produces an
//! operator-facing notice, never a delivery.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::correlation::{CorrelationStore, EscalationId, PendingEscalation, Requester};
use crate::knowledge::KnowledgeBase;
use crate::matching::{MatchPipeline, MatchResult};

/// Transport chat identifier (a private guest chat or the operator group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message id returned by the transport for a sent message.
pub type MessageId = i64;

/// Narrow seam over the chat transport. The router drives it; the binary
/// crate implements it against the real Bot API.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a message; returns the transport's id for the posted message.
    async fn send_message(&self, chat: ChatId, text: &str) -> Result<MessageId>;

    /// Send a message as an explicit reply to an earlier one.
    async fn reply_message(&self, chat: ChatId, reply_to: MessageId, text: &str) -> Result<()>;
}

/// What `handle_question` did, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionOutcome {
    /// Empty or non-text input; nothing happened.
    Ignored,
    /// The pipeline matched; the stored answer was sent.
    Answered,
    /// Escalated to the operator chat under this message id.
    Escalated(EscalationId),
    /// The operator-chat post failed; the guest was told, no entry created.
    EscalationFailed,
}

/// What `handle_operator_reply` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// Empty reply text; nothing happened.
    Ignored,
    /// The reply reached the guest who asked.
    Delivered(Requester),
    /// No pending escalation under that id; the operator was told.
    NoPendingQuestion,
}

/// Orchestrates knowledge base, match pipeline, correlation store and
/// transport for the full question/reply loop.
pub struct EscalationRouter {
    kb: KnowledgeBase,
    pipeline: MatchPipeline,
    store: CorrelationStore,
    transport: Arc<dyn ChatTransport>,
    operator_chat: ChatId,
}

/// Acknowledgment sent to the guest once their question is with the operator.
const FORWARDED_ACK: &str = "Я передал ваш вопрос хозяину, ответ придёт сюда.";
/// Sent to the guest when the forward itself failed.
const FORWARD_FAILED: &str =
    "Не получилось передать вопрос хозяину, попробуйте ещё раз чуть позже.";
/// Confirmation posted back into the operator chat after delivery.
const DELIVERED_ACK: &str = "Ответ доставлен гостю.";
/// Operator notice when a reply matches no pending question.
const NO_PENDING: &str = "Не нашёл ожидающего вопроса для этого сообщения.";

impl EscalationRouter {
    pub fn new(
        kb: KnowledgeBase,
        pipeline: MatchPipeline,
        store: CorrelationStore,
        transport: Arc<dyn ChatTransport>,
        operator_chat: ChatId,
    ) -> Self {
        Self {
            kb,
            pipeline,
            store,
            transport,
            operator_chat,
        }
    }

    /// Handle an inbound guest question.
    pub async fn handle_question(
        &self,
        requester: Requester,
        raw_text: &str,
    ) -> Result<QuestionOutcome> {
        let text = raw_text.trim();
        if text.is_empty() {
            return Ok(QuestionOutcome::Ignored);
        }

        if let MatchResult::Matched(answer) = self.pipeline.find(text, &self.kb).await {
            self.transport.send_message(requester.chat, &answer).await?;
            info!(user = %requester.user, "Question answered from knowledge base");
            return Ok(QuestionOutcome::Answered);
        }

        // Miss: forward to the operator. The correlation entry exists only
        // once the post has succeeded.
        let escalation_text = format!("Вопрос от гостя {}:\n{}", requester.user, text);
        let message_id = match self
            .transport
            .send_message(self.operator_chat, &escalation_text)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(user = %requester.user, error = %e, "Failed to post escalation");
                self.transport
                    .send_message(requester.chat, FORWARD_FAILED)
                    .await?;
                return Ok(QuestionOutcome::EscalationFailed);
            }
        };

        let id = EscalationId(message_id);
        self.store.put(id, PendingEscalation::new(requester));
        self.transport
            .send_message(requester.chat, FORWARDED_ACK)
            .await?;
        info!(user = %requester.user, escalation = %id, "Question escalated to operator");
        Ok(QuestionOutcome::Escalated(id))
    }

    /// Handle an operator message that is an explicit reply to an escalation.
    ///
    /// Callers must have already checked that the message is a reply inside
    /// the operator chat; ordinary operator-chat chatter never reaches here.
    pub async fn handle_operator_reply(
        &self,
        escalation: EscalationId,
        reply_text: &str,
    ) -> Result<ReplyOutcome> {
        let text = reply_text.trim();
        if text.is_empty() {
            return Ok(ReplyOutcome::Ignored);
        }

        let pending = match self.store.take(escalation) {
            Some(p) => p,
            None => {
                self.transport
                    .reply_message(self.operator_chat, escalation.0, NO_PENDING)
                    .await?;
                info!(escalation = %escalation, "Operator reply matched no pending question");
                return Ok(ReplyOutcome::NoPendingQuestion);
            }
        };

        self.transport
            .send_message(pending.requester.chat, text)
            .await?;
        self.transport
            .reply_message(self.operator_chat, escalation.0, DELIVERED_ACK)
            .await?;
        info!(
            escalation = %escalation,
            user = %pending.requester.user,
            "Operator reply delivered"
        );
        Ok(ReplyOutcome::Delivered(pending.requester))
    }

    /// Pending escalations currently held (observability).
    pub fn pending_count(&self) -> usize {
        self.store.len()
    }
}
