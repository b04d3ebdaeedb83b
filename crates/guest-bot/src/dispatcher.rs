//! Event dispatch — classify inbound updates and drive the router.
//!
//! Classification is a pure function so the routing rules stay testable
//! without a transport: only a message inside the operator chat that is an
//! explicit reply becomes an operator reply; everything else in that chat is
//! chatter and is ignored. A guest message needs a sender and text to count
//! as a question.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

use concierge::{ChatId, EscalationId, EscalationRouter, Requester, UserId};

use crate::gate::{CallStatus, GateCaller};
use crate::telegram::{Message, TelegramClient};

/// Greeting for `/start`.
const GREETING: &str =
    "Привет! Я помощник гостевого дома. Задайте вопрос — отвечу сам или передам хозяину.";
const GATE_NOT_CONFIGURED: &str = "Звонок на ворота не настроен.";
const GATE_CALLING: &str = "Звоню на ворота…";
const GATE_OPENING: &str = "Ворота открываются.";
const GATE_CALL_FAILED: &str = "Звонок на ворота не прошёл.";
const GATE_STATUS_UNKNOWN: &str = "Статус звонка на ворота неизвестен, проверьте ворота.";

/// How often and how long the gate-call status is polled after `/open`.
const GATE_POLL_INTERVAL: Duration = Duration::from_secs(5);
const GATE_POLL_ATTEMPTS: u32 = 6;

/// What an inbound message means to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A guest asked something.
    GuestQuestion { requester: Requester, text: String },
    /// The operator replied to an escalation message.
    OperatorReply {
        escalation: EscalationId,
        text: String,
    },
    /// `/start` in a guest chat.
    StartCommand { chat: ChatId },
    /// `/open` in the operator chat.
    OpenGateCommand,
    /// Anything else — non-text, operator chatter, unknown commands.
    Ignored,
}

/// Classify one inbound message.
pub fn classify(message: &Message, operator_chat: ChatId) -> Event {
    let text = match message.text.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return Event::Ignored,
    };
    let chat = ChatId(message.chat.id);

    if chat == operator_chat {
        if is_command(text, "open") {
            return Event::OpenGateCommand;
        }
        // Only explicit replies correlate back to a guest; ordinary
        // operator-chat messages are not ours to interpret.
        if let Some(ref replied) = message.reply_to_message {
            return Event::OperatorReply {
                escalation: EscalationId(replied.message_id),
                text: text.to_string(),
            };
        }
        return Event::Ignored;
    }

    if is_command(text, "start") {
        return Event::StartCommand { chat };
    }
    if text.starts_with('/') {
        return Event::Ignored;
    }

    match message.from.as_ref() {
        Some(user) => Event::GuestQuestion {
            requester: Requester {
                user: UserId(user.id),
                chat,
            },
            text: text.to_string(),
        },
        None => Event::Ignored,
    }
}

/// True for `/name`, the group-chat mention form `/name@botname`, and either
/// followed by arguments.
fn is_command(text: &str, name: &str) -> bool {
    let first = text.split_whitespace().next().unwrap_or("");
    let first = first.split_once('@').map_or(first, |(cmd, _)| cmd);
    first.strip_prefix('/') == Some(name)
}

/// Operator-facing report once the status-poll window closes.
fn final_gate_report(terminal: Option<CallStatus>) -> &'static str {
    match terminal {
        Some(CallStatus::Answered) => GATE_OPENING,
        Some(_) => GATE_CALL_FAILED,
        None => GATE_STATUS_UNKNOWN,
    }
}

/// Drives the long-poll loop and feeds events into the router.
pub struct Dispatcher {
    telegram: Arc<TelegramClient>,
    router: EscalationRouter,
    gate: Option<GateCaller>,
    operator_chat: ChatId,
    poll_timeout_secs: u64,
}

impl Dispatcher {
    pub fn new(
        telegram: Arc<TelegramClient>,
        router: EscalationRouter,
        gate: Option<GateCaller>,
        operator_chat: ChatId,
        poll_timeout_secs: u64,
    ) -> Self {
        Self {
            telegram,
            router,
            gate,
            operator_chat,
            poll_timeout_secs,
        }
    }

    /// Poll for updates until stopped. With `once`, process a single batch
    /// and return (smoke-test mode).
    pub async fn run(&self, once: bool) -> Result<()> {
        let mut offset = 0i64;
        loop {
            let updates = match self
                .telegram
                .get_updates(offset, self.poll_timeout_secs)
                .await
            {
                Ok(u) => u,
                Err(e) => {
                    warn!(error = %e, "getUpdates failed; backing off");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            for update in updates {
                offset = update.update_id + 1;
                let message = match update.message {
                    Some(m) => m,
                    None => continue,
                };
                if let Err(e) = self.handle(&message).await {
                    // One bad message must never stop the loop.
                    error!(
                        chat = message.chat.id,
                        error = %e,
                        "Failed to handle message"
                    );
                }
            }

            if once {
                return Ok(());
            }
        }
    }

    async fn handle(&self, message: &Message) -> Result<()> {
        match classify(message, self.operator_chat) {
            Event::GuestQuestion { requester, text } => {
                let outcome = self.router.handle_question(requester, &text).await?;
                info!(user = %requester.user, ?outcome, "Guest question handled");
            }
            Event::OperatorReply { escalation, text } => {
                let outcome = self.router.handle_operator_reply(escalation, &text).await?;
                info!(escalation = %escalation, ?outcome, "Operator reply handled");
            }
            Event::StartCommand { chat } => {
                self.telegram.send(chat.0, GREETING, None).await?;
            }
            Event::OpenGateCommand => self.open_gate().await?,
            Event::Ignored => {}
        }
        Ok(())
    }

    async fn open_gate(&self) -> Result<()> {
        let gate = match self.gate {
            Some(ref g) => g.clone(),
            None => {
                self.telegram
                    .send(self.operator_chat.0, GATE_NOT_CONFIGURED, None)
                    .await?;
                return Ok(());
            }
        };

        self.telegram
            .send(self.operator_chat.0, GATE_CALLING, None)
            .await?;
        let session = match gate.open_gate().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Gate call failed");
                self.telegram
                    .send(
                        self.operator_chat.0,
                        &format!("Не получилось позвонить на ворота: {e}"),
                        None,
                    )
                    .await?;
                return Ok(());
            }
        };
        info!(session = %session.id, "Gate call placed");

        // Progress arrives out of band; report the terminal state when it
        // shows up, without blocking the dispatch loop. An exhausted poll
        // window still produces a report — the operator must never be left
        // with only the "calling" message.
        let telegram = Arc::clone(&self.telegram);
        let operator_chat = self.operator_chat;
        tokio::spawn(async move {
            let mut terminal = None;
            for _ in 0..GATE_POLL_ATTEMPTS {
                tokio::time::sleep(GATE_POLL_INTERVAL).await;
                match gate.call_status(&session.id).await {
                    Ok(status) if status.is_terminal() => {
                        terminal = Some(status);
                        break;
                    }
                    Ok(status) => {
                        info!(session = %session.id, ?status, "Gate call in progress");
                    }
                    Err(e) => {
                        warn!(session = %session.id, error = %e, "Gate status poll failed");
                    }
                }
            }
            let text = final_gate_report(terminal);
            if let Err(e) = telegram.send(operator_chat.0, text, None).await {
                warn!(error = %e, "Failed to report gate status");
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::{Chat, User};

    const OPERATOR: ChatId = ChatId(-100500);

    fn message(chat: i64, from: Option<i64>, text: Option<&str>, reply_to: Option<i64>) -> Message {
        Message {
            message_id: 1000,
            from: from.map(|id| User { id, username: None }),
            chat: Chat { id: chat },
            text: text.map(|t| t.to_string()),
            reply_to_message: reply_to.map(|id| {
                Box::new(Message {
                    message_id: id,
                    from: None,
                    chat: Chat { id: chat },
                    text: None,
                    reply_to_message: None,
                })
            }),
        }
    }

    #[test]
    fn guest_text_becomes_a_question() {
        let msg = message(42, Some(42), Some("есть ли wifi?"), None);
        match classify(&msg, OPERATOR) {
            Event::GuestQuestion { requester, text } => {
                assert_eq!(requester.user, UserId(42));
                assert_eq!(requester.chat, ChatId(42));
                assert_eq!(text, "есть ли wifi?");
            }
            other => panic!("expected question, got {other:?}"),
        }
    }

    #[test]
    fn operator_reply_carries_the_replied_message_id() {
        let msg = message(-100500, Some(1), Some("Заезд в 14:00"), Some(501));
        assert_eq!(
            classify(&msg, OPERATOR),
            Event::OperatorReply {
                escalation: EscalationId(501),
                text: "Заезд в 14:00".into(),
            }
        );
    }

    #[test]
    fn operator_chatter_without_reply_is_ignored() {
        let msg = message(-100500, Some(1), Some("обычное сообщение в группе"), None);
        assert_eq!(classify(&msg, OPERATOR), Event::Ignored);
    }

    #[test]
    fn start_command_is_recognized_in_guest_chat() {
        let msg = message(42, Some(42), Some("/start"), None);
        assert_eq!(classify(&msg, OPERATOR), Event::StartCommand { chat: ChatId(42) });
    }

    #[test]
    fn open_command_only_works_in_operator_chat() {
        let op = message(-100500, Some(1), Some("/open"), None);
        assert_eq!(classify(&op, OPERATOR), Event::OpenGateCommand);

        let guest = message(42, Some(42), Some("/open"), None);
        assert_eq!(classify(&guest, OPERATOR), Event::Ignored);
    }

    #[test]
    fn non_text_and_blank_messages_are_ignored() {
        assert_eq!(classify(&message(42, Some(42), None, None), OPERATOR), Event::Ignored);
        assert_eq!(
            classify(&message(42, Some(42), Some("   "), None), OPERATOR),
            Event::Ignored
        );
    }

    #[test]
    fn guest_message_without_sender_is_ignored() {
        let msg = message(42, None, Some("вопрос"), None);
        assert_eq!(classify(&msg, OPERATOR), Event::Ignored);
    }

    #[test]
    fn unknown_guest_command_is_ignored() {
        let msg = message(42, Some(42), Some("/help"), None);
        assert_eq!(classify(&msg, OPERATOR), Event::Ignored);
    }

    #[test]
    fn command_mention_form_is_recognized() {
        let msg = message(42, Some(42), Some("/start@guesthouse_bot"), None);
        assert_eq!(classify(&msg, OPERATOR), Event::StartCommand { chat: ChatId(42) });

        let op = message(-100500, Some(1), Some("/open@guesthouse_bot"), None);
        assert_eq!(classify(&op, OPERATOR), Event::OpenGateCommand);
    }

    #[test]
    fn command_matching_requires_exact_name() {
        assert!(is_command("/open", "open"));
        assert!(is_command("/open сейчас", "open"));
        assert!(is_command("/open@bot сейчас", "open"));
        assert!(!is_command("/opened", "open"));
        assert!(!is_command("open", "open"));
    }

    #[test]
    fn exhausted_poll_window_reports_unknown_status() {
        assert_eq!(final_gate_report(Some(CallStatus::Answered)), GATE_OPENING);
        assert_eq!(final_gate_report(Some(CallStatus::Failed)), GATE_CALL_FAILED);
        assert_eq!(final_gate_report(None), GATE_STATUS_UNKNOWN);
    }
}
