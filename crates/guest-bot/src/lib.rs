//! Guest bot — transport wiring around the concierge core.
//!
//! Everything here is a thin bridge: configuration from the environment, a
//! long-polling Telegram client, an OpenAI-compatible completion client, the
//! knowledge-base CSV loader, the gate-call telephony client, and the
//! dispatch loop that feeds events into [`concierge::EscalationRouter`].

pub mod config;
pub mod dispatcher;
pub mod gate;
pub mod openai;
pub mod sheets;
pub mod telegram;

pub use config::{BotConfig, GateConfig, KbSource, MatcherKind, OpenAiConfig};
pub use dispatcher::{classify, Dispatcher, Event};
pub use gate::{CallSession, CallStatus, GateCaller};
pub use openai::OpenAiClient;
pub use telegram::TelegramClient;
