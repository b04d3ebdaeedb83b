//! Guest Concierge Core
//!
//! This library holds the only part of the guest bot with real invariants:
//! the escalation router and its collaborators.
//!
//! - `knowledge`: normalized question → answer snapshot loaded at startup
//! - `matching`: interchangeable strategies (exact, fuzzy, semantic) that
//!   decide whether a question is already answerable
//! - `correlation`: the pending-escalation store linking an operator-channel
//!   message id back to the guest who asked
//! - `router`: the state machine that answers, escalates, and completes the
//!   loop when the operator replies
//!
//! Transport and external services appear only as traits ([`ChatTransport`],
//! [`CompletionClient`]); the binary crate wires real clients in.

pub mod correlation;
pub mod error;
pub mod knowledge;
pub mod matching;
pub mod router;

pub use correlation::{CorrelationStore, EscalationId, PendingEscalation, Requester};
pub use error::{ConciergeError, Severity};
pub use knowledge::{normalize, KnowledgeBase};
pub use matching::{
    CompletionClient, ExactMatch, FuzzyMatch, MatchPipeline, MatchResult, MatchStrategy,
    SemanticMatch,
};
pub use router::{ChatId, ChatTransport, EscalationRouter, QuestionOutcome, ReplyOutcome, UserId};
