//! Error taxonomy with severity classification.
//!
//! Every failure in the core maps to one of a small set of variants, and the
//! caller can ask how bad it is without string matching. The rule throughout
//! is "degrade toward the human": nothing here retries, and only a broken
//! configuration is allowed to stop the process.
//!
//! | Variant            | Severity | Effect                                  |
//! |--------------------|----------|-----------------------------------------|
//! | Configuration      | Fatal    | startup aborts                          |
//! | KnowledgeSource    | Degraded | empty knowledge base, everything escalates |
//! | MatchService       | Degraded | that one question is treated as unmatched |
//! | Transport          | Notice   | surfaced to the affected party          |

use thiserror::Error;

/// How a failure affects the running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The process must not proceed serving traffic.
    Fatal,
    /// The process keeps running with reduced capability.
    Degraded,
    /// User-visible but harmless; logged and reported, nothing else.
    Notice,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::Degraded => write!(f, "degraded"),
            Self::Notice => write!(f, "notice"),
        }
    }
}

/// Unified error type for the concierge core.
#[derive(Debug, Error)]
pub enum ConciergeError {
    /// Required credentials or identifiers are missing or malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The knowledge-base source could not be read or parsed.
    #[error("Knowledge source error: {0}")]
    KnowledgeSource(String),

    /// The external matching service failed (network, timeout, bad response).
    #[error("Match service error: {0}")]
    MatchService(String),

    /// A chat-transport call failed.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl ConciergeError {
    /// Classify this error for shutdown / degradation decisions.
    pub fn severity(&self) -> Severity {
        match self {
            Self::Configuration(_) => Severity::Fatal,
            Self::KnowledgeSource(_) => Severity::Degraded,
            Self::MatchService(_) => Severity::Degraded,
            Self::Transport(_) => Severity::Notice,
        }
    }

    /// Returns `true` if the process must abort on this error.
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}
