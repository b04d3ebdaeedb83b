//! Semantic matching through an external completion service.
//!
//! The service receives the full candidate list and the guest's question, and
//! is instructed to return either the exact text of one candidate or a
//! sentinel. Its output is trusted only as far as membership: any response
//! that is not a knowledge-base key after normalization is `Unmatched`. That
//! membership check is the safety property of this strategy — the bot never
//! delivers an answer the operator did not put in the sheet.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::knowledge::{normalize, KnowledgeBase};
use crate::matching::{MatchResult, MatchStrategy};

/// Sentinel the service is told to return when no candidate fits.
pub const UNKNOWN_SENTINEL: &str = "unknown question";

/// Default bound on a single completion call.
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(15);

/// One-shot text-completion call to an external reasoning service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Matching strategy that delegates candidate selection to the completion
/// service. Timeouts and transport failures degrade to `Unmatched` — the
/// failure direction is always "ask the human", never "guess".
pub struct SemanticMatch {
    client: Arc<dyn CompletionClient>,
    timeout: Duration,
}

impl SemanticMatch {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            timeout: DEFAULT_COMPLETION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the candidate-selection prompt for the service.
    fn build_prompt(questions: &[String], user_text: &str) -> String {
        let mut prompt = String::from(
            "You match a guest's question against a fixed list of known questions.\n\
             Known questions:\n",
        );
        for q in questions {
            prompt.push_str("- ");
            prompt.push_str(q);
            prompt.push('\n');
        }
        prompt.push_str(&format!(
            "\nGuest question: {user_text}\n\
             Reply with the exact text of the matching known question, \
             or exactly \"{UNKNOWN_SENTINEL}\" if none matches. Reply with nothing else."
        ));
        prompt
    }
}

#[async_trait]
impl MatchStrategy for SemanticMatch {
    fn name(&self) -> &'static str {
        "semantic"
    }

    async fn find(&self, user_text: &str, kb: &KnowledgeBase) -> MatchResult {
        let needle = normalize(user_text);
        if needle.is_empty() || kb.is_empty() {
            return MatchResult::Unmatched;
        }

        let prompt = Self::build_prompt(kb.all_questions(), &needle);
        let response = match tokio::time::timeout(self.timeout, self.client.complete(&prompt)).await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(error = %e, "Completion call failed; treating as unmatched");
                return MatchResult::Unmatched;
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "Completion call timed out; treating as unmatched");
                return MatchResult::Unmatched;
            }
        };

        let candidate = normalize(&response);
        if candidate == UNKNOWN_SENTINEL {
            return MatchResult::Unmatched;
        }
        match kb.lookup(&candidate) {
            Some(answer) => MatchResult::Matched(answer.to_string()),
            None => {
                warn!(response = %candidate, "Completion returned text outside the candidate set");
                MatchResult::Unmatched
            }
        }
    }
}
