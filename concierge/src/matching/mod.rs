//! Matching strategies — decide whether a question is already answerable.
//!
//! All strategies share one contract: normalize the user's text the same way
//! knowledge-base keys are normalized, then return a single best answer or
//! nothing. Never a candidate list, and never a fabricated answer — every
//! failure mode lands on [`MatchResult::Unmatched`], which routes the
//! question to a human.
//!
//! # Composition
//!
//! ```text
//! question
//!   ├─ ExactMatch hit            → Matched (cheapest, cannot hallucinate)
//!   ├─ configured fallback hit   → Matched (fuzzy ratio or semantic call)
//!   └─ everything missed/failed  → Unmatched → escalate to operator
//! ```

pub mod semantic;

use async_trait::async_trait;

use crate::knowledge::{normalize, KnowledgeBase};

pub use semantic::{CompletionClient, SemanticMatch};

/// Outcome of a single matching attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    /// The stored answer for the matched question.
    Matched(String),
    /// No knowledge-base entry corresponds to the question.
    Unmatched,
}

impl MatchResult {
    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched(_))
    }
}

/// A single matching algorithm over the knowledge base.
#[async_trait]
pub trait MatchStrategy: Send + Sync {
    /// Strategy name for logging.
    fn name(&self) -> &'static str;

    async fn find(&self, user_text: &str, kb: &KnowledgeBase) -> MatchResult;
}

/// O(1) exact lookup after normalization. Preferred first tier: it is the
/// cheapest strategy and the only one that cannot be wrong.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatch;

#[async_trait]
impl MatchStrategy for ExactMatch {
    fn name(&self) -> &'static str {
        "exact"
    }

    async fn find(&self, user_text: &str, kb: &KnowledgeBase) -> MatchResult {
        match kb.lookup(user_text) {
            Some(answer) => MatchResult::Matched(answer.to_string()),
            None => MatchResult::Unmatched,
        }
    }
}

/// Default similarity threshold; matches the original deployment.
pub const FUZZY_THRESHOLD: f64 = 0.6;

/// Best similarity ratio over all keys, accepted at or above a fixed
/// threshold. Ties break toward the first key encountered at the maximum
/// score, which is stable because [`KnowledgeBase::all_questions`] iterates
/// in load order.
#[derive(Debug, Clone, Copy)]
pub struct FuzzyMatch {
    threshold: f64,
}

impl FuzzyMatch {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for FuzzyMatch {
    fn default() -> Self {
        Self::new(FUZZY_THRESHOLD)
    }
}

#[async_trait]
impl MatchStrategy for FuzzyMatch {
    fn name(&self) -> &'static str {
        "fuzzy"
    }

    async fn find(&self, user_text: &str, kb: &KnowledgeBase) -> MatchResult {
        let needle = normalize(user_text);
        if needle.is_empty() {
            return MatchResult::Unmatched;
        }

        let mut best: Option<(&String, f64)> = None;
        for key in kb.all_questions() {
            let score = strsim::normalized_levenshtein(&needle, key);
            let better = match best {
                Some((_, best_score)) => score > best_score,
                None => true,
            };
            if better {
                best = Some((key, score));
            }
        }

        match best {
            Some((key, score)) if score >= self.threshold => {
                match kb.lookup(key) {
                    Some(answer) => MatchResult::Matched(answer.to_string()),
                    None => MatchResult::Unmatched,
                }
            }
            _ => MatchResult::Unmatched,
        }
    }
}

/// Ordered strategy chain; the first `Matched` wins.
pub struct MatchPipeline {
    strategies: Vec<Box<dyn MatchStrategy>>,
}

impl MatchPipeline {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    pub fn with(mut self, strategy: impl MatchStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Run strategies in order against the knowledge base.
    pub async fn find(&self, user_text: &str, kb: &KnowledgeBase) -> MatchResult {
        for strategy in &self.strategies {
            if let MatchResult::Matched(answer) = strategy.find(user_text, kb).await {
                tracing::debug!(strategy = strategy.name(), "Question matched");
                return MatchResult::Matched(answer);
            }
        }
        MatchResult::Unmatched
    }
}

impl Default for MatchPipeline {
    fn default() -> Self {
        Self::new().with(ExactMatch)
    }
}
