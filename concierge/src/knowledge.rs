//! Knowledge base — normalized question → answer snapshot.
//!
//! Built once at startup from a tabular source and treated as immutable for
//! the rest of the process. An empty source, or one where the question/answer
//! columns cannot be identified, yields an empty (degraded) knowledge base
//! rather than an error; with nothing to match, every question escalates.

use std::collections::HashMap;

use tracing::warn;

/// Normalize text for storage and comparison: trim and Unicode-lowercase.
///
/// This is the single normalization used everywhere — keys at load time,
/// lookups, strategy inputs, and semantic-service responses.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Header substrings that identify the question column.
const QUESTION_HEADERS: &[&str] = &["question", "вопрос"];
/// Header substrings that identify the answer column.
const ANSWER_HEADERS: &[&str] = &["answer", "ответ"];

/// Read-only mapping from normalized question text to answer text.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    entries: HashMap<String, String>,
    /// Normalized keys in load order. Fuzzy tie-breaks and the semantic
    /// prompt both need a fixed iteration order.
    order: Vec<String>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a knowledge base from tabular rows.
    ///
    /// The question column is the first header containing a question-like
    /// substring (case-insensitive), likewise the answer column. Rows missing
    /// either field are skipped; duplicate normalized keys keep the last
    /// write. Unidentifiable columns yield an empty knowledge base.
    pub fn from_rows(headers: &[String], rows: &[Vec<String>]) -> Self {
        let question_col = find_column(headers, QUESTION_HEADERS);
        let answer_col = find_column(headers, ANSWER_HEADERS);

        let (q, a) = match (question_col, answer_col) {
            (Some(q), Some(a)) => (q, a),
            _ => {
                warn!(
                    headers = ?headers,
                    "Could not identify question/answer columns; knowledge base is empty"
                );
                return Self::new();
            }
        };

        let mut kb = Self::new();
        for row in rows {
            let question = row.get(q).map(|s| s.trim()).unwrap_or("");
            let answer = row.get(a).map(|s| s.trim()).unwrap_or("");
            if question.is_empty() || answer.is_empty() {
                continue;
            }
            kb.insert(question, answer);
        }
        kb
    }

    /// Insert one entry; the key is normalized, last write wins.
    pub fn insert(&mut self, question: &str, answer: &str) {
        let key = normalize(question);
        if self.entries.insert(key.clone(), answer.to_string()).is_none() {
            self.order.push(key);
        }
    }

    /// Exact lookup of already-normalized or raw text.
    pub fn lookup(&self, question: &str) -> Option<&str> {
        self.entries.get(&normalize(question)).map(String::as_str)
    }

    /// Normalized keys in load order.
    pub fn all_questions(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// First header whose lowercase form contains any of the given substrings.
fn find_column(headers: &[String], needles: &[&str]) -> Option<usize> {
    headers.iter().position(|h| {
        let h = h.to_lowercase();
        needles.iter().any(|n| h.contains(n))
    })
}
