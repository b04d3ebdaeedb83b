//! Knowledge-base CSV loader.
//!
//! Pulls a published-sheet CSV export (or reads a local file) once at
//! startup. Any failure — unreachable URL, unreadable file, malformed CSV,
//! unidentifiable columns — degrades to an empty knowledge base with a warn
//! log; the bot then escalates everything instead of refusing to start.

use std::time::Duration;

use tracing::warn;

use concierge::{ConciergeError, KnowledgeBase};

use crate::config::KbSource;

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Load the knowledge base from the configured source.
///
/// `None` (no source configured) and every failure path yield an empty
/// knowledge base; the caller only ever gets a usable value.
pub async fn load_knowledge_base(source: Option<&KbSource>) -> KnowledgeBase {
    let source = match source {
        Some(s) => s,
        None => {
            warn!("No knowledge-base source configured; every question will escalate");
            return KnowledgeBase::new();
        }
    };

    match fetch_csv(source).await {
        Ok(text) => parse_csv(&text),
        Err(e) => {
            warn!(
                error = %e,
                severity = %e.severity(),
                "Knowledge-base load failed; continuing with empty base"
            );
            KnowledgeBase::new()
        }
    }
}

async fn fetch_csv(source: &KbSource) -> Result<String, ConciergeError> {
    match source {
        KbSource::Url(url) => {
            let response = reqwest::Client::new()
                .get(url)
                .timeout(FETCH_TIMEOUT)
                .send()
                .await
                .map_err(|e| ConciergeError::KnowledgeSource(format!("Failed to fetch {url}: {e}")))?;
            let status = response.status();
            if !status.is_success() {
                return Err(ConciergeError::KnowledgeSource(format!(
                    "Knowledge-base URL returned {status}"
                )));
            }
            response
                .text()
                .await
                .map_err(|e| ConciergeError::KnowledgeSource(format!("Failed to read CSV body: {e}")))
        }
        KbSource::Path(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
            ConciergeError::KnowledgeSource(format!("Failed to read {}: {e}", path.display()))
        }),
    }
}

/// Parse CSV text into a knowledge base. Ragged rows are tolerated; header
/// identification and row filtering happen in [`KnowledgeBase::from_rows`].
pub fn parse_csv(text: &str) -> KnowledgeBase {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = match reader.headers() {
        Ok(h) => h.iter().map(|s| s.to_string()).collect(),
        Err(e) => {
            warn!(error = %e, "CSV has no readable header row");
            return KnowledgeBase::new();
        }
    };

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        match record {
            Ok(r) => rows.push(r.iter().map(|s| s.to_string()).collect()),
            Err(e) => warn!(error = %e, "Skipping malformed CSV row"),
        }
    }

    KnowledgeBase::from_rows(&headers, &rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_russian_sheet_export() {
        let csv = "Вопрос,Ответ\n\
                   Есть ли wifi,\"да, пароль указан в приветственном письме\"\n\
                   Во сколько заезд,Заезд в 14:00\n";
        let kb = parse_csv(csv);
        assert_eq!(kb.len(), 2);
        assert_eq!(
            kb.lookup("есть ли wifi"),
            Some("да, пароль указан в приветственном письме")
        );
    }

    #[test]
    fn english_fuzzy_headers_work() {
        let csv = "Guest question,Suggested answer,Notes\nwifi?,yes,internal\n";
        let kb = parse_csv(csv);
        assert_eq!(kb.lookup("wifi?"), Some("yes"));
    }

    #[test]
    fn ragged_rows_are_tolerated() {
        let csv = "question,answer\nwifi\ncheck-in,14:00\n";
        let kb = parse_csv(csv);
        assert_eq!(kb.len(), 1);
        assert_eq!(kb.lookup("check-in"), Some("14:00"));
    }

    #[test]
    fn garbage_input_yields_empty_kb() {
        assert!(parse_csv("").is_empty());
        assert!(parse_csv("no,known,columns\n1,2,3\n").is_empty());
    }

    #[tokio::test]
    async fn loads_from_local_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "question,answer").unwrap();
        writeln!(file, "wifi,password in the welcome letter").unwrap();
        let source = KbSource::Path(file.path().to_path_buf());

        let kb = load_knowledge_base(Some(&source)).await;
        assert_eq!(kb.lookup("WIFI"), Some("password in the welcome letter"));
    }

    #[tokio::test]
    async fn missing_file_degrades_to_empty() {
        let source = KbSource::Path("/nonexistent/faq.csv".into());
        let kb = load_knowledge_base(Some(&source)).await;
        assert!(kb.is_empty());
    }

    #[tokio::test]
    async fn no_source_degrades_to_empty() {
        assert!(load_knowledge_base(None).await.is_empty());
    }
}
