//! Bot configuration from environment variables.
//!
//! Required: the Telegram token and the operator chat id — the process must
//! not come up without them. Everything else is optional with defaults;
//! optional integrations (completion service, gate gateway, knowledge-base
//! source) are `Option` sub-configs built by their own `*_from` helpers.

use std::path::PathBuf;
use std::str::FromStr;

use concierge::ConciergeError;

type Result<T> = std::result::Result<T, ConciergeError>;

/// Which fallback strategy runs after the exact-match tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherKind {
    /// Exact lookup only.
    Exact,
    /// Exact, then similarity ratio.
    Fuzzy,
    /// Exact, then the external completion service.
    Semantic,
}

impl FromStr for MatcherKind {
    type Err = ConciergeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "fuzzy" => Ok(Self::Fuzzy),
            "semantic" => Ok(Self::Semantic),
            other => Err(ConciergeError::Configuration(format!(
                "Unknown MATCHER value: {other}"
            ))),
        }
    }
}

/// OpenAI-compatible completion endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

/// Telephony gateway for the gate-opening call.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub base_url: String,
    pub api_key: String,
    /// Phone number of the gate's GSM relay.
    pub gate_number: String,
}

/// Where the knowledge base comes from.
#[derive(Debug, Clone)]
pub enum KbSource {
    /// Published-sheet CSV export URL.
    Url(String),
    /// Local CSV file.
    Path(PathBuf),
}

/// Top-level bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram_token: String,
    /// Chat id of the operator group; escalations go here.
    pub operator_chat: i64,
    pub openai: Option<OpenAiConfig>,
    pub gate: Option<GateConfig>,
    pub kb: Option<KbSource>,
    pub matcher: MatcherKind,
    /// Long-poll timeout for getUpdates, seconds.
    pub poll_timeout_secs: u64,
}

impl BotConfig {
    /// Build from process environment. Fatal on missing credentials.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests inject a map here instead
    /// of racing over process-global env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let telegram_token = lookup("TELEGRAM_BOT_TOKEN")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConciergeError::Configuration("TELEGRAM_BOT_TOKEN is not set".into()))?;
        let operator_chat = lookup("OPERATOR_CHAT_ID")
            .ok_or_else(|| ConciergeError::Configuration("OPERATOR_CHAT_ID is not set".into()))?
            .trim()
            .parse::<i64>()
            .map_err(|_| {
                ConciergeError::Configuration("OPERATOR_CHAT_ID is not a valid chat id".into())
            })?;

        let openai = Self::openai_from(&lookup);
        let gate = Self::gate_from(&lookup);
        let kb = Self::kb_from(&lookup);

        let matcher = match lookup("MATCHER") {
            Some(raw) => raw.parse()?,
            // Default: use the completion service when credentials exist,
            // otherwise stay local.
            None => {
                if openai.is_some() {
                    MatcherKind::Semantic
                } else {
                    MatcherKind::Fuzzy
                }
            }
        };

        let poll_timeout_secs = lookup("POLL_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(30);

        Ok(Self {
            telegram_token,
            operator_chat,
            openai,
            gate,
            kb,
            matcher,
            poll_timeout_secs,
        })
    }

    fn openai_from(lookup: &impl Fn(&str) -> Option<String>) -> Option<OpenAiConfig> {
        let api_key = lookup("OPENAI_API_KEY")?;
        let model = lookup("OPENAI_MODEL").unwrap_or_else(|| "gpt-4".into());
        let base_url =
            lookup("OPENAI_BASE_URL").unwrap_or_else(|| "https://api.openai.com/v1".into());
        Some(OpenAiConfig {
            api_key,
            model,
            base_url,
        })
    }

    fn gate_from(lookup: &impl Fn(&str) -> Option<String>) -> Option<GateConfig> {
        let base_url = lookup("GATE_API_URL")?;
        let api_key = lookup("GATE_API_KEY")?;
        let gate_number = lookup("GATE_NUMBER")?;
        Some(GateConfig {
            base_url,
            api_key,
            gate_number,
        })
    }

    fn kb_from(lookup: &impl Fn(&str) -> Option<String>) -> Option<KbSource> {
        if let Some(url) = lookup("KB_CSV_URL") {
            return Some(KbSource::Url(url));
        }
        lookup("KB_CSV_PATH").map(|p| KbSource::Path(PathBuf::from(p)))
    }
}
