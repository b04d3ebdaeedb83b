use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use concierge::{
    ChatId, CorrelationStore, EscalationRouter, ExactMatch, FuzzyMatch, MatchPipeline,
    SemanticMatch,
};
use guest_bot::config::{BotConfig, KbSource, MatcherKind};
use guest_bot::dispatcher::Dispatcher;
use guest_bot::gate::GateCaller;
use guest_bot::openai::OpenAiClient;
use guest_bot::sheets;
use guest_bot::telegram::TelegramClient;

#[derive(Debug, Parser)]
#[command(name = "guest-bot", about = "Telegram concierge bot for the guest house")]
struct Cli {
    /// Read the knowledge base from this CSV file instead of the configured
    /// source.
    #[arg(long)]
    kb_path: Option<PathBuf>,

    /// Process a single batch of updates and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = BotConfig::from_env().context("Configuration is incomplete")?;
    if let Some(path) = cli.kb_path {
        config.kb = Some(KbSource::Path(path));
    }

    let telegram = Arc::new(TelegramClient::new(&config.telegram_token));
    let me = telegram
        .get_me()
        .await
        .context("Telegram token verification failed")?;
    info!(
        bot = me.username.as_deref().unwrap_or("unknown"),
        operator_chat = config.operator_chat,
        "Bot authenticated"
    );

    // A restart must not replay queued updates at guests.
    telegram.delete_webhook(true).await?;

    let kb = sheets::load_knowledge_base(config.kb.as_ref()).await;
    if kb.is_empty() {
        warn!("Knowledge base is empty; every question will go to the operator");
    } else {
        info!(entries = kb.len(), "Knowledge base loaded");
    }

    let pipeline = build_pipeline(&config);
    let router = EscalationRouter::new(
        kb,
        pipeline,
        CorrelationStore::default(),
        Arc::clone(&telegram) as Arc<dyn concierge::ChatTransport>,
        ChatId(config.operator_chat),
    );

    let gate = config.gate.clone().map(GateCaller::new);
    if gate.is_none() {
        info!("Gate calling not configured");
    }

    let dispatcher = Dispatcher::new(
        telegram,
        router,
        gate,
        ChatId(config.operator_chat),
        config.poll_timeout_secs,
    );

    info!("Polling for updates");
    dispatcher.run(cli.once).await
}

/// Exact match always runs first; the configured fallback follows.
fn build_pipeline(config: &BotConfig) -> MatchPipeline {
    let pipeline = MatchPipeline::new().with(ExactMatch);
    match config.matcher {
        MatcherKind::Exact => pipeline,
        MatcherKind::Fuzzy => pipeline.with(FuzzyMatch::default()),
        MatcherKind::Semantic => match config.openai.clone() {
            Some(openai) => pipeline.with(SemanticMatch::new(Arc::new(OpenAiClient::new(openai)))),
            None => {
                warn!("MATCHER=semantic but OPENAI_API_KEY is not set; falling back to fuzzy");
                pipeline.with(FuzzyMatch::default())
            }
        },
    }
}
