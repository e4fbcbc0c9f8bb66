mod config;
mod db;
mod error;
mod flags;
mod llm;
mod relay;
mod telegram;
mod users;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::Config;
use crate::flags::RuntimeFlags;
use crate::llm::{CompletionEngine, OpenAiEngine};
use crate::relay::{QuotaLimiter, Relay, RelaySettings};
use crate::telegram::TelegramPlatform;
use crate::telegram::commands::BotCommandHandler;
use crate::users::{InviteRepository, UserRepository};

#[tokio::main]
async fn main() {
    // Load .env file (if present) before anything reads env vars
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    if args.iter().any(|a| a == "--default-config") {
        print!("{}", Config::default_config_contents());
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from);

    let config = match Config::load(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load config: {e}");
            return;
        }
    };
    if let Err(e) = config.validate() {
        error!("invalid config: {e}");
        return;
    }

    let token = match Config::telegram_bot_token() {
        Ok(t) => t,
        Err(e) => {
            error!("{e}");
            return;
        }
    };

    info!(
        channel = %config.telegram.channel_name,
        group = %config.telegram.group_name,
        model = %config.llm.model,
        quota = config.quota.enabled,
        "chat-relay starting"
    );

    let db_path = config.database_path();
    let db = match db::open(&db_path) {
        Ok(conn) => Arc::new(Mutex::new(conn)),
        Err(e) => {
            error!("failed to open database: {e}");
            return;
        }
    };

    let platform = match TelegramPlatform::connect(&token, config.telegram.poll_timeout_secs).await {
        Ok(p) => Arc::new(p),
        Err(e) => {
            error!("failed to connect to Telegram: {e}");
            return;
        }
    };

    let backend = match OpenAiEngine::new(&config.llm) {
        Ok(b) => Arc::new(b),
        Err(e) => {
            error!("failed to initialize completion backend: {e}");
            return;
        }
    };

    if args.iter().any(|a| a == "--check") {
        info!(db = %db_path.display(), bot = %platform.username(), "pre-flight checks passed");
        return;
    }

    let flags = Arc::new(RuntimeFlags::new(config.quota.enabled));
    let users = Arc::new(UserRepository::new(db.clone(), config.quota.initial_count));
    let invites = Arc::new(InviteRepository::new(db));

    let bot_username = if config.telegram.bot_username.is_empty() {
        platform.username().to_string()
    } else {
        config.telegram.bot_username.clone()
    };
    let commands = BotCommandHandler::new(
        platform.clone(),
        users.clone(),
        invites,
        flags.clone(),
        &config,
    )
    .with_bot_username(bot_username);

    let completion = CompletionEngine::new(backend, &config.llm, flags.clone());

    let relay = Arc::new(
        Relay::new(
            platform,
            Arc::new(completion),
            Arc::new(commands),
            RelaySettings::from_config(&config.telegram),
        )
        .with_quota(QuotaLimiter::new(users, flags)),
    );

    let worker = match relay.start_worker_loop() {
        Ok(handle) => handle,
        Err(e) => {
            error!("failed to start worker: {e}");
            return;
        }
    };
    let fetcher = relay.start_fetch_loop();

    info!("chat-relay running");
    let (worker_res, fetch_res) = tokio::join!(worker, fetcher);
    if let Err(e) = worker_res {
        error!("worker loop ended: {e}");
    }
    if let Err(e) = fetch_res {
        error!("fetch loop ended: {e}");
    }
}

fn print_usage() {
    println!(
        "chat-relay - relays Telegram chats to an OpenAI-compatible completion API

USAGE:
    chat-relay [OPTIONS]

OPTIONS:
    --config <PATH>     Path to config file (default: ~/.config/chat-relay/config.toml)
    --default-config    Print default config to stdout and exit
    --check             Validate config and connectivity, then exit
    -h, --help          Print this help message

ENVIRONMENT:
    TELEGRAM_BOT_TOKEN      Bot token (required)
    TELEGRAM_CHANNEL_NAME   Channel users must join (overrides telegram.channel_name)
    TELEGRAM_GROUP_NAME     Group users must join (overrides telegram.group_name)
    OPENAI_API_KEY          Completion API key (overrides llm.api_key)
    OPENAI_BASE_URL         Completion API base URL (overrides llm.base_url)
    OPENAI_MODEL            Model name (overrides llm.model)
    RUST_LOG                Log filter (default: info)"
    );
}
