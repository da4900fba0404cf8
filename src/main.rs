//! quizroom: server entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI flags
//!   3. Load config (file + env overrides)
//!   4. Init logger (CLI level > RUST_LOG > config)
//!   5. Open the store, build the LLM provider, hub and generator
//!   6. Spawn the HTTP channel and hub janitor; run until Ctrl-C

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use quizroom::cli::{self, USAGE};
use quizroom::config;
use quizroom::error::AppError;
use quizroom::llm::providers;
use quizroom::logger;
use quizroom::subsystems::comms::{AppState, HttpChannel};
use quizroom::subsystems::hub::{GameHub, HubJanitor};
use quizroom::subsystems::quizgen::QuizGenerator;
use quizroom::subsystems::runtime::{Component, spawn_components};
use quizroom::subsystems::store::QuizStore;

const JANITOR_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Optional file.
    let _ = dotenvy::dotenv();

    let args = cli::parse_cli_args(std::env::args().skip(1)).map_err(AppError::Config)?;
    if args.help {
        println!("{USAGE}");
        return Ok(());
    }

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.as_deref().unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some())?;

    info!(
        server = %config.server.name,
        bind = %config.server.bind,
        db = %config.db_path.display(),
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let db_path = config.db_path.clone();
    let store = tokio::task::spawn_blocking(move || QuizStore::open(&db_path))
        .await
        .map_err(|e| AppError::Store(format!("store open task failed: {e}")))?
        .map_err(|e| AppError::Store(e.to_string()))?;
    let store = Arc::new(store);

    let provider = providers::build(&config.llm, config.llm_api_key.clone())
        .map_err(|e| AppError::Llm(e.to_string()))?;
    if provider.name() != "dummy" && config.llm_api_key.is_none() {
        info!(provider = provider.name(), "LLM_API_KEY not set; requests go out unauthenticated");
    }
    let quizgen = Arc::new(QuizGenerator::new(Arc::new(provider), config.quizgen.clone()));
    let hub = Arc::new(GameHub::default());

    let state = AppState {
        server_name: Arc::from(config.server.name.as_str()),
        store,
        hub: hub.clone(),
        quizgen,
        rooms: config.rooms.clone(),
    };

    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            ctrlc_token.cancel();
        }
    });

    let components: Vec<Box<dyn Component>> = vec![
        Box::new(HttpChannel::new(config.server.bind.clone(), state)),
        Box::new(HubJanitor::new(hub, JANITOR_INTERVAL)),
    ];
    let handle = spawn_components(components, shutdown.clone());

    let result = handle.join().await;
    info!("all components stopped");
    result
}
