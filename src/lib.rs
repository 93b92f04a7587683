pub mod types;
pub mod config;
pub mod error;
pub mod template;
pub mod storage;
pub mod bracket_store;
pub mod advancement;
pub mod ledger;
pub mod voting_window;
pub mod query;
pub mod service;
pub mod http;
#[cfg(test)]
mod fixtures;

use types::*;
use config::*;
use service::BracketService;
use storage::TournamentStore;

use std::{fs, path::PathBuf, sync::Arc};
use tracing::{info, error};
use tracing_subscriber::EnvFilter;

pub use error::{BracketError, BracketResult, ErrorKind};

fn open_store(config: &EngineConfig) -> BracketResult<TournamentStore> {
    match data_dir(config) {
        Some(dir) => TournamentStore::open(dir),
        None => {
            info!("No data directory configured; tournaments are kept in memory");
            Ok(TournamentStore::in_memory())
        }
    }
}

// ── Entry point ────────────────────────────────────────────────────────

pub fn run() {
    load_env_file();
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Bracket engine config error: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with daily-rotated file output
    let logs_dir = PathBuf::from(&config.log_dir);
    fs::create_dir_all(&logs_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "bracket.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    info!("Bracket engine starting");
    if config.strict_round_order {
        info!("Strict round order enabled");
    }

    let store = match open_store(&config) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to open tournament store: {e}");
            std::process::exit(1);
        }
    };
    let service: SharedService = Arc::new(BracketService::from_config(store, &config));

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {e}");
            std::process::exit(1);
        }
    };
    runtime.block_on(http::serve(service, &config.bind_addr));
}
