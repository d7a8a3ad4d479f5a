mod config;

use anyhow::Context;
use clap::Parser;
use credit_api::{start_server, ApiState};
use credit_core::{LedgerStore, MemoryStore, MessageStore, SledStore};
use credit_ledger::{Economy, ManualBilling};
use economics::PolicyHandle;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "creditd")]
#[command(about = "Credit economy daemon", version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the listen address from the config file
    #[arg(long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Keep all state in memory
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => {
            tracing::warn!("no config file given, using defaults");
            Config::default()
        }
    };
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    config.storage.in_memory |= cli.in_memory;

    tracing::info!(
        "starting creditd {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("CREDITD_GIT_HASH")
    );

    let (store, messages): (Arc<dyn LedgerStore>, Arc<dyn MessageStore>) =
        if config.storage.in_memory {
            tracing::warn!("in-memory storage: balances are lost on restart");
            let store = Arc::new(MemoryStore::new());
            (store.clone() as Arc<dyn LedgerStore>, store as Arc<dyn MessageStore>)
        } else {
            if let Some(parent) = config.storage.path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let store = Arc::new(
                SledStore::open(&config.storage.path)
                    .with_context(|| format!("failed to open {}", config.storage.path.display()))?,
            );
            tracing::info!("ledger store at {}", store.path());
            (store.clone() as Arc<dyn LedgerStore>, store as Arc<dyn MessageStore>)
        };

    let policy = PolicyHandle::new(config.policy).context("invalid [policy] section")?;
    let economy = Economy::builder()
        .store(store)
        .messages(messages)
        .policy(policy)
        .provider(Arc::new(ManualBilling))
        .retry(config.store.retry_policy())
        .reward_delay(Duration::from_millis(config.server.reward_delay_ms))
        .build();

    let renewal = if config.renewal.enabled {
        let interval = Duration::from_secs(config.renewal.interval_secs.max(1));
        tracing::info!("subscription renewals every {:?}", interval);
        Some(economy.subscriptions.spawn_renewal_worker(interval))
    } else {
        None
    };

    if config.server.admin_token.is_none() {
        tracing::warn!("no admin token configured, admin routes are disabled");
    }
    let guest_idle = Duration::from_secs(config.server.guest_idle_secs.max(1));
    let state = ApiState::new(economy, config.server.admin_token.clone())
        .with_guest_idle_timeout(guest_idle);
    let sweeper = state.spawn_guest_sweeper(guest_idle.min(Duration::from_secs(60)));

    tokio::select! {
        result = start_server(config.server.bind, state) => {
            result.with_context(|| format!("API server on {} failed", config.server.bind))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    if let Some(handle) = renewal {
        handle.abort();
    }
    sweeper.abort();
    Ok(())
}
