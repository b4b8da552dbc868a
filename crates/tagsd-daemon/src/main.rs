//! tagsd - tag directory daemon
//!
//! Serves the tag directory over line-delimited JSON-RPC on stdio and runs the daily
//! cleanup in the background. stdout carries protocol traffic only; logs go to stderr
//! and to `<home>/logs/tagsd.log`.
//!
//! Environment:
//! - `TAGS_HOME`: state directory (default `~/.tagsd`)
//! - `TAGS_DB_PATH`: SQLite file (default `<home>/tags.db`)
//! - `TAGS_CONFIG`: YAML config (default `<home>/config.yaml`)
//! - `TAGS_ROSTER`: YAML member roster (default `<home>/roster.yaml`)
//! - `RUST_LOG` / `TAGS_LOG_LEVEL`: log filter

mod console;
mod handler;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tagsd_core::{
    ChatTransport, CleanupScheduler, IdentityResolver, ReactionBus, TagService, TagsConfig,
    TagsDB, TieredResolver,
};
use tagsd_rpc::{outbound_channel, RpcServer};
use tracing::{error, info};

use crate::console::{ConsoleTransport, MemberCache, RosterResolver};
use crate::handler::TagsToolHandler;

/// How long a seen display name is trusted before asking the roster again
const MEMBER_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

fn tags_home() -> PathBuf {
    if let Some(home) = env_path("TAGS_HOME") {
        return home;
    }
    dirs::home_dir()
        .map(|h| h.join(".tagsd"))
        .unwrap_or_else(|| PathBuf::from(".tagsd"))
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var(var).ok().map(PathBuf::from)
}

fn db_path(home: &std::path::Path) -> PathBuf {
    env_path("TAGS_DB_PATH").unwrap_or_else(|| home.join("tags.db"))
}

fn config_path(home: &std::path::Path) -> PathBuf {
    env_path("TAGS_CONFIG").unwrap_or_else(|| home.join("config.yaml"))
}

fn roster_path(home: &std::path::Path) -> PathBuf {
    env_path("TAGS_ROSTER").unwrap_or_else(|| home.join("roster.yaml"))
}

fn log_level(rust_log: Option<String>, tags_log: Option<String>) -> String {
    if let Some(v) = rust_log {
        return v;
    }
    match tags_log.as_deref() {
        Some("silent") => "off".to_string(),
        Some("fatal") => "error".to_string(),
        Some(other) => other.to_string(),
        None => "info".to_string(),
    }
}

fn log_filter() -> tracing_subscriber::EnvFilter {
    let level = log_level(
        std::env::var("RUST_LOG").ok(),
        std::env::var("TAGS_LOG_LEVEL").ok(),
    );
    tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let home = tags_home();
    std::fs::create_dir_all(&home)
        .with_context(|| format!("creating {}", home.display()))?;

    // stderr + daily file
    let log_dir = home.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&log_dir, "tagsd.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(log_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();

    let config = TagsConfig::load(config_path(&home)).context("loading config")?;
    let db_path = db_path(&home);
    let db = Arc::new(
        TagsDB::open(&db_path).with_context(|| format!("opening {}", db_path.display()))?,
    );
    info!(db = ?db_path, storage_key = %config.storage_key, "Database opened");

    let bus = ReactionBus::new();
    let (outbound, outbound_rx) = outbound_channel();
    let transport: Arc<dyn ChatTransport> = Arc::new(ConsoleTransport::new(outbound.clone()));

    let members = Arc::new(MemberCache::new(MEMBER_CACHE_TTL));
    let roster = Arc::new(RosterResolver::new(roster_path(&home)));
    let resolver: Arc<dyn IdentityResolver> = Arc::new(TieredResolver::new(
        Arc::clone(&members),
        Arc::clone(&roster),
    ));

    let service = Arc::new(TagService::new(
        db,
        transport,
        Arc::clone(&resolver),
        Arc::clone(&bus),
        &config,
    ));
    let scheduler = CleanupScheduler::new(Arc::clone(&service), &config).start();

    let handler = TagsToolHandler::new(service, bus, members, roster, resolver);
    let server = RpcServer::with_outbound(handler, outbound, outbound_rx);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "JSON-RPC server failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received ctrl-c, shutting down");
        }
    }

    scheduler.shutdown().await;
    info!("tagsd stopped");
    Ok(())
}
