//! Phonebook Server - TCP server for the shared contact directory
//!
//! Usage:
//!   phonebook-server [--host 0.0.0.0] [--port 12333] [--db phonebook.db]
//!
//! Protocol:
//!   Request:  [4-byte length BE] [MessagePack payload]
//!   Response: [4-byte length BE] [MessagePack payload]
//!
//! Without `--db` the directory lives in memory and is lost on exit.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use phonebook::metrics::MetricsSnapshot;
use phonebook::protocol::DEFAULT_PORT;
use phonebook::{ConflictPolicy, ContactStore, MemoryStore, Server, ServerConfig, SqliteStore};

#[derive(Parser, Debug)]
#[command(name = "phonebook-server", version, about = "Shared contact directory server")]
struct Args {
    /// Host or IP address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// TCP port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// SQLite database file (in-memory store if omitted)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Close new connections while this many sessions are active
    #[arg(long)]
    max_connections: Option<usize>,

    /// Report duplicate-number inserts as successful (legacy behaviour)
    #[arg(long)]
    swallow_conflicts: bool,

    /// Enable request metrics collection
    #[arg(long)]
    metrics: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!("Starting phonebook-server v{}", env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn ContactStore> = match &args.db {
        Some(path) => {
            let store = SqliteStore::open(path)
                .with_context(|| format!("Failed to open database {}", path.display()))?;
            info!(path = %path.display(), contacts = store.len()?, "Opened contact database");
            Arc::new(store)
        }
        None => {
            warn!("No --db given, contacts are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        max_connections: args.max_connections,
        conflict_policy: if args.swallow_conflicts {
            ConflictPolicy::Swallow
        } else {
            ConflictPolicy::Report
        },
        metrics: args.metrics,
    };
    if args.metrics {
        info!("Metrics collection enabled");
    }

    let server = Server::bind(config, store).context("Failed to bind listener")?;

    // Set up signal handler for graceful shutdown
    let shutdown = server.shutdown_handle();
    let mut signals = signal_hook::iterator::Signals::new([
        signal_hook::consts::SIGINT,
        signal_hook::consts::SIGTERM,
    ])
    .context("Failed to register signal handlers")?;

    thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!(signal = sig, "Received signal, shutting down");
            shutdown.shutdown();
        }
    });

    server.run()?;

    if let Some(metrics) = server.metrics() {
        log_metrics(&metrics.snapshot());
    }
    info!("Exiting");
    Ok(())
}

fn log_metrics(snapshot: &MetricsSnapshot) {
    info!(
        requests = snapshot.request_count,
        slow = snapshot.slow_request_count,
        p50_ms = snapshot.p50_ms,
        p95_ms = snapshot.p95_ms,
        p99_ms = snapshot.p99_ms,
        connections = snapshot.connections_accepted,
        rejected = snapshot.connections_rejected,
        uptime_secs = snapshot.uptime_secs,
        "Metrics summary"
    );
    for stat in &snapshot.commands {
        info!(command = %stat.command, count = stat.count, avg_ms = stat.avg_ms, "Command stats");
    }
}
