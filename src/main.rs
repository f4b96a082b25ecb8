//! FlashDir - A Lightweight Directory-Access Server
//!
//! This is the main entry point for the FlashDir server.
//! It loads the LDIF store, builds the route table and serves connections
//! until Ctrl+C.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use flashdir::directory::{Backend, DebugBackend, LdifStore};
use flashdir::router::{default_routes, RootDse};
use flashdir::server::{Server, ServerConfig};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Which store serves the default routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// Entries loaded from and persisted to the data directory
    Ldif,
    /// No data; logs every request
    Debug,
}

/// Server configuration
#[derive(Debug, Parser)]
#[command(name = "flashdir", version = flashdir::VERSION, about = "A lightweight directory-access server")]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = flashdir::DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = flashdir::DEFAULT_PORT)]
    port: u16,

    /// Store backing the default routes
    #[arg(long, value_enum, default_value_t = BackendKind::Ldif)]
    backend: BackendKind,

    /// Directory holding one .ldif file per entry
    #[arg(long, default_value = "./ldif")]
    data_dir: PathBuf,

    /// Naming context advertised by the root DSE
    #[arg(long, default_value = flashdir::DEFAULT_NAMING_CONTEXT)]
    naming_context: String,

    /// Close connections idle for this many seconds
    #[arg(long)]
    read_timeout_secs: Option<u64>,

    /// Give up on a response write after this many seconds
    #[arg(long)]
    write_timeout_secs: Option<u64>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn print_banner(args: &Args, store_name: &str, entries: usize) {
    println!(
        r#"
FlashDir v{} - Lightweight Directory-Access Server
──────────────────────────────────────────────────────────────
Serving {} ({} backend, {} entries from {})
Listening on {}

Use Ctrl+C to shutdown gracefully.
"#,
        flashdir::VERSION,
        args.naming_context,
        store_name,
        entries,
        args.data_dir.display(),
        args.bind_address()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Set up logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let (store, entries) = match args.backend {
        BackendKind::Ldif => {
            let store = LdifStore::open(&args.data_dir).with_context(|| {
                format!("failed to load entries from {}", args.data_dir.display())
            })?;
            let entries = store.len();
            info!(entries, dir = %args.data_dir.display(), "Directory store loaded");
            (Arc::new(store) as Arc<dyn Backend>, entries)
        }
        BackendKind::Debug => {
            info!("Using the debug backend, requests are logged and not stored");
            (Arc::new(DebugBackend) as Arc<dyn Backend>, 0)
        }
    };
    let store_name = store.name().to_string();
    let routes = default_routes(store, RootDse::new(args.naming_context.clone()));
    info!(routes = routes.len(), "Route table built");

    let config = ServerConfig::new(args.bind_address(), routes)
        .read_timeout(args.read_timeout_secs.map(Duration::from_secs))
        .write_timeout(args.write_timeout_secs.map(Duration::from_secs));
    let server = Server::new(config);

    let listener = server.bind().await?;
    print_banner(&args, &store_name, entries);

    // Set up graceful shutdown
    let serving = server.serve(listener);
    tokio::pin!(serving);

    tokio::select! {
        result = &mut serving => {
            result?;
        }
        signal = signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Shutdown signal received, stopping server...");
            server.shutdown();
            serving.await?;
        }
    }

    let stats = server.stats();
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        requests = stats.requests_processed.load(Ordering::Relaxed),
        abandoned = stats.requests_abandoned.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}
