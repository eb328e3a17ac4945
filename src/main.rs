//! hostgate
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!                         │                  HOSTGATE                    │
//!                         │                                              │
//!   HTTP/HTTPS client ────┼─▶ net::listener ─▶ http::server ─▶ routing ──┼─▶ static dir
//!                         │   (+ net::tls)     (host lookup)    table    │   301 redirect
//!                         │                                              ├─▶ upstream (proxy)
//!   TCP client ───────────┼─▶ net::listener ─▶ net::relay (FNV-1a pick) ─┼─▶ upstream (relay)
//!                         │                                              │
//!   admin console ────────┼─▶ admin API ─▶ lifecycle::fleet              │
//!                         │                 (replace / upsert, rollback) │
//!                         └──────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use hostgate::admin::{self, AdminState};
use hostgate::config::loader::{load_fleet, ConfigError, SavedFleet};
use hostgate::config::watcher::ConfigWatcher;
use hostgate::config::EngineSettings;
use hostgate::lifecycle::{wait_for_signal, Engine, Fleet, Shutdown};
use hostgate::observability::{logging::init_logging, metrics::init_metrics};

#[derive(Parser, Debug)]
#[command(name = "hostgate", version)]
#[command(about = "Multi-protocol edge server for HTTP, HTTPS and TCP", long_about = None)]
struct Args {
    /// Fleet file (JSON array of servers)
    #[arg(short, long, default_value = "hostgate.json")]
    config: PathBuf,

    /// Enable the admin API
    #[arg(long)]
    admin: bool,

    /// Admin API address [default: random port in 50000-59999 on [::]]
    #[arg(long)]
    admin_listen: Option<SocketAddr>,

    /// Admin access token [default: random]
    #[arg(long)]
    admin_token: Option<String>,

    /// Re-apply the fleet file whenever it changes
    #[arg(long)]
    watch: bool,

    /// Prometheus scrape address
    #[arg(long)]
    metrics_listen: Option<SocketAddr>,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,

    #[arg(long, default_value_t = 10)]
    shutdown_grace_secs: u64,

    #[arg(long, default_value_t = 10)]
    connect_timeout_secs: u64,

    #[arg(long, default_value_t = 4096)]
    relay_buffer_size: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.log_json);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "hostgate starting");

    let servers = match load_fleet(&args.config) {
        Ok(servers) => servers,
        Err(ConfigError::Io(e)) if args.admin => {
            tracing::warn!(
                path = %args.config.display(),
                error = %e,
                "Config file not readable, starting with an empty fleet"
            );
            Vec::new()
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(
        path = %args.config.display(),
        servers = servers.len(),
        "Configuration loaded"
    );

    if let Some(addr) = args.metrics_listen {
        init_metrics(addr)?;
    }

    let settings = EngineSettings {
        shutdown_grace: Duration::from_secs(args.shutdown_grace_secs),
        connect_timeout: Duration::from_secs(args.connect_timeout_secs),
        relay_buffer_size: args.relay_buffer_size,
    };
    let engine = Arc::new(Engine::new(settings)?);
    let fleet = Arc::new(Fleet::new(engine, servers));
    fleet.start_all().await?;

    let shutdown = Shutdown::new();
    let saved = SavedFleet::default();
    let mut tasks = Vec::new();

    if args.admin {
        let listen = args.admin_listen.unwrap_or_else(admin::default_listen);
        let token = args.admin_token.clone().unwrap_or_else(admin::generate_token);
        let listener = match TcpListener::bind(listen).await {
            Ok(listener) => listener,
            Err(e) => {
                fleet.shutdown_all().await;
                return Err(e.into());
            }
        };

        tracing::info!(url = %format!("http://{}/api/servers", listener.local_addr()?), "Admin API url");
        tracing::info!(token = %token, "Admin access token");

        let state = AdminState::new(Arc::clone(&fleet), args.config.clone(), &token)
            .with_saved_fleet(saved.clone());
        let stop = shutdown.wait();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = admin::serve(listener, state, stop).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        }));
    }

    // Dropping the watcher stops it, so it lives until exit.
    let _watcher = if args.watch {
        let (watcher, mut updates) = ConfigWatcher::new(&args.config, saved);
        let watcher = watcher.run()?;
        let fleet = Arc::clone(&fleet);
        let mut stop = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = updates.recv() => match update {
                        Some(servers) => {
                            if let Err(e) = fleet.replace_all(servers).await {
                                tracing::error!(error = %e, "Reload rejected, keeping current fleet");
                            }
                        }
                        None => break,
                    },
                    _ = stop.recv() => break,
                }
            }
        }));
        Some(watcher)
    } else {
        None
    };

    if let Err(e) = wait_for_signal().await {
        tracing::error!(error = %e, "Failed to listen for signals, shutting down");
    }

    shutdown.trigger();
    fleet.shutdown_all().await;
    for task in tasks {
        let _ = task.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
