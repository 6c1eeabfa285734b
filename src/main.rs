//! Embedded appliance web front end.
//!
//! Startup wiring: CLI, tracing, configuration (with hot reload of the
//! parameter table), one HTTP server and one delivery loop per listening
//! interface, and a periodic consumer for inbound control frames.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webfront::cache::negotiator::Negotiator;
use webfront::config::schema::{InterfaceConfig, VersionConfig};
use webfront::config::watcher::ConfigWatcher;
use webfront::config::{load_config, WebConfig};
use webfront::content::resolver::{DynamicResponder, Resolver};
use webfront::content::sources::{now_unix, BlobStore};
use webfront::http::HttpServer;
use webfront::params::Params;
use webfront::stream::delivery::DeliveryLoop;
use webfront::stream::registry::ConnectionRegistry;

#[derive(Parser, Debug)]
#[command(name = "webfront", about = "Embedded appliance web front end")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "webfront.toml")]
    config: PathBuf,

    /// Override the first interface's listening port.
    #[arg(long)]
    port: Option<u16>,

    /// Log filter directive, e.g. "webfront=trace". Overrides RUST_LOG.
    #[arg(long)]
    log_level: Option<String>,
}

/// Status page synthesized per request; the only dynamic responder wired
/// by default. Further generators register through the same hook.
struct StatusResponder {
    owner_info: String,
    version: VersionConfig,
}

impl DynamicResponder for StatusResponder {
    fn respond(&self, path: &str, _query: &str) -> Option<Vec<u8>> {
        if path != "status" {
            return None;
        }
        Some(
            format!(
                "status=active\nversion={}.{}\nowner={}\n",
                self.version.major, self.version.minor, self.owner_info
            )
            .into_bytes(),
        )
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(directive) => tracing_subscriber::EnvFilter::new(directive),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "webfront=debug,tower_http=debug".into()),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("webfront v0.1.0 starting");

    let mut config = if cli.config.exists() {
        load_config(&cli.config)?
    } else {
        tracing::warn!(path = ?cli.config, "config file not found, using defaults");
        default_config()
    };
    if let Some(port) = cli.port {
        if let Some(first) = config.interfaces.first_mut() {
            tracing::info!(port, interface = %first.name, "overriding listening port");
            first.port = port;
        }
    }

    tracing::info!(
        interfaces = config.interfaces.len(),
        docroot = %config.content.docroot,
        "Configuration loaded"
    );

    // Parameter table: rebuilt now and on every accepted config reload.
    let params = Params::empty();
    params.rebuild(&config);

    let mut _watcher_guard = None;
    if cli.config.exists() {
        let (watcher, mut config_updates) = ConfigWatcher::new(&cli.config);
        _watcher_guard = Some(watcher.run()?);
        let reload_params = params.clone();
        tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                reload_params.rebuild(&new_config);
            }
        });
    }

    // Blob stores are populated by the asset-embedding collaborator; a
    // filesystem-style deployment serves everything from the docroot.
    let embedded = Arc::new(BlobStore::new(now_unix()));
    let resident = Arc::new(BlobStore::new(now_unix()));

    let resolver = Arc::new(Resolver::new(
        embedded,
        resident,
        &config.content.docroot,
        &config.content.extension_root,
        config.content.forbidden_suffixes.clone(),
        Arc::new(StatusResponder {
            owner_info: config.owner_info.clone(),
            version: config.version,
        }),
    ));
    let negotiator = Arc::new(Negotiator::new(resolver, params.clone(), config.version));
    let registry = Arc::new(ConnectionRegistry::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poll_interval = Duration::from_millis(config.delivery.poll_interval_ms);

    for interface in &config.interfaces {
        let listener = match TcpListener::bind(("::", interface.port)).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(
                    port = interface.port,
                    interface = %interface.name,
                    error = %e,
                    "cannot bind listening port (already running in background?)"
                );
                return Err(e.into());
            }
        };

        let server = HttpServer::new(interface.clone(), negotiator.clone(), registry.clone());
        let server_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = server.run(listener, server_shutdown).await {
                tracing::error!(error = %e, "HTTP server failed");
            }
        });

        let delivery = DeliveryLoop::new(registry.clone(), &interface.name, poll_interval);
        tokio::spawn(delivery.run(shutdown_rx.clone()));
    }

    // Application side of the websocket path: poll and acknowledge inbound
    // control frames. Stream producers hook in through the registry API.
    tokio::spawn(consume_inbound(
        registry.clone(),
        poll_interval,
        shutdown_rx.clone(),
    ));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
    tokio::time::sleep(poll_interval).await;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn default_config() -> WebConfig {
    let mut config = WebConfig::default();
    config.interfaces.push(InterfaceConfig {
        name: "app".into(),
        port: 8080,
    });
    config
}

/// Periodic poll-and-acknowledge pass over every connection's inbound queue.
async fn consume_inbound(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        for conn in registry.connections() {
            loop {
                match conn.poll_inbound() {
                    Ok(Some(frame)) => {
                        tracing::debug!(
                            connection_id = %conn.id(),
                            len = frame.len(),
                            "inbound frame"
                        );
                        if let Err(e) = conn.ack_inbound(frame) {
                            tracing::error!(connection_id = %conn.id(), error = %e, "ack failed");
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(connection_id = %conn.id(), error = %e, "inbound poll failed");
                        break;
                    }
                }
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => return,
        }
    }
}
