//! layer4-pump demo server.
//!
//! Binds a TCP listener, pumps it through the pass-through chain and echoes
//! every connection that comes out of the wrapper.

use std::path::PathBuf;

use clap::Parser;
use tokio::io::AsyncWriteExt;

use layer4_pump::config::{load_config, PumpConfig};
use layer4_pump::lifecycle::{spawn_signal_handler, Shutdown};
use layer4_pump::net::{bind, BufferPool};
use layer4_pump::observability::{init_logging, init_metrics};
use layer4_pump::{BoxedConnection, ListenerWrapper, Passthrough, PumpError};

#[derive(Parser)]
#[command(name = "layer4-pump")]
#[command(about = "Layer-4 connection pump with an echo consumer", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => PumpConfig::default(),
    };
    if let Some(bind_address) = cli.bind {
        config.listener.bind_address = bind_address;
    }

    init_logging(&config.observability);
    tracing::info!("layer4-pump v{} starting", env!("CARGO_PKG_VERSION"));

    BufferPool::configure_global(&config.buffer_pool);

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(err) = init_metrics(addr) {
                    tracing::error!(error = %err, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = bind(&config.listener).await?;
    let pump = ListenerWrapper::from_config(&config, Passthrough).wrap(listener);

    let shutdown = Shutdown::new();
    let _signals = spawn_signal_handler(shutdown.clone());

    loop {
        tokio::select! {
            _ = shutdown.wait(), if !pump.is_closed() => {
                tracing::info!(in_flight = pump.in_flight(), "Closing pump listener");
                pump.close();
            }
            accepted = pump.accept() => match accepted {
                Ok(conn) => {
                    tokio::spawn(echo(conn));
                }
                Err(PumpError::Closed) => break,
                Err(err) => {
                    tracing::error!(error = %err, "Pump listener failed");
                    return Err(err.into());
                }
            },
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn echo(conn: BoxedConnection) {
    let remote = conn.remote_addr();
    match conn.tls_state() {
        Some(state) => tracing::info!(
            remote = ?remote,
            server_name = ?state.server_name,
            alpn = ?state.alpn_str(),
            "Accepted TLS connection"
        ),
        None => tracing::info!(remote = ?remote, "Accepted connection"),
    }

    let (mut reader, mut writer) = tokio::io::split(conn);
    match tokio::io::copy(&mut reader, &mut writer).await {
        Ok(bytes) => tracing::debug!(remote = ?remote, bytes, "Echo finished"),
        Err(err) => tracing::debug!(remote = ?remote, error = %err, "Echo failed"),
    }
    let _ = writer.shutdown().await;
}
