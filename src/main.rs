//! Echo router binary built on `relaycore`.
//!
//! Binds the configured address, serves until Ctrl-C, then drains open
//! connections before exiting.

#[cfg(not(loom))]
mod cli;

#[cfg(not(loom))]
use clap::Parser;
#[cfg(not(loom))]
use relaycore::{
    frame::FrameConfig,
    queue::QueueConfig,
    router::{self, RouterConfig},
};
#[cfg(not(loom))]
use tokio_util::sync::CancellationToken;
#[cfg(not(loom))]
use tracing::{error, info};
#[cfg(not(loom))]
use tracing_subscriber::EnvFilter;

/// The router is not built for loom model checking.
#[cfg(loom)]
fn main() {}

#[cfg(not(loom))]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = cli::Cli::parse();
    #[cfg(feature = "metrics")]
    if let Some(addr) = cli.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!(%addr, "serving metrics");
    }
    #[cfg(not(feature = "metrics"))]
    if cli.metrics_addr.is_some() {
        tracing::warn!("built without the metrics feature, --metrics-addr ignored");
    }

    let queue = QueueConfig::builder().bulk_size(cli.bulk_size).build()?;
    let config = RouterConfig::default()
        .with_listen(cli.listen)
        .with_frame(FrameConfig::new(cli.max_chunk_len, cli.fragment_size))
        .with_queue(queue)
        .with_batch_lanes(cli.batch_lanes)
        .with_max_pending_replies(cli.max_pending_replies);

    let listener = router::bind(&config).await?;
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                signal.cancel();
            }
            Err(e) => error!(error = %e, "failed to listen for Ctrl-C"),
        }
    });

    router::serve(listener, config, shutdown).await?;
    Ok(())
}
