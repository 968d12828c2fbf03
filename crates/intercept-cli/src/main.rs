use anyhow::Result;
use clap::Parser;
use mqtt_intercept::service::{Service, ServiceConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "mqtt-intercept")]
#[command(about = "An intercepting MQTT proxy")]
#[command(version)]
#[command(
    long_about = "Accepts MQTT clients over TCP and WebSocket, pairs each with an \
                  upstream broker connection, and intercepts every control packet \
                  in both directions. Broker TLS certificate verification is disabled."
)]
struct Cli {
    /// TCP address and port to listen on for MQTT proxy clients
    #[arg(long = "ts", value_name = "HOST:PORT")]
    tcp_listen: Option<String>,

    /// WebSocket address and port to listen on for MQTT proxy clients
    #[arg(long = "ws", value_name = "HOST:PORT", default_value = "0.0.0.0:443")]
    ws_listen: String,

    /// URL of the MQTT broker to connect upstream (tcp://, ssl://, ws://, wss://)
    #[arg(long = "b", value_name = "URL")]
    broker: String,

    /// Dump verbose debug information
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Trace every intercepted packet
    #[arg(short = 't', long)]
    trace: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // rustls needs a process-wide crypto provider before any TLS dial.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();

    let log_level = if cli.trace {
        tracing::Level::TRACE
    } else if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    if cli.trace {
        // JSON trace files are not implemented yet; trace-level logging
        // stands in for them.
        info!("trace is enabled");
    }

    let mut config = ServiceConfig::new(&cli.broker).with_ws_listen(&cli.ws_listen);
    if let Some(tcp) = &cli.tcp_listen {
        config = config.with_tcp_listen(tcp);
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
            cancel.cancel();
        }
    });

    info!(broker = %cli.broker, "mqtt-intercept: an MQTT proxy");
    Service::new(config).run(cancel).await?;

    Ok(())
}
