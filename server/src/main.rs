use anyhow::Result;
use clap::Parser;
use rivulet_rtmp::{RtmpConfig, StreamRouter};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rivulet-server", about = "RTMP ingest/egress relay server")]
struct Args {
    /// Listen address, overriding the config file
    #[arg(long)]
    listen: Option<String>,

    /// Config file name (TOML), searched without its extension
    #[arg(long, default_value = "rivulet")]
    config: String,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut rtmp_config: RtmpConfig = config::Config::builder()
        .add_source(config::File::with_name(&args.config).required(false))
        .add_source(config::Environment::with_prefix("RIVULET").separator("__"))
        .build()?
        .try_deserialize()?;

    if let Some(listen) = args.listen {
        rtmp_config.bind_address = listen;
    }

    let listener = TcpListener::bind(&rtmp_config.bind_address).await?;
    let router = Arc::new(StreamRouter::new(Duration::from_secs(
        rtmp_config.publisher_grace_secs,
    )));

    tokio::select! {
        result = rivulet_rtmp::serve(listener, rtmp_config, router.clone()) => {
            result?;
        }

        _ = tokio::signal::ctrl_c() => {
            info!(event = "shutdown", "interrupt received, stopping");
            router.shutdown();
        }
    }

    Ok(())
}
