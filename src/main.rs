use std::{error::Error, sync::Arc};

use clap::Parser;
use clap_derive::Parser;
use config::AuroraConfig;
use store::Store;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub mod codec;
pub mod config;
pub mod divergence;
pub mod ingest;
pub mod packet;
pub mod store;

pub const CONFIG_VERSION: f32 = 0.1;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "./aurora.ron")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let cfg = AuroraConfig::from_file(&args.config)?;
    if cfg.version != CONFIG_VERSION {
        panic!(
            "Wrong config version. Got {}, expected {}.",
            cfg.version, CONFIG_VERSION
        );
    }

    let store = Arc::new(Store::connect(&cfg.store).await?);
    info!("store connected at {}", cfg.store.file());

    // the transport owns the sender half and feeds parsed packets in
    let (packet_tx, packet_rx) = mpsc::channel::<packet::Packet>(64);
    tokio::spawn(ingest::task(store, cfg.collections, packet_rx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down Aurora");
        }
    }
    drop(packet_tx);

    Ok(())
}
