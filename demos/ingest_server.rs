//! Device that serves pushed IVF streams to WebRTC peers
//!
//! Run with: cargo run --example ingest_server [SIGNALING_URL] [INGEST_ADDR]
//!
//! Examples:
//!   cargo run --example ingest_server                                          # ingest on 0.0.0.0:8554
//!   cargo run --example ingest_server ws://127.0.0.1:10900/ws 127.0.0.1:9000   # custom ingest address
//!
//! ## Pushing a stream
//!
//! A publisher connects over TCP and sends a u16 big-endian path length, the
//! path bytes, then an IVF file as-is.
//!
//! ## Watching
//!
//! Peers ask to connect with "pull from ingest:<path>". The relay and file
//! actions from the capture server work here too.

use std::net::SocketAddr;
use std::sync::Arc;

use rtc_relay::{
    IngestConfig, IngestHub, IngestServer, RegistryConfig, SessionRegistry, SignalingClient,
    SignalingConfig, WebRtcFactory, WebSocketChannel,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn print_usage() {
    eprintln!("Usage: ingest_server [SIGNALING_URL] [INGEST_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  SIGNALING_URL    Rendezvous service (default: ws://127.0.0.1:10900/ws)");
    eprintln!("  INGEST_ADDR      Address publishers push to (default: 0.0.0.0:8554)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtc_relay=debug".parse()?)
                .add_directive("ingest_server=debug".parse()?),
        )
        .init();

    let signaling = match args.get(1) {
        Some(url) => SignalingConfig::with_url(url.clone()),
        None => SignalingConfig::default(),
    };

    let ingest_config = match args.get(2) {
        Some(addr) => IngestConfig::with_addr(addr.parse::<SocketAddr>()?),
        None => IngestConfig::default(),
    };
    let hub = Arc::new(IngestHub::with_config(ingest_config.clone()));
    let ingest = IngestServer::with_hub(ingest_config, Arc::clone(&hub));

    let config = RegistryConfig::default();
    let factory = Arc::new(WebRtcFactory::new(config.webrtc_config())?);
    let (outbox, outbox_rx) = mpsc::channel(signaling.outbox_capacity);
    let registry = SessionRegistry::with_ingest(factory, config, outbox, hub);

    println!("Device {} joining {}", signaling.device_id, signaling.url);
    println!("Accepting pushed streams on {}", ingest.bind_addr());
    println!();

    let channel = Arc::new(WebSocketChannel::new(signaling.url.clone()));
    let client = SignalingClient::new(signaling, channel, registry, outbox_rx);

    let stop = CancellationToken::new();
    let ingest_stop = stop.clone();
    let ingest_task = tokio::spawn(async move {
        if let Err(e) = ingest.run_until(ingest_stop.cancelled_owned()).await {
            eprintln!("Ingest server error: {}", e);
        }
    });

    client
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await?;

    stop.cancel();
    let _ = ingest_task.await;

    Ok(())
}
