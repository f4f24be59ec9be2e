//! Device that relays and captures WebRTC video
//!
//! Run with: cargo run --example capture_server [SIGNALING_URL] [DEVICE_ID]
//!
//! Examples:
//!   cargo run --example capture_server                                  # ws://127.0.0.1:10900/ws, device 123
//!   cargo run --example capture_server ws://rendezvous:10900/ws cam-1   # custom service and device id
//!
//! ## Sessions
//!
//! Peers ask to connect with one of these actions:
//!
//!   "push to file and stream"   publish; captured to ./output-<peer>.ivf
//!   "pull from stream"          watch the live publisher
//!   "pull from file"            watch ./test.ivf
//!
//! ## Environment
//!
//!   PLAYBACK_FILE      IVF file served to "pull from file" (default: test.ivf)
//!   OUTPUT_DIR         directory for capture files (default: .)
//!   EXIT_ON_CAPTURE    exit once the first capture finishes (set to 1)

use std::sync::Arc;

use rtc_relay::{
    RegistryConfig, SessionRegistry, SignalingClient, SignalingConfig, WebRtcFactory,
    WebSocketChannel,
};
use tokio::sync::mpsc;

fn print_usage() {
    eprintln!("Usage: capture_server [SIGNALING_URL] [DEVICE_ID]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  SIGNALING_URL    Rendezvous service (default: ws://127.0.0.1:10900/ws)");
    eprintln!("  DEVICE_ID        Room announced to the service (default: 123)");
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
                .add_directive("capture_server=debug".parse()?),
        )
        .init();

    let mut signaling = SignalingConfig::default();
    if let Some(url) = args.get(1) {
        signaling.url = url.clone();
    }
    if let Some(device_id) = args.get(2) {
        signaling.device_id = device_id.clone();
    }

    let mut config = RegistryConfig::default();
    if let Ok(path) = std::env::var("PLAYBACK_FILE") {
        config = config.playback_path(path);
    }
    if let Ok(dir) = std::env::var("OUTPUT_DIR") {
        config = config.output_dir(dir);
    }
    if std::env::var("EXIT_ON_CAPTURE").map(|v| v == "1").unwrap_or(false) {
        config = config.exit_on_capture_end(true);
    }

    println!("Device {} joining {}", signaling.device_id, signaling.url);
    println!("Capturing to {}", config.output_dir.display());
    println!();

    let factory = Arc::new(WebRtcFactory::new(config.webrtc_config())?);
    let (outbox, outbox_rx) = mpsc::channel(signaling.outbox_capacity);
    let registry = SessionRegistry::new(factory, config, outbox);
    let capture_done = registry.shutdown_token();

    let channel = Arc::new(WebSocketChannel::new(signaling.url.clone()));
    let client = SignalingClient::new(signaling, channel, registry, outbox_rx);

    client
        .run_until(async {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!("\nShutting down...");
                }
                _ = capture_done.cancelled() => {
                    println!("Capture finished");
                }
            }
        })
        .await?;

    Ok(())
}
