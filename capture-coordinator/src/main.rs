//! Capture coordinator - main entry point.
//!
//! Runs the coordinator against a browser-side relay speaking
//! length-prefixed JSON frames on stdin/stdout.

use capture_coordinator::bridge::{InboundFrame, OutboundFrame, RelayTransport};
use capture_coordinator::{relay, BackendClient, Config, Coordinator, StateStore};
use std::io;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.general.log_level.clone())),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    info!("Starting capture coordinator");

    let db_path = config.storage.resolved_db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = StateStore::open(&db_path)?;
    info!("State store at {:?}", db_path);

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundFrame>();
    let transport = RelayTransport::new(outbound_tx.clone());

    let backend = BackendClient::new(config.backend.session_endpoint.clone());
    let mut coordinator = Coordinator::new(
        &config,
        transport.clone(),
        transport.clone(),
        backend,
        store,
    );

    // Writer thread: serialize outbound frames onto stdout.
    std::thread::spawn(move || {
        let mut stdout = io::stdout().lock();
        while let Some(frame) = outbound_rx.blocking_recv() {
            if let Err(e) = relay::write_json(&mut stdout, &frame) {
                warn!("relay write failed: {e}");
                break;
            }
        }
    });

    // Reader thread: decode inbound frames off stdin. Replies are routed
    // to the transport right here, not through the dispatch loop: the
    // loop may be blocked inside a UI command that is itself waiting for
    // one of these replies.
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<InboundFrame>();
    let reply_router = transport.clone();
    std::thread::spawn(move || {
        let mut stdin = io::stdin().lock();
        loop {
            match relay::read_json::<_, InboundFrame>(&mut stdin) {
                Ok(Some(InboundFrame::Reply { id, payload })) => {
                    reply_router.dispatch_reply(id, payload);
                }
                Ok(Some(frame)) => {
                    if inbound_tx.send(frame).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(relay::RelayError::Malformed(e)) => {
                    warn!("dropping malformed frame: {e}");
                }
                Err(e) => {
                    warn!("relay read failed: {e}");
                    break;
                }
            }
        }
    });

    // Dispatch loop; ends when the relay closes stdin.
    capture_coordinator::coordinator::dispatch_frames(
        &mut coordinator,
        &mut inbound_rx,
        &outbound_tx,
        &transport,
    )
    .await;

    info!("Relay closed, shutting down");
    Ok(())
}
