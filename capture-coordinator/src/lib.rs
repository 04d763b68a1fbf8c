//! Capture coordinator.
//!
//! Background-process counterpart to the capture engine: owns the
//! capture state machine and its persisted contract, delivers commands
//! to per-tab engine instances (injecting the engine when nobody is
//! listening), sniffs network responses for asset bodies, and forwards
//! completed sessions to the configured backend. The browser side talks
//! to it over length-prefixed JSON frames on stdin/stdout.

pub mod bridge;
pub mod config;
pub mod coordinator;
pub mod forwarder;
pub mod protocol;
pub mod relay;
pub mod sniffer;
pub mod state;
pub mod store;
pub mod tabs;

// Re-export commonly used types
pub use bridge::{InboundFrame, OutboundFrame, RelayTransport};
pub use config::Config;
pub use coordinator::{dispatch_frames, Coordinator};
pub use forwarder::{BackendClient, ForwardError, SessionSink};
pub use protocol::{UiCommand, UiResponse};
pub use sniffer::{AssetCache, NetworkSniffer, ResponseMeta, SharedAssets};
pub use state::{CaptureState, PersistedState};
pub use store::{StateStore, StoreError};
pub use tabs::{DeliveryError, TabCommander, TabTransport};
