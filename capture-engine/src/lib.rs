//! Interaction capture engine.
//!
//! Extracts structured interaction records (prompt, model response,
//! attachments, provenance metadata) from the DOM of live AI chat
//! applications and relays them to a coordinating process. The engine
//! tolerates hostile, frequently-changing DOM structures: extraction
//! rules are per-provider data tables, misses are silent, and duplicate
//! suppression rides on an output-text signature rather than on any
//! assumption about how the page mutates.
//!
//! # Architecture
//!
//! A [`session::TabSession`] per tab consumes page events (DOM
//! snapshots, clicks, navigations, poll ticks), runs the
//! [`extractor::InteractionExtractor`] under the
//! [`scheduler::ChangeScheduler`]'s strategy, enriches output through
//! the [`harvest`] module, and emits protocol messages to the
//! coordinator.

pub mod config;
pub mod dom;
pub mod dom_path;
pub mod extractor;
pub mod harvest;
pub mod protocol;
pub mod provider;
pub mod scheduler;
pub mod selector;
pub mod session;
pub mod text;
pub mod types;

// Re-export commonly used types
pub use config::EngineConfig;
pub use dom::{Document, NodeId};
pub use dom_path::locate;
pub use extractor::{InteractionDraft, InteractionExtractor};
pub use harvest::{AssetFetcher, AssetLookup, FetchError, FetchedAsset, HttpAssetFetcher};
pub use protocol::{EngineMessage, TabCommand, TabReply};
pub use provider::{ExtractionRules, Provider, RuleRegistry, WatchStrategy};
pub use scheduler::{ChangeScheduler, WatchState};
pub use session::{PageEvent, SessionRegistry, TabSession};
pub use text::deep_text;
pub use types::{
    Attachment, AttachmentKind, CapturedPath, Interaction, InteractionOutput, OriginTab,
    RecentAsset, TabId,
};
