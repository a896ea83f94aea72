//! Sync infrastructure
//!
//! Everything the synchronization service builds on:
//! - Notification data model and fetch types
//! - Collaborator seams (history transport, cursor/push stores, pipeline)
//! - Connectivity and live-socket channels
//! - Diagnostics event bus
//! - Injectable time source for drift and latency measurement

pub mod config;
pub mod event_bus;
pub mod model;
pub mod net;
pub mod pipeline;
pub mod socket;
pub mod store;
pub mod time_source;
pub mod transport;

pub use config::{BackoffConfig, ChannelConfig, MonitoringConfig, SyncConfig};
pub use event_bus::{SyncEvent, SyncEventBus};
pub use model::{
	last_stable_id, FetchPage, FetchResult, FetchedPushLatency, MissedPushSummary, Notification,
	NotificationId, ProvisionalPush,
};
pub use net::{AppStateWatcher, NetworkMode, NetworkStatus, NetworkWatcher};
pub use pipeline::{EventPipeline, PipelineError};
pub use socket::{SocketFeed, SocketState};
pub use store::{
	CursorStore, MemoryCursorStore, MemoryProvisionalPushStore, ProvisionalPushStore, StoreError,
};
pub use time_source::{FakeTimeSource, SystemTimeSource, TimeSource};
pub use transport::{HistoryTransport, TransportError};
