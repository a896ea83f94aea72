//! Courier client core
//!
//! The notification synchronization engine of the Courier messaging client.
//! It reconciles two individually unreliable delivery channels, the live
//! socket feed and the paginated notification history API, into one ordered
//! stream of server events handed to the local event pipeline, surviving
//! connection loss, transient fetch failures and server-side history
//! truncation along the way.
//!
//! The engine owns no transport, storage or event decoding of its own; those
//! are collaborator seams in [`infra::sync`]. The service itself lives in
//! [`service::sync`].

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub mod infra;
pub mod service;

pub use infra::sync::{
	FetchPage, FetchResult, Notification, NotificationId, ProvisionalPush, SocketFeed,
	SocketState, SyncConfig, SyncEvent, SyncEventBus,
};
pub use service::sync::{NotificationSyncService, SyncCollaborators, SyncError};
pub use service::Service;

/// Initialise logging for an embedding application
///
/// Console output plus a daily-rolling file log under `data_dir/logs`, both
/// filtered by `RUST_LOG` (defaulting to warnings globally and info for
/// courier modules). The returned guard must be kept alive for the file
/// writer to flush.
pub fn init_logging(data_dir: impl AsRef<Path>) -> anyhow::Result<WorkerGuard> {
	let logs_dir = data_dir.as_ref().join("logs");
	std::fs::create_dir_all(&logs_dir)?;

	let (non_blocking, guard) = tracing_appender::non_blocking(rolling::daily(logs_dir, "courier.log"));

	tracing_subscriber::registry()
		.with(fmt::layer().with_ansi(false).with_writer(non_blocking))
		.with(fmt::layer())
		.with(
			EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| EnvFilter::new("warn,courier_core=info")),
		)
		.try_init()?;

	Ok(guard)
}
