//! Data model for notification synchronization
//!
//! A notification is the unit of delivery: a server-assigned cursor id plus
//! the ordered event payloads it carries. Everything in this module is plain
//! data shared between the fetcher, the reconciler and the coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::net::NetworkMode;

/// Opaque server-assigned notification id, used as the history cursor
///
/// The engine compares ids only for equality; delivery order is the server's
/// concern (history pages arrive oldest to newest).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub String);

impl NotificationId {
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for NotificationId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for NotificationId {
	fn from(value: &str) -> Self {
		Self(value.to_string())
	}
}

impl From<String> for NotificationId {
	fn from(value: String) -> Self {
		Self(value)
	}
}

/// One server notification: a cursor id plus its ordered event payloads
///
/// `transient` notifications (typing indicators and the like) are delivered
/// to the pipeline but must not become the durable cursor on their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
	pub id: NotificationId,
	pub events: Vec<serde_json::Value>,
	pub transient: bool,
}

/// One page returned by the paginated history API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchPage {
	pub notifications: Vec<Notification>,
	pub has_more: bool,
	pub server_time: Option<DateTime<Utc>>,
}

/// Accumulation of all pages for one logical catch-up, oldest to newest
#[derive(Debug, Clone)]
pub struct FetchResult {
	pub notifications: Vec<Notification>,
	/// Most recent server time seen across the fetched pages
	pub server_time: Option<DateTime<Utc>>,
	/// The supplied cursor was no longer resolvable and history was replayed
	/// from the start
	pub history_lost: bool,
}

/// Id of the last non-transient notification in `notifications`, if any
pub fn last_stable_id(notifications: &[Notification]) -> Option<&NotificationId> {
	notifications
		.iter()
		.rev()
		.find(|n| !n.transient)
		.map(|n| &n.id)
}

/// Push record created from an out-of-band delivery hint, pending
/// confirmation against a fetched notification
///
/// Created by the platform push handler before the notification itself is
/// available; consumed by the reconciler once a catch-up fetch has run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionalPush {
	pub id: NotificationId,
	pub received_at: DateTime<Utc>,
	/// Latency until the record was matched by a fetch, once known
	pub to_fetch: Option<Duration>,
}

/// Delivery statistics emitted when a catch-up fetched more notifications
/// than out-of-band hints were recorded for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissedPushSummary {
	pub observed_at: DateTime<Utc>,
	pub missed_count: u64,
	pub app_in_background: bool,
	pub network_mode: NetworkMode,
	pub network_operator: Option<String>,
}

/// Latency between an out-of-band hint and the fetch that confirmed it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedPushLatency {
	pub id: NotificationId,
	pub to_fetch: Duration,
}
