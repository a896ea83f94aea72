//! Dedicated event bus for sync delivery diagnostics
//!
//! Missed-push summaries, fetch latencies and history-loss notices are
//! broadcast here, separate from the live notification feed so diagnostics
//! subscribers never contend with the engine's own intake.

use super::model::{FetchedPushLatency, MissedPushSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Diagnostics events published by the sync engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
	/// A catch-up found more notifications than out-of-band hints were
	/// recorded for; pushes were lost in transit
	MissedPushes {
		account_id: Uuid,
		summary: MissedPushSummary,
	},

	/// A provisional push was confirmed by a fetch after `latency.to_fetch`
	PushLatency {
		account_id: Uuid,
		latency: FetchedPushLatency,
	},

	/// The server could no longer resolve our cursor; a full replay ran
	HistoryLost {
		account_id: Uuid,
		at: DateTime<Utc>,
	},
}

impl SyncEvent {
	pub fn account_id(&self) -> Uuid {
		match self {
			SyncEvent::MissedPushes { account_id, .. } => *account_id,
			SyncEvent::PushLatency { account_id, .. } => *account_id,
			SyncEvent::HistoryLost { account_id, .. } => *account_id,
		}
	}

	pub fn event_type(&self) -> &'static str {
		match self {
			SyncEvent::MissedPushes { .. } => "MissedPushes",
			SyncEvent::PushLatency { .. } => "PushLatency",
			SyncEvent::HistoryLost { .. } => "HistoryLost",
		}
	}
}

/// Broadcast bus for sync diagnostics events
#[derive(Debug, Clone)]
pub struct SyncEventBus {
	sender: broadcast::Sender<SyncEvent>,
}

impl SyncEventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Emit an event to all subscribers
	///
	/// Returns the number of active subscribers that received it.
	pub fn emit(&self, event: SyncEvent) -> usize {
		let event_type = event.event_type();
		let account_id = event.account_id();

		match self.sender.send(event) {
			Ok(subscribers) => {
				debug!(
					event_type,
					account_id = %account_id,
					subscribers,
					"Sync event emitted"
				);
				subscribers
			}
			Err(_) => {
				// no subscribers; normal before diagnostics attach
				debug!(
					event_type,
					account_id = %account_id,
					"Sync event emitted but no subscribers"
				);
				0
			}
		}
	}

	pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
		self.sender.subscribe()
	}
}
