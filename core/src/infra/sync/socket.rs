//! Live socket feed
//!
//! The socket connection lifecycle (connect/reconnect/keepalive) lives with
//! the embedding application; the engine only consumes decoded notification
//! batches and connectivity transitions through this hub.

use super::model::Notification;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::debug;

/// Connectivity state of the live socket
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SocketState {
	Disconnected,
	Connected,
	Error,
}

/// Hub publishing live notification batches and socket connectivity
///
/// Batches use a broadcast channel so a slow diagnostics subscriber can never
/// block the engine intake; connectivity is a watch since only the latest
/// state matters.
#[derive(Debug, Clone)]
pub struct SocketFeed {
	batches: broadcast::Sender<Vec<Notification>>,
	state: watch::Sender<SocketState>,
}

impl SocketFeed {
	pub fn new(capacity: usize) -> Self {
		let (batches, _) = broadcast::channel(capacity);
		let (state, _) = watch::channel(SocketState::Disconnected);
		Self { batches, state }
	}

	/// Publish a decoded batch from the live socket
	///
	/// Returns the number of subscribers that received it.
	pub fn publish_batch(&self, batch: Vec<Notification>) -> usize {
		let count = batch.len();
		match self.batches.send(batch) {
			Ok(subscribers) => {
				debug!(count, subscribers, "Live notification batch published");
				subscribers
			}
			Err(_) => {
				// no intake running yet; the next catch-up fetch covers it
				debug!(count, "Live notification batch published with no subscribers");
				0
			}
		}
	}

	pub fn subscribe_batches(&self) -> broadcast::Receiver<Vec<Notification>> {
		self.batches.subscribe()
	}

	pub fn set_state(&self, state: SocketState) {
		self.state.send_replace(state);
	}

	pub fn state_receiver(&self) -> watch::Receiver<SocketState> {
		self.state.subscribe()
	}

	pub fn state(&self) -> SocketState {
		*self.state.borrow()
	}
}
