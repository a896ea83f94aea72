//! Connectivity and app-state awareness
//!
//! Watch channels mirroring the platform's network and visibility callbacks,
//! so the retry scheduler can await transitions and the reconciler can sample
//! the latest values.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Coarse network reachability mode
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NetworkMode {
	Offline,
	Unknown,
	Usable,
}

impl NetworkMode {
	pub fn is_usable(&self) -> bool {
		matches!(self, NetworkMode::Usable)
	}
}

/// Network status as last reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatus {
	pub mode: NetworkMode,

	/// Carrier name, when the platform knows one
	pub operator: Option<String>,
}

impl Default for NetworkStatus {
	fn default() -> Self {
		Self {
			mode: NetworkMode::Unknown,
			operator: None,
		}
	}
}

/// Publishes network status changes to the engine
#[derive(Debug)]
pub struct NetworkWatcher {
	tx: watch::Sender<NetworkStatus>,
}

impl Default for NetworkWatcher {
	fn default() -> Self {
		Self::new(NetworkStatus::default())
	}
}

impl NetworkWatcher {
	pub fn new(initial: NetworkStatus) -> Self {
		let (tx, _) = watch::channel(initial);
		Self { tx }
	}

	pub fn set(&self, status: NetworkStatus) {
		self.tx.send_replace(status);
	}

	pub fn set_mode(&self, mode: NetworkMode) {
		self.tx.send_modify(|status| status.mode = mode);
	}

	pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
		self.tx.subscribe()
	}

	pub fn current(&self) -> NetworkStatus {
		self.tx.borrow().clone()
	}
}

/// Publishes whether the app is currently backgrounded
#[derive(Debug)]
pub struct AppStateWatcher {
	tx: watch::Sender<bool>,
}

impl Default for AppStateWatcher {
	fn default() -> Self {
		Self::new(false)
	}
}

impl AppStateWatcher {
	pub fn new(in_background: bool) -> Self {
		let (tx, _) = watch::channel(in_background);
		Self { tx }
	}

	pub fn set_in_background(&self, in_background: bool) {
		self.tx.send_replace(in_background);
	}

	pub fn subscribe(&self) -> watch::Receiver<bool> {
		self.tx.subscribe()
	}
}
