//! Sync state machine, observable signals and drift tracking

use crate::infra::sync::{NotificationId, SocketState, TimeSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Coordinator state for one account's sync lane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
	/// No run in flight
	Idle,

	/// A catch-up fetch is paging forward from the given cursor
	FetchingFromCursor { cursor: Option<NotificationId> },

	/// A transient failure occurred; waiting out backoff or an early trigger
	WaitingForRetry { attempt: u32 },

	/// The cursor was not resolvable; replaying history from the start
	HistoryLostRecovery,
}

impl SyncState {
	pub fn is_idle(&self) -> bool {
		matches!(self, SyncState::Idle)
	}

	pub fn is_fetching(&self) -> bool {
		matches!(self, SyncState::FetchingFromCursor { .. })
	}

	pub fn is_waiting_for_retry(&self) -> bool {
		matches!(self, SyncState::WaitingForRetry { .. })
	}

	pub fn in_flight(&self) -> bool {
		!self.is_idle()
	}
}

/// Why a sync run was triggered
#[derive(Debug, Clone)]
pub enum TriggerReason {
	/// Explicit `sync_history` call with a caller-supplied label
	Requested(String),

	/// Socket connectivity transition
	SocketState(SocketState),
}

impl fmt::Display for TriggerReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TriggerReason::Requested(label) => write!(f, "requested({label})"),
			TriggerReason::SocketState(state) => write!(f, "socket_state({state})"),
		}
	}
}

/// Externally visible signals of the sync engine
///
/// All signals are watch channels: consumers sample the latest value or
/// await changes without ever blocking the engine.
#[derive(Debug)]
pub struct SyncSignals {
	state: watch::Sender<SyncState>,
	processing: watch::Sender<bool>,
	waiting_for_retry: watch::Sender<bool>,
	backend_drift: watch::Sender<chrono::Duration>,
	history_lost_at: watch::Sender<Option<DateTime<Utc>>>,
}

impl Default for SyncSignals {
	fn default() -> Self {
		Self::new()
	}
}

impl SyncSignals {
	pub fn new() -> Self {
		let (state, _) = watch::channel(SyncState::Idle);
		let (processing, _) = watch::channel(false);
		let (waiting_for_retry, _) = watch::channel(false);
		let (backend_drift, _) = watch::channel(chrono::Duration::zero());
		let (history_lost_at, _) = watch::channel(None);
		Self {
			state,
			processing,
			waiting_for_retry,
			backend_drift,
			history_lost_at,
		}
	}

	pub(crate) fn set_state(&self, state: SyncState) {
		self.state.send_replace(state);
	}

	pub fn state(&self) -> SyncState {
		self.state.borrow().clone()
	}

	pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
		self.state.subscribe()
	}

	pub(crate) fn set_processing(&self, processing: bool) {
		self.processing.send_replace(processing);
	}

	/// True for the span from "events received" to "pipeline application
	/// complete"
	pub fn processing(&self) -> bool {
		*self.processing.borrow()
	}

	pub fn subscribe_processing(&self) -> watch::Receiver<bool> {
		self.processing.subscribe()
	}

	pub(crate) fn set_waiting_for_retry(&self, waiting: bool) {
		self.waiting_for_retry.send_replace(waiting);
	}

	pub fn waiting_for_retry(&self) -> bool {
		*self.waiting_for_retry.borrow()
	}

	pub fn subscribe_waiting_for_retry(&self) -> watch::Receiver<bool> {
		self.waiting_for_retry.subscribe()
	}

	pub(crate) fn set_backend_drift(&self, drift: chrono::Duration) {
		self.backend_drift.send_replace(drift);
	}

	/// Last measured `server_time - local_time` offset
	pub fn backend_drift(&self) -> chrono::Duration {
		*self.backend_drift.borrow()
	}

	pub fn subscribe_backend_drift(&self) -> watch::Receiver<chrono::Duration> {
		self.backend_drift.subscribe()
	}

	pub(crate) fn set_history_lost_at(&self, at: DateTime<Utc>) {
		self.history_lost_at.send_replace(Some(at));
	}

	/// When the most recent history loss was detected, if ever
	pub fn history_lost_at(&self) -> Option<DateTime<Utc>> {
		*self.history_lost_at.borrow()
	}

	pub fn subscribe_history_lost_at(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
		self.history_lost_at.subscribe()
	}

	/// Resolve once `processing` is next observed false
	///
	/// Resolves immediately when no application is underway.
	pub async fn wait_until_idle(&self) {
		let mut rx = self.processing.subscribe();
		let _ = rx.wait_for(|processing| !processing).await;
	}
}

/// Tracks the measured clock offset to the backend
///
/// Refreshed after every successful fetch carrying a server time, as
/// `server_time - local_now`. Time-sensitive callers read the latest value
/// from the `backend_drift` signal or correct local timestamps through
/// `corrected_now`.
pub struct DriftTracker {
	time: Arc<dyn TimeSource>,
	signals: Arc<SyncSignals>,
}

impl DriftTracker {
	pub fn new(time: Arc<dyn TimeSource>, signals: Arc<SyncSignals>) -> Self {
		Self { time, signals }
	}

	/// Recompute drift from a freshly fetched server time
	pub fn update_from_server_time(&self, server_time: DateTime<Utc>) -> chrono::Duration {
		let drift = server_time - self.time.now();
		self.signals.set_backend_drift(drift);
		debug!(drift_ms = drift.num_milliseconds(), "Backend drift updated");
		drift
	}

	/// Local now shifted by the last measured drift, approximating the
	/// server's clock
	pub fn corrected_now(&self) -> DateTime<Utc> {
		self.time.now() + self.signals.backend_drift()
	}

	/// Uncorrected local now
	pub fn now(&self) -> DateTime<Utc> {
		self.time.now()
	}
}
