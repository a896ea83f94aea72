//! Retry scheduling with connectivity-aware early resolution
//!
//! A failed page request does not simply sleep out its backoff window: the
//! wait races the timer against connectivity signals, so a network that
//! briefly becomes usable or a socket that reconnects triggers an immediate
//! retry instead of waiting out the full delay.

use super::state::SyncSignals;
use crate::infra::sync::{BackoffConfig, NetworkStatus, SocketState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Outcome of a retry wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryWaitOutcome {
	/// Time to retry: backoff elapsed on a usable network, or an early
	/// trigger fired
	Resolved,

	/// The engine is shutting down; do not retry
	ShutDown,
}

/// Waits out exponential backoff between fetch attempts
///
/// The wait resolves on whichever comes first: the backoff delay elapsing
/// while the network is usable, a network-mode transition into usable, or
/// any socket connectivity change. Shutdown resolves the wait cleanly
/// without scheduling a retry.
pub struct RetryScheduler {
	config: BackoffConfig,
	network: watch::Receiver<NetworkStatus>,
	socket: watch::Receiver<SocketState>,
	shutdown: watch::Receiver<bool>,
	signals: Arc<SyncSignals>,
}

impl RetryScheduler {
	pub fn new(
		config: BackoffConfig,
		network: watch::Receiver<NetworkStatus>,
		socket: watch::Receiver<SocketState>,
		shutdown: watch::Receiver<bool>,
		signals: Arc<SyncSignals>,
	) -> Self {
		Self {
			config,
			network,
			socket,
			shutdown,
			signals,
		}
	}

	pub fn max_attempts(&self) -> u32 {
		self.config.max_attempts
	}

	/// Resolve when retry attempt `attempt` should run
	///
	/// `waiting_for_retry` is true for exactly the duration of the wait.
	pub async fn next_attempt(&self, attempt: u32) -> RetryWaitOutcome {
		let delay = self.config.delay_for(attempt);
		debug!(attempt, delay_ms = delay.as_millis() as u64, "Waiting before retry");

		self.signals.set_waiting_for_retry(true);
		let outcome = self.wait(delay).await;
		self.signals.set_waiting_for_retry(false);

		debug!(attempt, ?outcome, "Retry wait resolved");
		outcome
	}

	async fn wait(&self, delay: Duration) -> RetryWaitOutcome {
		let mut gate = self.network.clone();
		let mut transitions = self.network.clone();
		let mut socket = self.socket.clone();
		let mut shutdown = self.shutdown.clone();

		// only transitions that happen after this point count as triggers
		transitions.mark_unchanged();
		socket.mark_unchanged();

		tokio::select! {
			_ = async {
				tokio::time::sleep(delay).await;
				// backoff elapsed; go as soon as the network is usable
				if gate.wait_for(|status| status.mode.is_usable()).await.is_err() {
					std::future::pending::<()>().await;
				}
			} => RetryWaitOutcome::Resolved,

			_ = Self::network_became_usable(&mut transitions) => RetryWaitOutcome::Resolved,

			_ = async {
				if socket.changed().await.is_err() {
					std::future::pending::<()>().await;
				}
			} => RetryWaitOutcome::Resolved,

			// resolves when shutdown flips true, or when the engine owning
			// the sender is gone entirely
			_ = async {
				let _ = shutdown.wait_for(|stop| *stop).await;
			} => RetryWaitOutcome::ShutDown,
		}
	}

	/// Resolve on the first transition into a usable mode
	async fn network_became_usable(rx: &mut watch::Receiver<NetworkStatus>) {
		loop {
			if rx.changed().await.is_err() {
				std::future::pending::<()>().await;
			}
			if rx.borrow_and_update().mode.is_usable() {
				return;
			}
		}
	}
}
