//! Sync engine metrics
//!
//! Cheap atomic counters recorded on the hot path, sampled into a
//! serializable snapshot for diagnostics surfaces.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one account's sync engine
#[derive(Debug, Default)]
pub struct SyncMetrics {
	runs_started: AtomicU64,
	runs_completed: AtomicU64,
	runs_failed: AtomicU64,
	pages_fetched: AtomicU64,
	retry_waits: AtomicU64,
	history_losses: AtomicU64,
	live_batches_applied: AtomicU64,
	notifications_applied: AtomicU64,
	missed_pushes: AtomicU64,
}

impl SyncMetrics {
	pub fn record_run_started(&self) {
		self.runs_started.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_run_completed(&self) {
		self.runs_completed.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_run_failed(&self) {
		self.runs_failed.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_page_fetched(&self) {
		self.pages_fetched.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_retry_wait(&self) {
		self.retry_waits.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_history_lost(&self) {
		self.history_losses.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_live_batch(&self) {
		self.live_batches_applied.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_notifications_applied(&self, count: u64) {
		self.notifications_applied.fetch_add(count, Ordering::Relaxed);
	}

	pub fn record_missed_pushes(&self, count: u64) {
		self.missed_pushes.fetch_add(count, Ordering::Relaxed);
	}

	/// Point-in-time view of all counters
	pub fn snapshot(&self) -> SyncMetricsSnapshot {
		SyncMetricsSnapshot {
			runs_started: self.runs_started.load(Ordering::Relaxed),
			runs_completed: self.runs_completed.load(Ordering::Relaxed),
			runs_failed: self.runs_failed.load(Ordering::Relaxed),
			pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
			retry_waits: self.retry_waits.load(Ordering::Relaxed),
			history_losses: self.history_losses.load(Ordering::Relaxed),
			live_batches_applied: self.live_batches_applied.load(Ordering::Relaxed),
			notifications_applied: self.notifications_applied.load(Ordering::Relaxed),
			missed_pushes: self.missed_pushes.load(Ordering::Relaxed),
		}
	}
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetricsSnapshot {
	pub runs_started: u64,
	pub runs_completed: u64,
	pub runs_failed: u64,
	pub pages_fetched: u64,
	pub retry_waits: u64,
	pub history_losses: u64,
	pub live_batches_applied: u64,
	pub notifications_applied: u64,
	pub missed_pushes: u64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_snapshot_reflects_counters() {
		let metrics = SyncMetrics::default();
		metrics.record_run_started();
		metrics.record_run_completed();
		metrics.record_page_fetched();
		metrics.record_page_fetched();
		metrics.record_notifications_applied(5);

		let snapshot = metrics.snapshot();
		assert_eq!(snapshot.runs_started, 1);
		assert_eq!(snapshot.runs_completed, 1);
		assert_eq!(snapshot.pages_fetched, 2);
		assert_eq!(snapshot.notifications_applied, 5);
		assert_eq!(snapshot.runs_failed, 0);
	}
}
