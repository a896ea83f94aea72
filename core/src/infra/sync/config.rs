//! Sync engine configuration
//!
//! Passed explicitly into `NotificationSyncService`; never stored in
//! process-global state, so tests can run with hermetic timings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for the notification sync engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
	pub backoff: BackoffConfig,
	pub channels: ChannelConfig,
	pub monitoring: MonitoringConfig,
}

/// Exponential backoff policy for transient fetch failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
	/// Delay before the first retry, in milliseconds
	pub base_delay_ms: u64,

	/// Upper bound for a single delay, in milliseconds
	pub max_delay_ms: u64,

	/// Retry attempts before a run fails with `RetriesExhausted`
	pub max_attempts: u32,
}

impl Default for BackoffConfig {
	fn default() -> Self {
		Self {
			base_delay_ms: 500,
			max_delay_ms: 60_000,
			max_attempts: 8,
		}
	}
}

impl BackoffConfig {
	/// Delay before retry number `attempt` (zero-based), capped at
	/// `max_delay_ms`
	pub fn delay_for(&self, attempt: u32) -> Duration {
		let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
		let ms = self
			.base_delay_ms
			.saturating_mul(factor)
			.min(self.max_delay_ms);
		Duration::from_millis(ms)
	}
}

/// Capacities of the engine's internal channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
	/// Diagnostics event bus capacity
	pub event_bus_capacity: usize,

	/// Live notification batch broadcast capacity
	pub live_batch_capacity: usize,
}

impl Default for ChannelConfig {
	fn default() -> Self {
		Self {
			event_bus_capacity: 1024,
			live_batch_capacity: 256,
		}
	}
}

/// Observability thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
	/// Warn once a full-history replay is still paging past this many pages
	pub full_replay_warn_pages: u32,
}

impl Default for MonitoringConfig {
	fn default() -> Self {
		Self {
			full_replay_warn_pages: 50,
		}
	}
}
