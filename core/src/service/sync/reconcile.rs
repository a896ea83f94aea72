//! Push delivery reconciliation
//!
//! After every successful catch-up the engine compares what the fetch
//! delivered with the out-of-band push hints recorded since the last run:
//! hints confirmed by the fetch yield latency measurements, and a surplus of
//! fetched notifications over recorded hints means pushes were lost in
//! transit. Either way, the considered records are cleared: they represent
//! "things expected by now" and must not accumulate.

use super::metrics::SyncMetrics;
use super::state::DriftTracker;
use crate::infra::sync::{
	FetchResult, FetchedPushLatency, MissedPushSummary, NetworkStatus, NotificationId,
	ProvisionalPushStore, StoreError, SyncEvent, SyncEventBus,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

/// Reconciles fetch results against provisional push records
pub struct DeliveryReconciler {
	account_id: Uuid,
	pushes: Arc<dyn ProvisionalPushStore>,
	drift: Arc<DriftTracker>,
	events: SyncEventBus,
	network: watch::Receiver<NetworkStatus>,
	app_in_background: watch::Receiver<bool>,
	metrics: Arc<SyncMetrics>,
}

impl DeliveryReconciler {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		account_id: Uuid,
		pushes: Arc<dyn ProvisionalPushStore>,
		drift: Arc<DriftTracker>,
		events: SyncEventBus,
		network: watch::Receiver<NetworkStatus>,
		app_in_background: watch::Receiver<bool>,
		metrics: Arc<SyncMetrics>,
	) -> Self {
		Self {
			account_id,
			pushes,
			drift,
			events,
			network,
			app_in_background,
			metrics,
		}
	}

	/// Reconcile `result` against the provisional records accumulated so far
	pub async fn reconcile(&self, result: &FetchResult) -> Result<(), StoreError> {
		let provisional = self.pushes.list().await?;

		let fetched_ids: HashSet<&NotificationId> =
			result.notifications.iter().map(|n| &n.id).collect();
		let now = self.drift.corrected_now();

		for push in &provisional {
			if fetched_ids.contains(&push.id) {
				// negative latencies (clock skew) clamp to zero
				let to_fetch = (now - push.received_at).to_std().unwrap_or_default();
				debug!(
					id = %push.id,
					to_fetch_ms = to_fetch.as_millis() as u64,
					"Provisional push confirmed by fetch"
				);
				self.events.emit(SyncEvent::PushLatency {
					account_id: self.account_id,
					latency: FetchedPushLatency {
						id: push.id.clone(),
						to_fetch,
					},
				});
			}
		}

		let fetched_count = result.notifications.len() as u64;
		let hinted_count = provisional.len() as u64;
		if fetched_count > hinted_count {
			let status = self.network.borrow().clone();
			let summary = MissedPushSummary {
				observed_at: now,
				missed_count: fetched_count - hinted_count,
				app_in_background: *self.app_in_background.borrow(),
				network_mode: status.mode,
				network_operator: status.operator,
			};
			warn!(
				missed = summary.missed_count,
				fetched = fetched_count,
				hinted = hinted_count,
				"Push delivery hints were lost"
			);
			self.metrics.record_missed_pushes(summary.missed_count);
			self.events.emit(SyncEvent::MissedPushes {
				account_id: self.account_id,
				summary,
			});
		}

		if !provisional.is_empty() {
			let ids: Vec<NotificationId> = provisional.into_iter().map(|p| p.id).collect();
			self.pushes.remove(&ids).await?;
		}

		Ok(())
	}
}
