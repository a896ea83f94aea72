//! Serialized synchronization runs
//!
//! One lane per account: a single worker consumes commands in arrival order,
//! so no two fetches, and no fetch-and-apply interleaved with a live apply,
//! can ever run concurrently. Sync triggers queued while a run is in flight
//! collapse into exactly one follow-up run; live batches are applied strictly
//! in arrival order.

use super::fetcher::{FetchError, HistoryFetcher};
use super::metrics::SyncMetrics;
use super::reconcile::DeliveryReconciler;
use super::state::{DriftTracker, SyncSignals, SyncState, TriggerReason};
use crate::infra::sync::{
	last_stable_id, CursorStore, EventPipeline, Notification, PipelineError, StoreError,
	SyncEvent, SyncEventBus,
};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Terminal failure of one sync run, surfaced to the triggering caller
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
	#[error(transparent)]
	Fetch(FetchError),

	#[error(transparent)]
	Pipeline(#[from] PipelineError),

	#[error(transparent)]
	Store(#[from] StoreError),

	#[error("sync engine shut down")]
	ShutDown,
}

/// Commands consumed by the lane worker
pub(crate) enum LaneCommand {
	/// Start (or join) a catch-up run
	Sync {
		reason: TriggerReason,
		with_retries: bool,
		done: oneshot::Sender<Result<(), SyncError>>,
	},

	/// Apply a live-socket batch, chained after whatever is pending
	ApplyLive { batch: Vec<Notification> },
}

/// Owns the per-account sync lane and executes runs on it
pub struct SyncCoordinator {
	account_id: Uuid,
	cursor: Arc<dyn CursorStore>,
	pipeline: Arc<dyn EventPipeline>,
	fetcher: HistoryFetcher,
	reconciler: DeliveryReconciler,
	drift: Arc<DriftTracker>,
	signals: Arc<SyncSignals>,
	events: SyncEventBus,
	metrics: Arc<SyncMetrics>,
}

impl SyncCoordinator {
	#[allow(clippy::too_many_arguments)]
	pub(crate) fn new(
		account_id: Uuid,
		cursor: Arc<dyn CursorStore>,
		pipeline: Arc<dyn EventPipeline>,
		fetcher: HistoryFetcher,
		reconciler: DeliveryReconciler,
		drift: Arc<DriftTracker>,
		signals: Arc<SyncSignals>,
		events: SyncEventBus,
		metrics: Arc<SyncMetrics>,
	) -> Self {
		Self {
			account_id,
			cursor,
			pipeline,
			fetcher,
			reconciler,
			drift,
			signals,
			events,
			metrics,
		}
	}

	/// Lane worker loop; exits when the lane closes or shutdown flips
	///
	/// Commands run to completion once picked up. Shutdown interrupts waits
	/// inside a run through the retry scheduler, never mid-application.
	pub(crate) async fn run_lane(
		self: Arc<Self>,
		lane: async_channel::Receiver<LaneCommand>,
		mut shutdown: watch::Receiver<bool>,
	) {
		info!(account_id = %self.account_id, "Sync lane started");

		// a live batch drained while coalescing sync triggers is stashed and
		// processed next, preserving arrival order
		let mut stashed: Option<LaneCommand> = None;

		loop {
			let command = match stashed.take() {
				Some(command) => command,
				None => tokio::select! {
					command = lane.recv() => match command {
						Ok(command) => command,
						Err(_) => break,
					},
					_ = shutdown.changed() => {
						if *shutdown.borrow() {
							break;
						}
						continue;
					}
				},
			};

			match command {
				LaneCommand::ApplyLive { batch } => self.apply_live(batch).await,

				LaneCommand::Sync {
					reason,
					with_retries,
					done,
				} => {
					// coalesce every sync trigger already queued into this
					// run; stop at the first live batch to preserve order
					let mut waiters = vec![done];
					let mut retries = with_retries;
					let mut coalesced = 0u32;
					while let Ok(next) = lane.try_recv() {
						match next {
							LaneCommand::Sync {
								with_retries, done, ..
							} => {
								coalesced += 1;
								retries = retries || with_retries;
								waiters.push(done);
							}
							live @ LaneCommand::ApplyLive { .. } => {
								stashed = Some(live);
								break;
							}
						}
					}

					debug!(
						account_id = %self.account_id,
						reason = %reason,
						coalesced,
						"Starting sync run"
					);

					let result = self.run_once(retries).await;
					if let Err(err) = &result {
						warn!(account_id = %self.account_id, error = %err, "Sync run failed");
					}
					for waiter in waiters {
						let _ = waiter.send(result.clone());
					}
				}
			}

			if *shutdown.borrow() {
				break;
			}
		}

		info!(account_id = %self.account_id, "Sync lane stopped");
	}

	/// Execute one catch-up run
	async fn run_once(&self, with_retries: bool) -> Result<(), SyncError> {
		self.metrics.record_run_started();

		// the cursor is read fresh at run start, never from trigger time
		let cursor = self.cursor.stable_cursor().await.map_err(|err| {
			self.finish_failed();
			SyncError::Store(err)
		})?;
		self.signals.set_state(SyncState::FetchingFromCursor {
			cursor: cursor.clone(),
		});

		let result = match self.fetcher.fetch(cursor, with_retries).await {
			Ok(result) => result,
			Err(FetchError::ShutDown) => {
				self.finish_failed();
				return Err(SyncError::ShutDown);
			}
			Err(err) => {
				self.finish_failed();
				return Err(SyncError::Fetch(err));
			}
		};

		if let Some(server_time) = result.server_time {
			self.drift.update_from_server_time(server_time);
		}

		if let Err(err) = self.reconciler.reconcile(&result).await {
			self.finish_failed();
			return Err(SyncError::Store(err));
		}

		if !result.notifications.is_empty() {
			let stable = last_stable_id(&result.notifications).cloned();
			let count = result.notifications.len() as u64;

			self.signals.set_processing(true);
			let applied = self.pipeline.apply_events(result.notifications).await;
			if let Err(err) = applied {
				self.signals.set_processing(false);
				self.finish_failed();
				return Err(SyncError::Pipeline(err));
			}
			self.metrics.record_notifications_applied(count);

			// only a non-transient notification may become the durable
			// cursor; a transient-only batch is redelivered after a crash
			if let Some(id) = stable {
				debug!(account_id = %self.account_id, cursor = %id, "Advancing stable cursor");
				if let Err(err) = self.cursor.set_stable_cursor(id).await {
					self.signals.set_processing(false);
					self.finish_failed();
					return Err(SyncError::Store(err));
				}
			}
			self.signals.set_processing(false);
		}

		if result.history_lost {
			// reported exactly once per chain, however many replays it took
			let at = self.drift.now();
			info!(account_id = %self.account_id, "History lost; requesting full resync");
			self.pipeline.request_full_resync().await;
			self.signals.set_history_lost_at(at);
			self.events.emit(SyncEvent::HistoryLost {
				account_id: self.account_id,
				at,
			});
		}

		self.signals.set_state(SyncState::Idle);
		self.metrics.record_run_completed();
		Ok(())
	}

	fn finish_failed(&self) {
		self.signals.set_state(SyncState::Idle);
		self.metrics.record_run_failed();
	}

	/// Apply a live-socket batch in arrival order
	///
	/// Live batches have no awaiting caller; pipeline rejections are logged
	/// and the cursor stays put so the next catch-up covers the range again.
	async fn apply_live(&self, batch: Vec<Notification>) {
		if batch.is_empty() {
			return;
		}

		debug!(
			account_id = %self.account_id,
			count = batch.len(),
			"Applying live notification batch"
		);
		self.metrics.record_live_batch();

		let stable = last_stable_id(&batch).cloned();
		let count = batch.len() as u64;

		self.signals.set_processing(true);
		match self.pipeline.apply_events(batch).await {
			Ok(()) => {
				self.metrics.record_notifications_applied(count);
				// same rule as catch-up: only non-transient ids advance the
				// cursor, otherwise the next forward fetch re-delivers
				if let Some(id) = stable {
					if let Err(err) = self.cursor.set_stable_cursor(id).await {
						warn!(
							account_id = %self.account_id,
							error = %err,
							"Failed to advance cursor after live batch"
						);
					}
				}
			}
			Err(err) => {
				warn!(
					account_id = %self.account_id,
					error = %err,
					"Pipeline rejected live batch; cursor unchanged"
				);
			}
		}
		self.signals.set_processing(false);
	}
}
