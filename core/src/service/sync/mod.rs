//! Notification synchronization service
//!
//! Background service reconciling the live socket feed with the paginated
//! notification history API: one serialized lane per account, catch-up
//! fetches with connectivity-aware retries, push delivery reconciliation and
//! backend drift tracking.
//!
//! Construction wires the collaborators together; `start` spawns the lane
//! worker plus the socket intake tasks, and `stop` signals shutdown. One
//! service instance per account; accounts run independent lanes.

pub mod coordinator;
pub mod fetcher;
pub mod metrics;
pub mod reconcile;
pub mod retry;
pub mod state;

use crate::infra::sync::{
	CursorStore, EventPipeline, HistoryTransport, NetworkStatus, ProvisionalPushStore,
	SocketFeed, SyncConfig, SyncEventBus, TimeSource,
};
use crate::service::Service;
use anyhow::Result;
use async_trait::async_trait;
use coordinator::LaneCommand;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use coordinator::{SyncCoordinator, SyncError};
pub use fetcher::{FetchError, HistoryFetcher};
pub use metrics::{SyncMetrics, SyncMetricsSnapshot};
pub use reconcile::DeliveryReconciler;
pub use retry::{RetryScheduler, RetryWaitOutcome};
pub use state::{DriftTracker, SyncSignals, SyncState, TriggerReason};

/// Everything the engine consumes from the embedding application
pub struct SyncCollaborators {
	pub transport: Arc<dyn HistoryTransport>,
	pub cursor: Arc<dyn CursorStore>,
	pub pushes: Arc<dyn ProvisionalPushStore>,
	pub pipeline: Arc<dyn EventPipeline>,
	pub network: watch::Receiver<NetworkStatus>,
	pub app_in_background: watch::Receiver<bool>,
	pub time: Arc<dyn TimeSource>,
}

/// Notification sync service for one account
pub struct NotificationSyncService {
	account_id: Uuid,
	client_id: Uuid,
	config: Arc<SyncConfig>,
	coordinator: Arc<SyncCoordinator>,
	signals: Arc<SyncSignals>,
	events: SyncEventBus,
	metrics: Arc<SyncMetrics>,
	socket: SocketFeed,
	lane_tx: async_channel::Sender<LaneCommand>,
	lane_rx: async_channel::Receiver<LaneCommand>,
	is_running: Arc<AtomicBool>,
	shutdown_tx: watch::Sender<bool>,
}

impl NotificationSyncService {
	pub fn new(
		account_id: Uuid,
		client_id: Uuid,
		config: SyncConfig,
		collaborators: SyncCollaborators,
		socket: SocketFeed,
	) -> Self {
		let config = Arc::new(config);
		let signals = Arc::new(SyncSignals::new());
		let events = SyncEventBus::new(config.channels.event_bus_capacity);
		let metrics = Arc::new(SyncMetrics::default());
		let (shutdown_tx, shutdown_rx) = watch::channel(false);

		let drift = Arc::new(DriftTracker::new(collaborators.time, signals.clone()));

		let retry = RetryScheduler::new(
			config.backoff.clone(),
			collaborators.network.clone(),
			socket.state_receiver(),
			shutdown_rx,
			signals.clone(),
		);

		let fetcher = HistoryFetcher::new(
			collaborators.transport,
			retry,
			config.monitoring.clone(),
			client_id,
			signals.clone(),
			metrics.clone(),
		);

		let reconciler = DeliveryReconciler::new(
			account_id,
			collaborators.pushes,
			drift.clone(),
			events.clone(),
			collaborators.network,
			collaborators.app_in_background,
			metrics.clone(),
		);

		let coordinator = Arc::new(SyncCoordinator::new(
			account_id,
			collaborators.cursor,
			collaborators.pipeline,
			fetcher,
			reconciler,
			drift,
			signals.clone(),
			events.clone(),
			metrics.clone(),
		));

		let (lane_tx, lane_rx) = async_channel::unbounded();

		Self {
			account_id,
			client_id,
			config,
			coordinator,
			signals,
			events,
			metrics,
			socket,
			lane_tx,
			lane_rx,
			is_running: Arc::new(AtomicBool::new(false)),
			shutdown_tx,
		}
	}

	pub fn account_id(&self) -> Uuid {
		self.account_id
	}

	pub fn client_id(&self) -> Uuid {
		self.client_id
	}

	pub fn config(&self) -> &Arc<SyncConfig> {
		&self.config
	}

	/// Observable signals: processing, drift, retry wait, history loss
	pub fn signals(&self) -> &Arc<SyncSignals> {
		&self.signals
	}

	/// Diagnostics event bus: missed pushes, fetch latencies, history loss
	pub fn events(&self) -> &SyncEventBus {
		&self.events
	}

	pub fn metrics(&self) -> &Arc<SyncMetrics> {
		&self.metrics
	}

	/// Explicitly trigger a history sync and await its completion
	///
	/// Idempotent while a run is in flight: every call made during the run
	/// joins the single coalesced follow-up run and resolves with its result.
	pub async fn sync_history(&self, reason: &str, with_retries: bool) -> Result<(), SyncError> {
		if !self.is_running.load(Ordering::SeqCst) {
			return Err(SyncError::ShutDown);
		}

		let (done_tx, done_rx) = oneshot::channel();
		self.lane_tx
			.send(LaneCommand::Sync {
				reason: TriggerReason::Requested(reason.to_string()),
				with_retries,
				done: done_tx,
			})
			.await
			.map_err(|_| SyncError::ShutDown)?;

		done_rx.await.map_err(|_| SyncError::ShutDown)?
	}

	/// Run `action` once `processing` is next observed false
	///
	/// Runs immediately when no pipeline application is underway.
	pub async fn after_processing<F>(&self, action: F)
	where
		F: FnOnce() + Send,
	{
		self.signals.wait_until_idle().await;
		action();
	}

	/// Live batch intake: forwards decoded socket batches onto the lane
	fn spawn_live_intake(&self) {
		let lane_tx = self.lane_tx.clone();
		let mut batches = BroadcastStream::new(self.socket.subscribe_batches());
		let mut shutdown = self.shutdown_tx.subscribe();
		let account_id = self.account_id;

		tokio::spawn(async move {
			loop {
				tokio::select! {
					item = batches.next() => match item {
						Some(Ok(batch)) => {
							if lane_tx.send(LaneCommand::ApplyLive { batch }).await.is_err() {
								break;
							}
						}
						Some(Err(BroadcastStreamRecvError::Lagged(missed))) => {
							// dropped batches resurface through the next
							// catch-up fetch
							warn!(
								account_id = %account_id,
								missed,
								"Live batch intake lagged"
							);
						}
						None => break,
					},
					_ = shutdown.changed() => {
						if *shutdown.borrow() {
							break;
						}
					}
				}
			}
			debug!(account_id = %account_id, "Live batch intake stopped");
		});
	}

	/// Socket state intake: every connectivity transition triggers a
	/// coalescable sync run
	fn spawn_socket_state_intake(&self) {
		let lane_tx = self.lane_tx.clone();
		let mut state_rx = self.socket.state_receiver();
		let mut shutdown = self.shutdown_tx.subscribe();
		let account_id = self.account_id;

		tokio::spawn(async move {
			loop {
				tokio::select! {
					changed = state_rx.changed() => {
						if changed.is_err() {
							break;
						}
						let socket_state = *state_rx.borrow_and_update();
						debug!(
							account_id = %account_id,
							state = %socket_state,
							"Socket state changed; scheduling sync"
						);
						// fire-and-forget: nobody awaits connectivity syncs
						let (done, _) = oneshot::channel();
						let command = LaneCommand::Sync {
							reason: TriggerReason::SocketState(socket_state),
							with_retries: true,
							done,
						};
						if lane_tx.send(command).await.is_err() {
							break;
						}
					}
					_ = shutdown.changed() => {
						if *shutdown.borrow() {
							break;
						}
					}
				}
			}
			debug!(account_id = %account_id, "Socket state intake stopped");
		});
	}
}

#[async_trait]
impl Service for NotificationSyncService {
	fn name(&self) -> &'static str {
		"notification_sync"
	}

	fn is_running(&self) -> bool {
		self.is_running.load(Ordering::SeqCst)
	}

	async fn start(&self) -> Result<()> {
		if self.is_running.swap(true, Ordering::SeqCst) {
			warn!(account_id = %self.account_id, "Sync service already running");
			return Ok(());
		}

		info!(
			account_id = %self.account_id,
			client_id = %self.client_id,
			"Starting notification sync service"
		);

		// reset shutdown flag in case of a restart
		self.shutdown_tx.send_replace(false);

		let coordinator = self.coordinator.clone();
		let lane_rx = self.lane_rx.clone();
		let shutdown = self.shutdown_tx.subscribe();
		let is_running = self.is_running.clone();
		tokio::spawn(async move {
			coordinator.run_lane(lane_rx, shutdown).await;
			is_running.store(false, Ordering::SeqCst);
		});

		self.spawn_live_intake();
		self.spawn_socket_state_intake();

		info!(account_id = %self.account_id, "Notification sync service started");
		Ok(())
	}

	async fn stop(&self) -> Result<()> {
		if !self.is_running.load(Ordering::SeqCst) {
			return Ok(());
		}

		info!(account_id = %self.account_id, "Stopping notification sync service");

		self.shutdown_tx.send_replace(true);
		self.is_running.store(false, Ordering::SeqCst);

		Ok(())
	}
}
