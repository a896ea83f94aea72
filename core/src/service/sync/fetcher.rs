//! Paged history catch-up
//!
//! Drives single-page requests from a cursor to the newest notification:
//! follows `has_more` using the last id of each page, recovers from
//! server-side history truncation by replaying from the start, and defers
//! transient failures to the retry scheduler.

use super::metrics::SyncMetrics;
use super::retry::{RetryScheduler, RetryWaitOutcome};
use super::state::{SyncSignals, SyncState};
use crate::infra::sync::{
	FetchResult, HistoryTransport, MonitoringConfig, NotificationId, TransportError,
};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Terminal fetch failures
///
/// History gaps never surface here; they are recovered internally by a full
/// replay and reported through `FetchResult::history_lost`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
	/// A single attempt failed and retries were disabled for this invocation
	#[error("history fetch failed: {0}")]
	Failed(#[source] TransportError),

	/// All retry attempts were exhausted
	#[error("history fetch failed after {attempts} attempts: {source}")]
	RetriesExhausted {
		attempts: u32,
		#[source]
		source: TransportError,
	},

	/// The engine shut down while a retry wait was pending
	#[error("sync engine shut down during fetch")]
	ShutDown,
}

/// Pages through the history API from a cursor to the newest notification
pub struct HistoryFetcher {
	transport: Arc<dyn HistoryTransport>,
	retry: RetryScheduler,
	monitoring: MonitoringConfig,
	client_id: Uuid,
	signals: Arc<SyncSignals>,
	metrics: Arc<SyncMetrics>,
}

impl HistoryFetcher {
	pub fn new(
		transport: Arc<dyn HistoryTransport>,
		retry: RetryScheduler,
		monitoring: MonitoringConfig,
		client_id: Uuid,
		signals: Arc<SyncSignals>,
		metrics: Arc<SyncMetrics>,
	) -> Self {
		Self {
			transport,
			retry,
			monitoring,
			client_id,
			signals,
			metrics,
		}
	}

	/// Fetch everything newer than `cursor`, one page at a time
	///
	/// Notifications come back in server delivery order across all pages; no
	/// reordering or deduplication happens here. A NotFound against a
	/// supplied cursor restarts the accumulation from no-cursor with
	/// `history_lost` forced true; any other failure goes through the retry
	/// scheduler unless `with_retries` is false.
	pub async fn fetch(
		&self,
		cursor: Option<NotificationId>,
		with_retries: bool,
	) -> Result<FetchResult, FetchError> {
		let mut cursor = cursor;
		let mut notifications = Vec::new();
		let mut server_time = None;
		let mut history_lost = false;
		let mut attempt: u32 = 0;
		let mut pages: u32 = 0;

		loop {
			match self.transport.load_page(cursor.as_ref(), self.client_id).await {
				Ok(page) => {
					attempt = 0;
					pages += 1;
					self.metrics.record_page_fetched();

					if page.server_time.is_some() {
						server_time = page.server_time;
					}

					debug!(
						page = pages,
						count = page.notifications.len(),
						has_more = page.has_more,
						"Fetched history page"
					);

					if history_lost && pages == self.monitoring.full_replay_warn_pages {
						warn!(pages, "Full history replay is still paging; large backlog");
					}

					let next_cursor = page.notifications.last().map(|n| n.id.clone());
					notifications.extend(page.notifications);

					if !page.has_more {
						break;
					}
					match next_cursor {
						Some(id) => cursor = Some(id),
						// an empty page cannot advance the cursor
						None => break,
					}
				}

				Err(TransportError::NotFound) if cursor.is_some() => {
					let lost = cursor.take();
					warn!(
						cursor = %lost.map(|id| id.0).unwrap_or_default(),
						"Cursor beyond server retention; replaying history from the start"
					);
					self.signals.set_state(SyncState::HistoryLostRecovery);
					self.metrics.record_history_lost();

					history_lost = true;
					notifications.clear();
					server_time = None;
					pages = 0;
					attempt = 0;
				}

				Err(err) => {
					if !with_retries {
						return Err(FetchError::Failed(err));
					}
					if attempt >= self.retry.max_attempts() {
						return Err(FetchError::RetriesExhausted {
							attempts: attempt,
							source: err,
						});
					}

					debug!(attempt, error = %err, "History page request failed; scheduling retry");
					self.signals.set_state(SyncState::WaitingForRetry { attempt });
					self.metrics.record_retry_wait();

					match self.retry.next_attempt(attempt).await {
						RetryWaitOutcome::Resolved => {
							attempt += 1;
							self.signals.set_state(if history_lost {
								SyncState::HistoryLostRecovery
							} else {
								SyncState::FetchingFromCursor {
									cursor: cursor.clone(),
								}
							});
						}
						RetryWaitOutcome::ShutDown => return Err(FetchError::ShutDown),
					}
				}
			}
		}

		Ok(FetchResult {
			notifications,
			server_time,
			history_lost,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::infra::sync::{
		BackoffConfig, FetchPage, NetworkMode, NetworkWatcher, Notification, SocketFeed,
	};
	use async_trait::async_trait;
	use std::collections::VecDeque;
	use tokio::sync::{watch, Mutex};

	struct StubHistory {
		script: Mutex<VecDeque<Result<FetchPage, TransportError>>>,
		cursors_seen: Mutex<Vec<Option<NotificationId>>>,
	}

	impl StubHistory {
		fn new(script: Vec<Result<FetchPage, TransportError>>) -> Arc<Self> {
			Arc::new(Self {
				script: Mutex::new(script.into()),
				cursors_seen: Mutex::new(Vec::new()),
			})
		}
	}

	#[async_trait]
	impl HistoryTransport for StubHistory {
		async fn load_page(
			&self,
			cursor: Option<&NotificationId>,
			_client_id: Uuid,
		) -> Result<FetchPage, TransportError> {
			self.cursors_seen.lock().await.push(cursor.cloned());
			self.script
				.lock()
				.await
				.pop_front()
				.unwrap_or(Ok(FetchPage {
					notifications: vec![],
					has_more: false,
					server_time: None,
				}))
		}
	}

	/// Keeps the connectivity channels alive for the fetcher under test
	struct FetcherRig {
		fetcher: HistoryFetcher,
		_network: NetworkWatcher,
		_socket: SocketFeed,
		_shutdown: watch::Sender<bool>,
	}

	fn rig(transport: Arc<StubHistory>) -> FetcherRig {
		let network = NetworkWatcher::default();
		// a usable network lets backoff waits resolve as soon as they elapse
		network.set_mode(NetworkMode::Usable);
		let socket = SocketFeed::new(8);
		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		let signals = Arc::new(SyncSignals::new());
		let retry = RetryScheduler::new(
			BackoffConfig {
				base_delay_ms: 1,
				max_delay_ms: 10,
				max_attempts: 2,
			},
			network.subscribe(),
			socket.state_receiver(),
			shutdown_rx,
			signals.clone(),
		);
		FetcherRig {
			fetcher: HistoryFetcher::new(
				transport,
				retry,
				MonitoringConfig::default(),
				Uuid::new_v4(),
				signals,
				Arc::new(SyncMetrics::default()),
			),
			_network: network,
			_socket: socket,
			_shutdown: shutdown_tx,
		}
	}

	fn note(id: &str) -> Notification {
		Notification {
			id: id.into(),
			events: vec![],
			transient: false,
		}
	}

	fn page(ids: &[&str], has_more: bool) -> Result<FetchPage, TransportError> {
		Ok(FetchPage {
			notifications: ids.iter().map(|id| note(id)).collect(),
			has_more,
			server_time: None,
		})
	}

	#[tokio::test]
	async fn test_follows_has_more_with_page_cursor() {
		let history = StubHistory::new(vec![page(&["43", "44"], true), page(&["45"], false)]);
		let result = rig(history.clone())
			.fetcher
			.fetch(Some("42".into()), true)
			.await
			.unwrap();

		let ids: Vec<_> = result.notifications.iter().map(|n| n.id.as_str()).collect();
		assert_eq!(ids, ["43", "44", "45"]);
		assert!(!result.history_lost);

		let cursors = history.cursors_seen.lock().await.clone();
		assert_eq!(cursors, vec![Some("42".into()), Some("44".into())]);
	}

	#[tokio::test]
	async fn test_not_found_with_cursor_replays_from_start() {
		let history = StubHistory::new(vec![
			Err(TransportError::NotFound),
			page(&["1", "2", "3"], false),
		]);
		let result = rig(history.clone())
			.fetcher
			.fetch(Some("42".into()), true)
			.await
			.unwrap();

		assert!(result.history_lost);
		assert_eq!(result.notifications.len(), 3);

		let cursors = history.cursors_seen.lock().await.clone();
		assert_eq!(cursors, vec![Some("42".into()), None]);
	}

	#[tokio::test]
	async fn test_failure_without_retries_is_terminal() {
		let history = StubHistory::new(vec![Err(TransportError::Other("boom".into()))]);
		let err = rig(history).fetcher.fetch(Some("42".into()), false).await;

		assert!(matches!(err, Err(FetchError::Failed(_))));
	}

	#[tokio::test]
	async fn test_retries_exhaust_after_max_attempts() {
		let history = StubHistory::new(vec![
			Err(TransportError::Other("a".into())),
			Err(TransportError::Other("b".into())),
			Err(TransportError::Other("c".into())),
		]);
		let err = rig(history.clone()).fetcher.fetch(None, true).await;

		assert!(matches!(
			err,
			Err(FetchError::RetriesExhausted { attempts: 2, .. })
		));
		assert_eq!(history.cursors_seen.lock().await.len(), 3);
	}

	#[tokio::test]
	async fn test_transient_failure_recovers_on_retry() {
		let history = StubHistory::new(vec![
			Err(TransportError::Other("blip".into())),
			page(&["43"], false),
		]);
		let result = rig(history)
			.fetcher
			.fetch(Some("42".into()), true)
			.await
			.unwrap();

		assert_eq!(result.notifications.len(), 1);
		assert!(!result.history_lost);
	}
}
