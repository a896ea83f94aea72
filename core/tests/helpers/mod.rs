//! Test helpers for notification sync integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_core::infra::sync::{
	AppStateWatcher, EventPipeline, FakeTimeSource, FetchPage, HistoryTransport,
	MemoryCursorStore, MemoryProvisionalPushStore, NetworkMode, NetworkWatcher, Notification,
	NotificationId, PipelineError, ProvisionalPush, SocketFeed, SyncConfig, TransportError,
};
use courier_core::service::sync::{NotificationSyncService, SyncCollaborators};
use courier_core::Service;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Timestamp helper for pinning fake clocks
pub fn at(millis: i64) -> DateTime<Utc> {
	DateTime::from_timestamp_millis(millis).unwrap()
}

/// Build a notification carrying one opaque event payload
pub fn note(id: &str, transient: bool) -> Notification {
	Notification {
		id: id.into(),
		events: vec![serde_json::json!({ "kind": "message", "id": id })],
		transient,
	}
}

/// Build a history page from `(id, transient)` pairs
pub fn page(
	ids: &[(&str, bool)],
	has_more: bool,
	server_time: Option<DateTime<Utc>>,
) -> Result<FetchPage, TransportError> {
	Ok(FetchPage {
		notifications: ids.iter().map(|(id, t)| note(id, *t)).collect(),
		has_more,
		server_time,
	})
}

/// Scripted fake of the history API
///
/// Pops one scripted response per `load_page` call, falling back to an empty
/// final page once the script runs dry. Records the cursor of every call and
/// tracks the concurrent-call high-water mark so tests can assert the
/// at-most-one-in-flight property.
pub struct ScriptedHistory {
	script: Mutex<VecDeque<Result<FetchPage, TransportError>>>,
	cursors_seen: Mutex<Vec<Option<NotificationId>>>,
	active: AtomicUsize,
	max_active: AtomicUsize,
	delay: Mutex<Duration>,
}

impl ScriptedHistory {
	pub fn new(script: Vec<Result<FetchPage, TransportError>>) -> Arc<Self> {
		Arc::new(Self {
			script: Mutex::new(script.into()),
			cursors_seen: Mutex::new(Vec::new()),
			active: AtomicUsize::new(0),
			max_active: AtomicUsize::new(0),
			delay: Mutex::new(Duration::ZERO),
		})
	}

	/// Extend the script with further responses
	pub async fn push_response(&self, response: Result<FetchPage, TransportError>) {
		self.script.lock().await.push_back(response);
	}

	/// Make every page request take at least `delay`, widening race windows
	pub async fn set_delay(&self, delay: Duration) {
		*self.delay.lock().await = delay;
	}

	pub async fn cursors_seen(&self) -> Vec<Option<NotificationId>> {
		self.cursors_seen.lock().await.clone()
	}

	pub async fn calls(&self) -> usize {
		self.cursors_seen.lock().await.len()
	}

	/// Highest number of page requests ever in flight at once
	pub fn max_concurrent_calls(&self) -> usize {
		self.max_active.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl HistoryTransport for ScriptedHistory {
	async fn load_page(
		&self,
		cursor: Option<&NotificationId>,
		_client_id: Uuid,
	) -> Result<FetchPage, TransportError> {
		let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
		self.max_active.fetch_max(active, Ordering::SeqCst);

		self.cursors_seen.lock().await.push(cursor.cloned());

		let delay = *self.delay.lock().await;
		if delay > Duration::ZERO {
			tokio::time::sleep(delay).await;
		}

		let response = self.script.lock().await.pop_front().unwrap_or(Ok(FetchPage {
			notifications: vec![],
			has_more: false,
			server_time: None,
		}));

		self.active.fetch_sub(1, Ordering::SeqCst);
		response
	}
}

/// Pipeline fake recording every applied notification in order
pub struct RecordingPipeline {
	applied: Mutex<Vec<Notification>>,
	fail_next: AtomicBool,
	resync_requests: AtomicUsize,
}

impl RecordingPipeline {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			applied: Mutex::new(Vec::new()),
			fail_next: AtomicBool::new(false),
			resync_requests: AtomicUsize::new(0),
		})
	}

	/// Reject the next `apply_events` call
	pub fn fail_next(&self) {
		self.fail_next.store(true, Ordering::SeqCst);
	}

	pub async fn applied(&self) -> Vec<Notification> {
		self.applied.lock().await.clone()
	}

	pub async fn applied_ids(&self) -> Vec<String> {
		self.applied
			.lock()
			.await
			.iter()
			.map(|n| n.id.as_str().to_string())
			.collect()
	}

	pub async fn applied_count(&self) -> usize {
		self.applied.lock().await.len()
	}

	pub fn resync_requests(&self) -> usize {
		self.resync_requests.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl EventPipeline for RecordingPipeline {
	async fn apply_events(&self, notifications: Vec<Notification>) -> Result<(), PipelineError> {
		if self.fail_next.swap(false, Ordering::SeqCst) {
			return Err(PipelineError("injected pipeline failure".into()));
		}
		self.applied.lock().await.extend(notifications);
		Ok(())
	}

	async fn request_full_resync(&self) {
		self.resync_requests.fetch_add(1, Ordering::SeqCst);
	}
}

/// Fully wired sync service over scripted collaborators
///
/// The service is held in an `Arc` so tests can clone it into spawned tasks
/// that race the main test body.
pub struct SyncHarness {
	pub service: Arc<NotificationSyncService>,
	pub history: Arc<ScriptedHistory>,
	pub pipeline: Arc<RecordingPipeline>,
	pub cursor: Arc<MemoryCursorStore>,
	pub pushes: Arc<MemoryProvisionalPushStore>,
	pub socket: SocketFeed,
	pub network: NetworkWatcher,
	pub app_state: AppStateWatcher,
	pub time: FakeTimeSource,
}

impl SyncHarness {
	/// Start a service over `script` with the cursor seeded to `cursor`
	pub async fn start(
		cursor: Option<&str>,
		script: Vec<Result<FetchPage, TransportError>>,
		config: SyncConfig,
	) -> anyhow::Result<Self> {
		init_test_tracing();

		let history = ScriptedHistory::new(script);
		let pipeline = RecordingPipeline::new();
		let cursor_store = Arc::new(MemoryCursorStore::new(cursor.map(Into::into)));
		let pushes = Arc::new(MemoryProvisionalPushStore::default());
		let socket = SocketFeed::new(config.channels.live_batch_capacity);
		let network = NetworkWatcher::default();
		network.set_mode(NetworkMode::Usable);
		let app_state = AppStateWatcher::new(false);
		let time = FakeTimeSource::new(at(1_000_000));

		let service = Arc::new(NotificationSyncService::new(
			Uuid::new_v4(),
			Uuid::new_v4(),
			config,
			SyncCollaborators {
				transport: history.clone(),
				cursor: cursor_store.clone(),
				pushes: pushes.clone(),
				pipeline: pipeline.clone(),
				network: network.subscribe(),
				app_in_background: app_state.subscribe(),
				time: Arc::new(time.clone()),
			},
			socket.clone(),
		));
		service.start().await?;

		Ok(Self {
			service,
			history,
			pipeline,
			cursor: cursor_store,
			pushes,
			socket,
			network,
			app_state,
			time,
		})
	}

	/// Harness with default timings suitable for fast tests
	pub async fn start_default(
		cursor: Option<&str>,
		script: Vec<Result<FetchPage, TransportError>>,
	) -> anyhow::Result<Self> {
		Self::start(cursor, script, fast_config()).await
	}

	pub async fn stable_cursor(&self) -> Option<String> {
		use courier_core::infra::sync::CursorStore;
		self.cursor
			.stable_cursor()
			.await
			.unwrap()
			.map(|id| id.as_str().to_string())
	}

	pub async fn record_push(&self, id: &str, received_at: DateTime<Utc>) {
		use courier_core::infra::sync::ProvisionalPushStore;
		self.pushes
			.record(ProvisionalPush {
				id: id.into(),
				received_at,
				to_fetch: None,
			})
			.await
			.unwrap();
	}
}

/// Config with millisecond backoff so retry paths run quickly
pub fn fast_config() -> SyncConfig {
	let mut config = SyncConfig::default();
	config.backoff.base_delay_ms = 10;
	config.backoff.max_delay_ms = 50;
	config.backoff.max_attempts = 3;
	config
}

/// Poll `check` until it holds or `timeout` elapses
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
	F: FnMut() -> Fut,
	Fut: Future<Output = bool>,
{
	let deadline = tokio::time::Instant::now() + timeout;
	loop {
		if check().await {
			return true;
		}
		if tokio::time::Instant::now() >= deadline {
			return false;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
}

pub fn init_test_tracing() {
	use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

	let _ = tracing_subscriber::registry()
		.with(fmt::layer().with_target(true).with_test_writer())
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
			EnvFilter::new(
				"courier_core::service::sync=debug,\
				 courier_core::infra::sync=debug",
			)
		}))
		.try_init();
}
