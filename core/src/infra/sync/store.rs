//! Durable cursor and provisional push storage seams
//!
//! Persistence belongs to the embedding application; the engine mutates both
//! stores exclusively from its serialized lane, so implementations need no
//! ordering guarantees beyond individual call atomicity. The in-memory
//! variants back tests and embedded use.

use super::model::{NotificationId, ProvisionalPush};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Storage failure from the embedding application's persistence layer
#[derive(Debug, Clone, thiserror::Error)]
#[error("sync store error: {0}")]
pub struct StoreError(pub String);

/// Durable "last stable notification id" for one account
#[async_trait]
pub trait CursorStore: Send + Sync {
	async fn stable_cursor(&self) -> Result<Option<NotificationId>, StoreError>;

	async fn set_stable_cursor(&self, id: NotificationId) -> Result<(), StoreError>;
}

/// Storage for received-but-unfetched push records
#[async_trait]
pub trait ProvisionalPushStore: Send + Sync {
	async fn list(&self) -> Result<Vec<ProvisionalPush>, StoreError>;

	/// Remove the listed records; unknown ids are ignored
	async fn remove(&self, ids: &[NotificationId]) -> Result<(), StoreError>;

	async fn record(&self, push: ProvisionalPush) -> Result<(), StoreError>;
}

/// In-memory cursor store
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
	cursor: RwLock<Option<NotificationId>>,
}

impl MemoryCursorStore {
	pub fn new(initial: Option<NotificationId>) -> Self {
		Self {
			cursor: RwLock::new(initial),
		}
	}
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
	async fn stable_cursor(&self) -> Result<Option<NotificationId>, StoreError> {
		Ok(self.cursor.read().await.clone())
	}

	async fn set_stable_cursor(&self, id: NotificationId) -> Result<(), StoreError> {
		*self.cursor.write().await = Some(id);
		Ok(())
	}
}

/// In-memory provisional push store
#[derive(Debug, Default)]
pub struct MemoryProvisionalPushStore {
	pushes: RwLock<Vec<ProvisionalPush>>,
}

#[async_trait]
impl ProvisionalPushStore for MemoryProvisionalPushStore {
	async fn list(&self) -> Result<Vec<ProvisionalPush>, StoreError> {
		Ok(self.pushes.read().await.clone())
	}

	async fn remove(&self, ids: &[NotificationId]) -> Result<(), StoreError> {
		self.pushes
			.write()
			.await
			.retain(|push| !ids.contains(&push.id));
		Ok(())
	}

	async fn record(&self, push: ProvisionalPush) -> Result<(), StoreError> {
		self.pushes.write().await.push(push);
		Ok(())
	}
}
