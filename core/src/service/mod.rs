//! Long-running background services
//!
//! Services share a common lifecycle so the embedding application can manage
//! them uniformly: spawn on `start`, signal shutdown on `stop`.

use anyhow::Result;
use async_trait::async_trait;

pub mod sync;

/// Common lifecycle for background services
#[async_trait]
pub trait Service: Send + Sync {
	fn name(&self) -> &'static str;

	fn is_running(&self) -> bool;

	async fn start(&self) -> Result<()>;

	async fn stop(&self) -> Result<()>;
}
