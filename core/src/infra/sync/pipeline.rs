//! Downstream event pipeline seam
//!
//! The pipeline decodes and applies event payloads to local state. The
//! engine's only obligations toward it are ordering and at-most-once-per-run
//! delivery; everything past this trait is out of its hands.

use super::model::Notification;
use async_trait::async_trait;

/// Failure applying a batch to local state
///
/// Never retried by the engine; the cursor stays put so a later run covers
/// the same range again.
#[derive(Debug, Clone, thiserror::Error)]
#[error("event pipeline rejected batch: {0}")]
pub struct PipelineError(pub String);

/// Downstream pipeline that applies decoded events to local state
#[async_trait]
pub trait EventPipeline: Send + Sync {
	/// Apply the events carried by `notifications`, in order
	async fn apply_events(&self, notifications: Vec<Notification>) -> Result<(), PipelineError>;

	/// Ask the wider system for a full resynchronization after history loss
	async fn request_full_resync(&self);
}
