//! Remote history source seam
//!
//! The engine consumes the paginated notification history API through this
//! trait; the concrete HTTP client and its JSON decoding live with the
//! embedding application.

use super::model::{FetchPage, NotificationId};
use async_trait::async_trait;
use uuid::Uuid;

/// Errors a single history page request can produce
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
	/// The supplied cursor is no longer resolvable server-side
	#[error("notification cursor no longer available")]
	NotFound,

	/// Network or server failure, eligible for retry
	#[error("history request failed: {0}")]
	Other(String),
}

/// Paginated notification history API
#[async_trait]
pub trait HistoryTransport: Send + Sync {
	/// Request one page of notifications newer than `cursor`
	///
	/// `None` requests from the beginning of retained history.
	async fn load_page(
		&self,
		cursor: Option<&NotificationId>,
		client_id: Uuid,
	) -> Result<FetchPage, TransportError>;
}
