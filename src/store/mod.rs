//! Persistence seams for the import and export pipelines.
//!
//! The pipelines never talk to a database directly; they consume the two
//! traits below. [`postgres::PgJourneyStore`] implements both over a
//! connection pool, and the integration tests substitute in-memory fakes.

pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Journey;

pub use postgres::PgJourneyStore;

/// Errors surfaced by a sink or source implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Bulk destination for parsed journeys.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persist one batch and return how many records were inserted.
    ///
    /// Empty batches must succeed with a count of 0. The insertion pool
    /// calls this concurrently from up to its configured worker count;
    /// implementations must be safe under that load or serialize
    /// internally.
    async fn add_batch(&self, journeys: &[Journey]) -> Result<u64, StoreError>;
}

/// Paginated source of persisted journeys.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch up to `limit` journeys starting at the zero-based `offset`.
    ///
    /// Pagination must be deterministic and stable across calls for the
    /// duration of one export.
    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Vec<Journey>, StoreError>;
}
