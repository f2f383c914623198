//! Concurrent carpool-journey CSV import and paginated export.
//!
//! The crate turns semicolon-delimited journey dumps into database rows
//! and streams them back out page by page:
//!
//! - [`import`]: a sequencer/worker-pool parsing stage with per-row fault
//!   isolation, feeding a batched insertion pool.
//! - [`export`]: a single offset cursor republishing fixed-size pages.
//! - [`store`]: the `RecordSink`/`PageSource` seams plus the Postgres
//!   implementation behind both.
//! - [`config`]: environment-driven tuning knobs with working defaults.

pub mod config;
pub mod export;
pub mod import;
pub mod models;
pub mod store;

pub use config::{ExportConfig, ImportConfig};
pub use export::ExportPipeline;
pub use import::{ImportOutcome, ImportPipeline};
pub use models::Journey;
pub use store::{PageSource, PgJourneyStore, RecordSink, StoreError};
