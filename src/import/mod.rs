//! Journey CSV import pipeline.
//!
//! # Architecture Overview
//!
//! An import run wires three stages per request:
//!
//! 1. **Parsing stage** ([`pipeline`]): a sequencer reads `;`-delimited
//!    rows in source order and feeds a bounded job queue; a configurable
//!    pool of workers decodes rows concurrently ([`parser`]) and fans
//!    results into a record stream and an error stream.
//! 2. **Insertion pool** ([`buffer`]): workers accumulate records into
//!    private batches and bulk-flush them to a
//!    [`RecordSink`](crate::store::RecordSink).
//! 3. **Collector** ([`ImportPipeline::run`]): drains the error stream and
//!    sums the flushed counts into the final [`ImportOutcome`].
//!
//! ## Failure policy
//!
//! Row-level errors never stop the pipeline; they are collected and
//! reported with their row numbers. Only a header read failure or a
//! mid-stream read failure is fatal to the sequencer, and even then
//! records produced before the fault remain valid and delivered. Sink
//! flush failures are reported per batch and the run continues.

pub mod buffer;
pub mod parser;
pub mod pipeline;

use std::io::Read;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ImportConfig;
use crate::store::RecordSink;

/// Capacity of the aggregate error stream. The orchestrator drains it
/// continuously, so it only needs to absorb short bursts.
const ERROR_STREAM_CAPACITY: usize = 64;

/// Final result of one import run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    /// Total records the sink reported inserted.
    pub inserted: u64,
    /// Row-level and terminal errors, in no particular order.
    pub errors: Vec<String>,
}

/// Orchestrates one import per call: parsing stage, insertion pool and
/// error collection over a shared sink.
pub struct ImportPipeline<S> {
    sink: Arc<S>,
    config: ImportConfig,
}

impl<S> ImportPipeline<S>
where
    S: RecordSink + 'static,
{
    pub fn new(sink: Arc<S>, config: ImportConfig) -> Self {
        Self { sink, config }
    }

    /// Run the import to completion.
    ///
    /// The first row of `reader` is treated as a header and discarded;
    /// an empty or header-only input yields a clean zero outcome. The
    /// returned error list holds one string per rejected row plus any
    /// terminal read or flush errors.
    pub async fn run<R>(&self, reader: R, cancel: CancellationToken) -> ImportOutcome
    where
        R: Read + Send + 'static,
    {
        let (record_tx, record_rx) = mpsc::channel(self.config.parser_workers.max(1));
        let (error_tx, mut error_rx) = mpsc::channel(ERROR_STREAM_CAPACITY);

        let stage = pipeline::spawn_parsing_stage(
            reader,
            self.config.parser_workers,
            self.config.delimiter,
            cancel,
            record_tx,
            error_tx.clone(),
        );
        let pool = tokio::spawn(buffer::run_insertion_pool(
            Arc::clone(&self.sink),
            record_rx,
            self.config.insert_workers,
            self.config.batch_size,
            error_tx,
        ));

        // Both error senders now live inside the two stages; the stream
        // closes once both have finished.
        let mut errors = Vec::new();
        while let Some(error) = error_rx.recv().await {
            errors.push(error);
        }

        let inserted = match pool.await {
            Ok(inserted) => inserted,
            Err(e) => {
                log::error!("insertion pool failed: {e}");
                0
            }
        };
        if let Err(e) = stage.await {
            log::error!("parsing stage failed: {e}");
        }

        log::info!("import complete: {inserted} inserted, {} errors", errors.len());
        ImportOutcome { inserted, errors }
    }
}
