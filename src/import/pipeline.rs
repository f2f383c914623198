//! Concurrent CSV parsing stage.
//!
//! One sequencer reads rows in source order and feeds a bounded job queue;
//! a pool of workers decodes rows concurrently and fans results back into
//! a record stream and an error stream. The stage runs through this state
//! machine:
//!
//! ```text
//! Start -> ReadHeader -> { EmptyInput | HeaderError | Streaming }
//!                                          -> Draining -> Closed
//! ```
//!
//! The header row is read and discarded without validation. End-of-input
//! on the header read is terminal success (empty and header-only files
//! import cleanly); any other header read failure is terminal failure and
//! dispatches no rows. A mid-stream read failure stops the sequencer and
//! reports one terminal error, but rows already queued still parse.
//!
//! Both output channels close once the sequencer is done and every worker
//! has drained the queue. That closure is the only termination signal the
//! downstream stages consume; there is no separate done flag.
//!
//! With more than one worker, records may come out in a different order
//! than their source rows. Callers must not rely on emission order.

use std::io::Read;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::import::parser::{Row, parse_row};
use crate::models::Journey;

/// Spawn the parsing stage over `reader`.
///
/// Returns immediately; the handle resolves once the stage has fully
/// drained. The job queue is bounded to the worker count, so the sequencer
/// blocks (backpressure) instead of buffering the whole file.
///
/// Cancellation stops the sequencer from dispatching further rows; workers
/// drain whatever is already queued and exit.
pub fn spawn_parsing_stage<R>(
    reader: R,
    workers: usize,
    delimiter: u8,
    cancel: CancellationToken,
    record_tx: mpsc::Sender<Journey>,
    error_tx: mpsc::Sender<String>,
) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    tokio::spawn(async move {
        let workers = workers.max(1);
        let (job_tx, job_rx) = mpsc::channel::<Row>(workers);
        let job_rx = Arc::new(Mutex::new(job_rx));

        log::debug!("starting {workers} parser workers");
        let mut pool = JoinSet::new();
        for _ in 0..workers {
            let jobs = Arc::clone(&job_rx);
            let records = record_tx.clone();
            let errors = error_tx.clone();
            pool.spawn(parser_worker(jobs, records, errors));
        }

        // CSV reading is blocking I/O; keep it off the async runtime.
        let sequencer =
            tokio::task::spawn_blocking(move || run_sequencer(reader, delimiter, cancel, job_tx, error_tx));

        if let Err(e) = sequencer.await {
            log::error!("sequencer task failed: {e}");
        }
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                log::error!("parser worker failed: {e}");
            }
        }
        // All sender clones are gone at this point, which closes both
        // output streams.
        log::debug!("parsing stage closed");
    })
}

/// Pull jobs from the shared queue until it closes, decoding each one.
async fn parser_worker(
    jobs: Arc<Mutex<mpsc::Receiver<Row>>>,
    records: mpsc::Sender<Journey>,
    errors: mpsc::Sender<String>,
) {
    log::trace!("parser worker started");
    loop {
        let row = { jobs.lock().await.recv().await };
        let Some(row) = row else { break };

        match parse_row(&row) {
            Ok(journey) => {
                if records.send(journey).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                log::debug!("{e}");
                if errors.send(e.to_string()).await.is_err() {
                    break;
                }
            }
        }
    }
    log::trace!("parser worker ended");
}

/// Read the header, then dispatch data rows in source order.
fn run_sequencer<R: Read>(
    reader: R,
    delimiter: u8,
    cancel: CancellationToken,
    jobs: mpsc::Sender<Row>,
    errors: mpsc::Sender<String>,
) {
    let csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut rows = csv_reader.into_records();

    // Exactly one header row, discarded. Its content is never validated.
    match rows.next() {
        None => {
            log::info!("end of the file");
            return;
        }
        Some(Err(e)) => {
            log::error!("error reading headers: {e}");
            let _ = errors.blocking_send(e.to_string());
            return;
        }
        Some(Ok(_)) => log::debug!("header row discarded"),
    }

    let mut position = 0usize;
    for result in rows {
        if cancel.is_cancelled() {
            log::info!("import cancelled after {position} rows");
            break;
        }
        position += 1;
        match result {
            Ok(record) => {
                let row = Row {
                    tokens: record.iter().map(str::to_string).collect(),
                    position,
                };
                if jobs.blocking_send(row).is_err() {
                    // Worker pool went away; nothing left to feed.
                    break;
                }
            }
            Err(e) => {
                log::error!("error reading csv input at row {position}: {e}");
                let _ = errors.blocking_send(e.to_string());
                break;
            }
        }
    }
    // Dropping the job sender closes the queue; queued rows still parse.
    log::debug!("sequencer dispatched {position} rows");
}
