//! Insertion buffer pool.
//!
//! Consumes the record stream produced by the parsing stage and delivers
//! records to a [`RecordSink`] in bulk. Each worker owns one private,
//! unshared batch: it appends records until the batch threshold is reached,
//! flushes, and starts over. When the record stream closes, each worker
//! flushes whatever it still holds before exiting, so every record reaching
//! the pool is handed to the sink exactly once. An empty final batch makes
//! no sink call.
//!
//! Flushed counts flow through a dedicated counts channel and are summed by
//! a single collector; batches are worker-private, so the count is
//! race-free. The pool never serializes sink calls: the sink must tolerate
//! as many concurrent callers as there are workers.
//!
//! A failed flush is reported on the error stream (the batch's records
//! count as not inserted) and the worker moves on to its next batch.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;

use crate::models::Journey;
use crate::store::RecordSink;

/// Run `workers` insertion workers over the record stream until it closes.
///
/// Returns the total number of records the sink reported inserted.
pub async fn run_insertion_pool<S>(
    sink: Arc<S>,
    records: mpsc::Receiver<Journey>,
    workers: usize,
    batch_size: usize,
    error_tx: mpsc::Sender<String>,
) -> u64
where
    S: RecordSink + 'static,
{
    let workers = workers.max(1);
    let batch_size = batch_size.max(1);
    let records = Arc::new(Mutex::new(records));
    let (count_tx, mut count_rx) = mpsc::channel::<u64>(workers);

    log::debug!("starting {workers} insertion workers (batch size {batch_size})");
    let mut pool = JoinSet::new();
    for _ in 0..workers {
        pool.spawn(insertion_worker(
            Arc::clone(&sink),
            Arc::clone(&records),
            batch_size,
            count_tx.clone(),
            error_tx.clone(),
        ));
    }
    drop(count_tx);

    let collector = tokio::spawn(async move {
        let mut total = 0u64;
        while let Some(inserted) = count_rx.recv().await {
            total += inserted;
        }
        total
    });

    while let Some(joined) = pool.join_next().await {
        if let Err(e) = joined {
            log::error!("insertion worker failed: {e}");
        }
    }

    match collector.await {
        Ok(total) => total,
        Err(e) => {
            log::error!("flush collector failed: {e}");
            0
        }
    }
}

async fn insertion_worker<S: RecordSink + ?Sized>(
    sink: Arc<S>,
    records: Arc<Mutex<mpsc::Receiver<Journey>>>,
    batch_size: usize,
    counts: mpsc::Sender<u64>,
    errors: mpsc::Sender<String>,
) {
    log::trace!("insertion worker started");
    let mut batch: Vec<Journey> = Vec::with_capacity(batch_size);
    loop {
        let journey = { records.lock().await.recv().await };
        let Some(journey) = journey else { break };

        batch.push(journey);
        if batch.len() >= batch_size {
            flush(sink.as_ref(), &mut batch, &counts, &errors).await;
        }
    }
    // Record stream closed: flush the remainder, if any.
    if !batch.is_empty() {
        flush(sink.as_ref(), &mut batch, &counts, &errors).await;
    }
    log::trace!("insertion worker ended");
}

async fn flush<S: RecordSink + ?Sized>(
    sink: &S,
    batch: &mut Vec<Journey>,
    counts: &mpsc::Sender<u64>,
    errors: &mpsc::Sender<String>,
) {
    match sink.add_batch(batch).await {
        Ok(inserted) => {
            log::trace!("flushed batch of {} ({inserted} inserted)", batch.len());
            let _ = counts.send(inserted).await;
        }
        Err(e) => {
            log::error!("batch flush failed: {e}");
            let _ = errors
                .send(format!("failed to persist batch of {}: {e}", batch.len()))
                .await;
        }
    }
    batch.clear();
}
