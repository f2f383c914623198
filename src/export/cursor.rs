//! Sequential page cursor.
//!
//! Pulls fixed-size pages from a [`PageSource`] in offset order and
//! republishes each non-empty page whole on the output stream. The first
//! page shorter than the requested size (including the empty page, which is
//! never published) ends the export; closing the output channel is the only
//! completion signal.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::Journey;
use crate::store::PageSource;

/// Consecutive fetch failures tolerated before the cursor gives up.
/// A successful fetch resets the budget; a failed fetch retries the same
/// offset, so a transient fault never skips a page.
const MAX_CONSECUTIVE_FETCH_FAILURES: u32 = 3;

/// Drive the cursor until end-of-data, cancellation, consumer loss or an
/// exhausted failure budget. Publishing blocks until the consumer accepts
/// the page.
pub async fn run_export_cursor<P>(
    source: Arc<P>,
    page_size: u64,
    start_offset: u64,
    cancel: CancellationToken,
    page_tx: mpsc::Sender<Vec<Journey>>,
    error_tx: mpsc::Sender<String>,
) where
    P: PageSource + ?Sized,
{
    let page_size = page_size.max(1);
    let mut offset = start_offset;
    let mut consecutive_failures = 0u32;

    loop {
        if cancel.is_cancelled() {
            log::info!("export cancelled at offset {offset}");
            break;
        }

        match source.fetch_page(offset, page_size).await {
            Ok(page) => {
                consecutive_failures = 0;
                let fetched = page.len() as u64;
                log::trace!("fetched {fetched} journeys at offset {offset}");
                if fetched > 0 && page_tx.send(page).await.is_err() {
                    log::debug!("export consumer went away at offset {offset}");
                    break;
                }
                offset += page_size;
                if fetched < page_size {
                    // Short page: end of data.
                    break;
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                log::warn!(
                    "page fetch failed at offset {offset} \
                     ({consecutive_failures}/{MAX_CONSECUTIVE_FETCH_FAILURES}): {e}"
                );
                let _ = error_tx.send(e.to_string()).await;
                if consecutive_failures >= MAX_CONSECUTIVE_FETCH_FAILURES {
                    let _ = error_tx
                        .send(format!(
                            "export aborted after {MAX_CONSECUTIVE_FETCH_FAILURES} \
                             consecutive fetch failures at offset {offset}"
                        ))
                        .await;
                    break;
                }
            }
        }
    }
    log::debug!("export cursor closed");
}
