//! Paginated journey export.
//!
//! The export side is independent of the import pipeline: a single cursor
//! ([`cursor`]) walks an external [`PageSource`](crate::store::PageSource)
//! by offset and republishes each non-empty page on a stream. The stream is
//! lazy, finite and non-restartable; the consumer paces the cursor because
//! publishing blocks until each page is accepted.

pub mod cursor;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ExportConfig;
use crate::models::Journey;
use crate::store::PageSource;

/// Capacity of the fetch-error side channel. The cursor emits at most a
/// handful of errors per failure burst before stopping.
const ERROR_STREAM_CAPACITY: usize = 16;

/// A running export: pages, fetch errors and the cursor's completion
/// handle. Channel closure is the only "export complete" signal.
pub struct ExportStream {
    pub pages: mpsc::Receiver<Vec<Journey>>,
    pub errors: mpsc::Receiver<String>,
    pub handle: JoinHandle<()>,
}

/// Starts one export cursor per call over a shared source.
pub struct ExportPipeline<P> {
    source: Arc<P>,
    config: ExportConfig,
}

impl<P> ExportPipeline<P>
where
    P: PageSource + 'static,
{
    pub fn new(source: Arc<P>, config: ExportConfig) -> Self {
        Self { source, config }
    }

    /// Spawn the cursor and hand back its streams.
    pub fn run(&self, cancel: CancellationToken) -> ExportStream {
        let (page_tx, pages) = mpsc::channel(1);
        let (error_tx, errors) = mpsc::channel(ERROR_STREAM_CAPACITY);

        let handle = tokio::spawn(cursor::run_export_cursor(
            Arc::clone(&self.source),
            self.config.page_size,
            self.config.start_offset,
            cancel,
            page_tx,
            error_tx,
        ));

        ExportStream { pages, errors, handle }
    }
}
