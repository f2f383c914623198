//! End-to-end import pipeline tests over in-memory sinks.

use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use journey_import::config::ImportConfig;
use journey_import::import::ImportPipeline;
use journey_import::models::Journey;
use journey_import::store::{RecordSink, StoreError};

const TRIP_ID: &str = "1fa85f64-5717-4562-b3fc-2c963f66afa6";
const HEADER: &str = "journey header row";

/// Sink that records every batch it receives.
#[derive(Default)]
struct MockSink {
    batches: Mutex<Vec<Vec<Journey>>>,
}

impl MockSink {
    async fn batches(&self) -> Vec<Vec<Journey>> {
        self.batches.lock().await.clone()
    }

    async fn journey_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .batches
            .lock()
            .await
            .iter()
            .flatten()
            .map(|j| j.journey_id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl RecordSink for MockSink {
    async fn add_batch(&self, journeys: &[Journey]) -> Result<u64, StoreError> {
        self.batches.lock().await.push(journeys.to_vec());
        Ok(journeys.len() as u64)
    }
}

/// Sink whose every flush fails.
struct FailingSink;

#[async_trait]
impl RecordSink for FailingSink {
    async fn add_batch(&self, _journeys: &[Journey]) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

fn row_29(id: i64) -> String {
    format!(
        "{id};{TRIP_ID};2023-01-05T09:30:00+01:00;2023-01-05;09:30:00;2;48;75056;75001;75;\
         Paris;Metropole du Grand Paris;France;2023-01-05T10:00:00+01:00;2023-01-05;10:00:00;\
         2;48;78646;78000;78;Versailles;Versailles Grand Parc;France;3;A;17000;1800;OUI"
    )
}

fn row_27(id: i64) -> String {
    let row = row_29(id);
    let mut tokens: Vec<&str> = row.split(';').collect();
    tokens.remove(19);
    tokens.remove(8);
    tokens.join(";")
}

fn csv_input(rows: &[String]) -> Cursor<Vec<u8>> {
    let mut text = String::from(HEADER);
    for row in rows {
        text.push('\n');
        text.push_str(row);
    }
    text.push('\n');
    Cursor::new(text.into_bytes())
}

fn config(parser_workers: usize, insert_workers: usize, batch_size: usize) -> ImportConfig {
    ImportConfig {
        parser_workers,
        insert_workers,
        batch_size,
        delimiter: b';',
    }
}

#[tokio::test]
async fn imports_valid_rows() {
    let sink = Arc::new(MockSink::default());
    let pipeline = ImportPipeline::new(Arc::clone(&sink), config(3, 2, 100));

    let rows = vec![row_29(1), row_29(2), row_29(3)];
    let outcome = pipeline
        .run(csv_input(&rows), CancellationToken::new())
        .await;

    assert_eq!(outcome.inserted, 3);
    assert!(outcome.errors.is_empty());
    assert_eq!(sink.journey_ids().await, vec![1, 2, 3]);
}

#[tokio::test]
async fn header_only_input_is_a_clean_zero() {
    let sink = Arc::new(MockSink::default());
    let pipeline = ImportPipeline::new(Arc::clone(&sink), config(3, 2, 10));

    let outcome = pipeline
        .run(csv_input(&[]), CancellationToken::new())
        .await;

    assert_eq!(outcome.inserted, 0);
    assert!(outcome.errors.is_empty());
    assert!(sink.batches().await.is_empty());
}

#[tokio::test]
async fn empty_input_is_a_clean_zero() {
    let sink = Arc::new(MockSink::default());
    let pipeline = ImportPipeline::new(Arc::clone(&sink), config(3, 2, 10));

    let outcome = pipeline
        .run(Cursor::new(Vec::new()), CancellationToken::new())
        .await;

    assert_eq!(outcome.inserted, 0);
    assert!(outcome.errors.is_empty());
}

#[tokio::test]
async fn malformed_row_is_isolated() {
    let sink = Arc::new(MockSink::default());
    let pipeline = ImportPipeline::new(Arc::clone(&sink), config(3, 2, 100));

    // Row 2 has only ten columns; its neighbours must still import.
    let rows = vec![
        row_29(1),
        "a;b;c;d;e;f;g;h;i;j".to_string(),
        row_29(3),
    ];
    let outcome = pipeline
        .run(csv_input(&rows), CancellationToken::new())
        .await;

    assert_eq!(outcome.inserted, 2);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].contains("row 2"));
    assert!(outcome.errors[0].contains("incompatible field count"));
    assert_eq!(sink.journey_ids().await, vec![1, 3]);
}

#[tokio::test]
async fn mixed_layouts_import_together() {
    let sink = Arc::new(MockSink::default());
    let pipeline = ImportPipeline::new(Arc::clone(&sink), config(4, 2, 10));

    let rows = vec![row_29(1), row_27(2), row_29(3), row_27(4)];
    let outcome = pipeline
        .run(csv_input(&rows), CancellationToken::new())
        .await;

    assert_eq!(outcome.inserted, 4);
    assert!(outcome.errors.is_empty());

    let journeys: Vec<Journey> = sink.batches().await.into_iter().flatten().collect();
    let without_postal = journeys
        .iter()
        .filter(|j| j.start_postalcode.is_none())
        .count();
    assert_eq!(without_postal, 2);
}

#[tokio::test]
async fn worker_count_does_not_change_the_outcome() {
    // 20 rows, 4 of them malformed, under several pool sizes. Emission
    // order is unspecified, so only counts and id sets are compared.
    let rows: Vec<String> = (1..=20)
        .map(|id| {
            if id % 5 == 0 {
                format!("{id};broken")
            } else {
                row_29(id)
            }
        })
        .collect();
    let expected_ids: Vec<i64> = (1..=20).filter(|id| id % 5 != 0).collect();

    for workers in [1usize, 3, 10] {
        let sink = Arc::new(MockSink::default());
        let pipeline = ImportPipeline::new(Arc::clone(&sink), config(workers, 2, 7));

        let outcome = pipeline
            .run(csv_input(&rows), CancellationToken::new())
            .await;

        assert_eq!(outcome.inserted, 16, "workers={workers}");
        assert_eq!(outcome.errors.len(), 4, "workers={workers}");
        assert_eq!(sink.journey_ids().await, expected_ids, "workers={workers}");
    }
}

#[tokio::test]
async fn single_worker_flushes_full_batches_and_a_remainder() {
    // One insertion worker, batch size 4, ten records: the sink must see
    // exactly ceil(10/4) = 3 flushes sized 4, 4 and 2.
    let sink = Arc::new(MockSink::default());
    let pipeline = ImportPipeline::new(Arc::clone(&sink), config(2, 1, 4));

    let rows: Vec<String> = (1..=10).map(row_29).collect();
    let outcome = pipeline
        .run(csv_input(&rows), CancellationToken::new())
        .await;

    assert_eq!(outcome.inserted, 10);
    let mut sizes: Vec<usize> = sink.batches().await.iter().map(Vec::len).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![2, 4, 4]);
    assert_eq!(sink.journey_ids().await, (1..=10).collect::<Vec<i64>>());
}

#[tokio::test]
async fn concurrent_workers_deliver_each_record_exactly_once() {
    let sink = Arc::new(MockSink::default());
    let pipeline = ImportPipeline::new(Arc::clone(&sink), config(3, 3, 2));

    let rows: Vec<String> = (1..=7).map(row_29).collect();
    let outcome = pipeline
        .run(csv_input(&rows), CancellationToken::new())
        .await;

    assert_eq!(outcome.inserted, 7);
    let ids = sink.journey_ids().await;
    assert_eq!(ids.len(), 7);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 7, "duplicate delivery");
}

#[tokio::test]
async fn failed_flush_is_reported_and_counts_nothing() {
    let pipeline = ImportPipeline::new(Arc::new(FailingSink), config(2, 2, 2));

    let rows: Vec<String> = (1..=5).map(row_29).collect();
    let outcome = pipeline
        .run(csv_input(&rows), CancellationToken::new())
        .await;

    assert_eq!(outcome.inserted, 0);
    assert!(!outcome.errors.is_empty());
    assert!(outcome.errors.iter().all(|e| e.contains("failed to persist batch")));
}

#[tokio::test]
async fn header_read_failure_is_terminal() {
    let sink = Arc::new(MockSink::default());
    let pipeline = ImportPipeline::new(Arc::clone(&sink), config(2, 2, 10));

    // Invalid UTF-8 on line 1: the reader fails before any data row can
    // be dispatched.
    let mut bytes = vec![0xff, 0xfe, b';', 0xff];
    bytes.push(b'\n');
    bytes.extend_from_slice(row_29(1).as_bytes());
    bytes.push(b'\n');

    let outcome = pipeline
        .run(Cursor::new(bytes), CancellationToken::new())
        .await;

    assert_eq!(outcome.inserted, 0);
    assert_eq!(outcome.errors.len(), 1);
    assert!(sink.batches().await.is_empty());
}

#[tokio::test]
async fn mid_stream_read_failure_keeps_earlier_records() {
    let sink = Arc::new(MockSink::default());
    let pipeline = ImportPipeline::new(Arc::clone(&sink), config(2, 2, 10));

    // One valid row, then a row with invalid UTF-8 so the reader itself
    // fails mid-stream.
    let mut bytes = Vec::new();
    bytes.extend_from_slice(HEADER.as_bytes());
    bytes.push(b'\n');
    bytes.extend_from_slice(row_29(1).as_bytes());
    bytes.push(b'\n');
    bytes.extend_from_slice(&[0xff, 0xfe, b';', 0xff]);
    bytes.push(b'\n');

    let outcome = pipeline
        .run(Cursor::new(bytes), CancellationToken::new())
        .await;

    assert_eq!(outcome.inserted, 1);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(sink.journey_ids().await, vec![1]);
}

#[tokio::test]
async fn pre_cancelled_import_terminates_with_zero() {
    let sink = Arc::new(MockSink::default());
    let pipeline = ImportPipeline::new(Arc::clone(&sink), config(3, 2, 10));

    let cancel = CancellationToken::new();
    cancel.cancel();

    let rows: Vec<String> = (1..=50).map(row_29).collect();
    let outcome = pipeline.run(csv_input(&rows), cancel).await;

    assert_eq!(outcome.inserted, 0);
    assert!(outcome.errors.is_empty());
}
