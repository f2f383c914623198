//! Environment-driven runtime configuration.
//!
//! Every knob has a sane default so the binary runs without any setup;
//! values are read once at startup. Worker counts, batch sizes and page
//! sizes are clamped to at least 1.

use std::env;

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_delimiter(key: &str, default: u8) -> u8 {
    env::var(key)
        .ok()
        .and_then(|value| match value.into_bytes().as_slice() {
            [byte] => Some(*byte),
            // Anything but exactly one byte (e.g. a literal "\t") is
            // ambiguous; keep the default.
            _ => None,
        })
        .unwrap_or(default)
}

/// Configuration for one CSV import run.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Number of parser workers; also sizes the bounded job queue.
    pub parser_workers: usize,
    /// Number of insertion workers, each with a private batch.
    pub insert_workers: usize,
    /// Records accumulated per insertion worker before a bulk flush.
    pub batch_size: usize,
    /// CSV field delimiter. The journey datasets use `;`. The env var
    /// must be exactly one byte; other values fall back to the default.
    pub delimiter: u8,
}

impl ImportConfig {
    pub fn from_env() -> Self {
        Self {
            parser_workers: env_usize("JOURNEY_PARSER_WORKERS", 10).max(1),
            insert_workers: env_usize("JOURNEY_INSERT_WORKERS", 4).max(1),
            batch_size: env_usize("JOURNEY_INSERT_BATCH_SIZE", 100).max(1),
            delimiter: env_delimiter("JOURNEY_CSV_DELIMITER", b';'),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Configuration for one paginated export run.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Page size requested from the source; a short page ends the export.
    pub page_size: u64,
    /// Zero-based offset the cursor starts from.
    pub start_offset: u64,
}

impl ExportConfig {
    pub fn from_env() -> Self {
        Self {
            page_size: env_u64("JOURNEY_EXPORT_PAGE_SIZE", 50).max(1),
            start_offset: env_u64("JOURNEY_EXPORT_START_OFFSET", 0),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
