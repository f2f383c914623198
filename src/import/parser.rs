//! Journey row parsing.
//!
//! This module turns one raw CSV row into a [`Journey`] or a row-level
//! error. It is a pure function: no I/O, no shared state, and parsing the
//! same row twice yields the same result. The parsing pipeline calls it
//! concurrently from a worker pool.
//!
//! # Layouts
//!
//! Two historical column layouts exist and are distinguished only by row
//! width:
//!
//! - **27 columns**: no postal codes
//! - **29 columns**: postal codes for both legs (columns 8 and 19)
//!
//! Any other width is a row-level error. New layouts slot in by adding a
//! decoder and a match arm in [`parse_row`]; the pipeline never needs to
//! change.
//!
//! # Error Handling
//!
//! Every field conversion returns a `Result`; the first failure rejects
//! the whole row, identified by its 1-based data-row position. A rejected
//! row never affects rows parsed before or after it, and no partially
//! populated journey is ever emitted.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Journey;

/// Width of the historical layout without postal codes.
pub const LAYOUT_NO_POSTAL: usize = 27;
/// Width of the layout carrying postal codes for both legs.
pub const LAYOUT_WITH_POSTAL: usize = 29;

/// Token the source datasets use for a granted incentive.
const INCENTIVE_GRANTED: &str = "OUI";

/// One raw, unparsed line of delimited input plus its source position.
///
/// Positions are 1-based and count data rows only; the discarded header is
/// not counted. Rows are transient and exist only inside the parsing
/// pipeline.
#[derive(Debug, Clone)]
pub struct Row {
    pub tokens: Vec<String>,
    pub position: usize,
}

/// Errors produced while decoding a single row.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("row {position}: incompatible field count ({count})")]
    FieldCount { position: usize, count: usize },
    #[error("row {position}: malformed journey row: {field}: {reason}")]
    Malformed {
        position: usize,
        field: &'static str,
        reason: String,
    },
}

/// Decode a row into a journey, dispatching on token count.
pub fn parse_row(row: &Row) -> Result<Journey, RowError> {
    match row.tokens.len() {
        LAYOUT_NO_POSTAL => decode_no_postal(row),
        LAYOUT_WITH_POSTAL => decode_with_postal(row),
        count => Err(RowError::FieldCount {
            position: row.position,
            count,
        }),
    }
}

/// Typed accessors over a width-checked row.
///
/// Indexing is safe because [`parse_row`] only hands rows of a known width
/// to the matching decoder.
struct Fields<'a> {
    row: &'a Row,
}

impl Fields<'_> {
    fn malformed(&self, field: &'static str, reason: impl ToString) -> RowError {
        RowError::Malformed {
            position: self.row.position,
            field,
            reason: reason.to_string(),
        }
    }

    fn text(&self, idx: usize) -> String {
        self.row.tokens[idx].clone()
    }

    fn int(&self, idx: usize, field: &'static str) -> Result<i64, RowError> {
        self.row.tokens[idx]
            .trim()
            .parse::<i64>()
            .map_err(|e| self.malformed(field, e))
    }

    fn small_int(&self, idx: usize, field: &'static str) -> Result<i16, RowError> {
        self.row.tokens[idx]
            .trim()
            .parse::<i16>()
            .map_err(|e| self.malformed(field, e))
    }

    fn uuid(&self, idx: usize, field: &'static str) -> Result<Uuid, RowError> {
        Uuid::parse_str(self.row.tokens[idx].trim()).map_err(|e| self.malformed(field, e))
    }

    /// Timestamp with a numeric offset (`2023-01-05T09:30:00+01:00`),
    /// normalized to UTC.
    fn datetime(&self, idx: usize, field: &'static str) -> Result<DateTime<Utc>, RowError> {
        DateTime::parse_from_rfc3339(self.row.tokens[idx].trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| self.malformed(field, e))
    }

    fn date(&self, idx: usize, field: &'static str) -> Result<NaiveDate, RowError> {
        NaiveDate::parse_from_str(self.row.tokens[idx].trim(), "%Y-%m-%d")
            .map_err(|e| self.malformed(field, e))
    }

    fn time(&self, idx: usize, field: &'static str) -> Result<NaiveTime, RowError> {
        NaiveTime::parse_from_str(self.row.tokens[idx].trim(), "%H:%M:%S")
            .map_err(|e| self.malformed(field, e))
    }

    fn incentive(&self, idx: usize) -> bool {
        self.row.tokens[idx] == INCENTIVE_GRANTED
    }
}

fn decode_no_postal(row: &Row) -> Result<Journey, RowError> {
    let f = Fields { row };
    Ok(Journey {
        journey_id: f.int(0, "journey_id")?,
        trip_id: f.uuid(1, "trip_id")?,
        start_datetime: f.datetime(2, "start_datetime")?,
        start_date: f.date(3, "start_date")?,
        start_time: f.time(4, "start_time")?,
        start_lon: f.int(5, "start_lon")?,
        start_lat: f.int(6, "start_lat")?,
        start_insee: f.int(7, "start_insee")?,
        start_postalcode: None,
        start_department: f.text(8),
        start_town: f.text(9),
        start_towngroup: f.text(10),
        start_country: f.text(11),
        end_datetime: f.datetime(12, "end_datetime")?,
        end_date: f.date(13, "end_date")?,
        end_time: f.time(14, "end_time")?,
        end_lon: f.int(15, "end_lon")?,
        end_lat: f.int(16, "end_lat")?,
        end_insee: f.int(17, "end_insee")?,
        end_postalcode: None,
        end_department: f.text(18),
        end_town: f.text(19),
        end_towngroup: f.text(20),
        end_country: f.text(21),
        passenger_seats: f.small_int(22, "passenger_seats")?,
        operator_class: f.text(23),
        distance: f.int(24, "distance")?,
        duration: f.int(25, "duration")?,
        has_incentive: f.incentive(26),
    })
}

fn decode_with_postal(row: &Row) -> Result<Journey, RowError> {
    let f = Fields { row };
    Ok(Journey {
        journey_id: f.int(0, "journey_id")?,
        trip_id: f.uuid(1, "trip_id")?,
        start_datetime: f.datetime(2, "start_datetime")?,
        start_date: f.date(3, "start_date")?,
        start_time: f.time(4, "start_time")?,
        start_lon: f.int(5, "start_lon")?,
        start_lat: f.int(6, "start_lat")?,
        start_insee: f.int(7, "start_insee")?,
        start_postalcode: Some(f.text(8)),
        start_department: f.text(9),
        start_town: f.text(10),
        start_towngroup: f.text(11),
        start_country: f.text(12),
        end_datetime: f.datetime(13, "end_datetime")?,
        end_date: f.date(14, "end_date")?,
        end_time: f.time(15, "end_time")?,
        end_lon: f.int(16, "end_lon")?,
        end_lat: f.int(17, "end_lat")?,
        end_insee: f.int(18, "end_insee")?,
        end_postalcode: Some(f.text(19)),
        end_department: f.text(20),
        end_town: f.text(21),
        end_towngroup: f.text(22),
        end_country: f.text(23),
        passenger_seats: f.small_int(24, "passenger_seats")?,
        operator_class: f.text(25),
        distance: f.int(26, "distance")?,
        duration: f.int(27, "duration")?,
        has_incentive: f.incentive(28),
    })
}
