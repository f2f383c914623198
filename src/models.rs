use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One fully parsed carpool journey, ready for persistence or already persisted.
///
/// Journeys come from two historical CSV layouts distinguished only by row
/// width: 27 columns (no postal codes) and 29 columns (postal codes for both
/// legs). Postal codes are `None` under the 27-column layout. A journey is
/// immutable once constructed: either every field conversion succeeded, or
/// the whole row was rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Journey {
    pub journey_id: i64,
    pub trip_id: Uuid,

    // Start leg
    pub start_datetime: DateTime<Utc>,
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub start_lon: i64,
    pub start_lat: i64,
    pub start_insee: i64,
    pub start_postalcode: Option<String>,
    pub start_department: String,
    pub start_town: String,
    pub start_towngroup: String,
    pub start_country: String,

    // End leg
    pub end_datetime: DateTime<Utc>,
    pub end_date: NaiveDate,
    pub end_time: NaiveTime,
    pub end_lon: i64,
    pub end_lat: i64,
    pub end_insee: i64,
    pub end_postalcode: Option<String>,
    pub end_department: String,
    pub end_town: String,
    pub end_towngroup: String,
    pub end_country: String,

    // Trip attributes
    pub passenger_seats: i16,
    pub operator_class: String,
    pub distance: i64,
    pub duration: i64,
    pub has_incentive: bool,
}
