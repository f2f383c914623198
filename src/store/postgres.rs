//! Postgres-backed journey store.
//!
//! Implements both store traits over one `PgPool`. Batch inserts use the
//! UNNEST-array form so each batch is a single round trip regardless of
//! size, with `ON CONFLICT DO NOTHING` making re-imports idempotent on
//! `journey_id`.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::models::Journey;
use crate::store::{PageSource, RecordSink, StoreError};

pub struct PgJourneyStore {
    pool: PgPool,
}

impl PgJourneyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database and build a pool.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        log::info!("connected to database (max {max_connections} connections)");
        Ok(Self { pool })
    }

    /// Create the journeys table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS journeys (
                journey_id       BIGINT PRIMARY KEY,
                trip_id          UUID NOT NULL,
                start_datetime   TIMESTAMPTZ NOT NULL,
                start_date       DATE NOT NULL,
                start_time       TIME NOT NULL,
                start_lon        BIGINT NOT NULL,
                start_lat        BIGINT NOT NULL,
                start_insee      BIGINT NOT NULL,
                start_postalcode TEXT,
                start_department TEXT NOT NULL,
                start_town       TEXT NOT NULL,
                start_towngroup  TEXT NOT NULL,
                start_country    TEXT NOT NULL,
                end_datetime     TIMESTAMPTZ NOT NULL,
                end_date         DATE NOT NULL,
                end_time         TIME NOT NULL,
                end_lon          BIGINT NOT NULL,
                end_lat          BIGINT NOT NULL,
                end_insee        BIGINT NOT NULL,
                end_postalcode   TEXT,
                end_department   TEXT NOT NULL,
                end_town         TEXT NOT NULL,
                end_towngroup    TEXT NOT NULL,
                end_country      TEXT NOT NULL,
                passenger_seats  SMALLINT NOT NULL,
                operator_class   TEXT NOT NULL,
                distance         BIGINT NOT NULL,
                duration         BIGINT NOT NULL,
                has_incentive    BOOLEAN NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RecordSink for PgJourneyStore {
    async fn add_batch(&self, journeys: &[Journey]) -> Result<u64, StoreError> {
        if journeys.is_empty() {
            return Ok(0);
        }

        // Column-major arrays for the UNNEST insert.
        let mut journey_ids = Vec::with_capacity(journeys.len());
        let mut trip_ids = Vec::with_capacity(journeys.len());
        let mut start_datetimes = Vec::with_capacity(journeys.len());
        let mut start_dates = Vec::with_capacity(journeys.len());
        let mut start_times = Vec::with_capacity(journeys.len());
        let mut start_lons = Vec::with_capacity(journeys.len());
        let mut start_lats = Vec::with_capacity(journeys.len());
        let mut start_insees = Vec::with_capacity(journeys.len());
        let mut start_postalcodes = Vec::with_capacity(journeys.len());
        let mut start_departments = Vec::with_capacity(journeys.len());
        let mut start_towns = Vec::with_capacity(journeys.len());
        let mut start_towngroups = Vec::with_capacity(journeys.len());
        let mut start_countries = Vec::with_capacity(journeys.len());
        let mut end_datetimes = Vec::with_capacity(journeys.len());
        let mut end_dates = Vec::with_capacity(journeys.len());
        let mut end_times = Vec::with_capacity(journeys.len());
        let mut end_lons = Vec::with_capacity(journeys.len());
        let mut end_lats = Vec::with_capacity(journeys.len());
        let mut end_insees = Vec::with_capacity(journeys.len());
        let mut end_postalcodes = Vec::with_capacity(journeys.len());
        let mut end_departments = Vec::with_capacity(journeys.len());
        let mut end_towns = Vec::with_capacity(journeys.len());
        let mut end_towngroups = Vec::with_capacity(journeys.len());
        let mut end_countries = Vec::with_capacity(journeys.len());
        let mut passenger_seats = Vec::with_capacity(journeys.len());
        let mut operator_classes = Vec::with_capacity(journeys.len());
        let mut distances = Vec::with_capacity(journeys.len());
        let mut durations = Vec::with_capacity(journeys.len());
        let mut has_incentives = Vec::with_capacity(journeys.len());

        for j in journeys {
            journey_ids.push(j.journey_id);
            trip_ids.push(j.trip_id);
            start_datetimes.push(j.start_datetime);
            start_dates.push(j.start_date);
            start_times.push(j.start_time);
            start_lons.push(j.start_lon);
            start_lats.push(j.start_lat);
            start_insees.push(j.start_insee);
            start_postalcodes.push(j.start_postalcode.clone());
            start_departments.push(j.start_department.clone());
            start_towns.push(j.start_town.clone());
            start_towngroups.push(j.start_towngroup.clone());
            start_countries.push(j.start_country.clone());
            end_datetimes.push(j.end_datetime);
            end_dates.push(j.end_date);
            end_times.push(j.end_time);
            end_lons.push(j.end_lon);
            end_lats.push(j.end_lat);
            end_insees.push(j.end_insee);
            end_postalcodes.push(j.end_postalcode.clone());
            end_departments.push(j.end_department.clone());
            end_towns.push(j.end_town.clone());
            end_towngroups.push(j.end_towngroup.clone());
            end_countries.push(j.end_country.clone());
            passenger_seats.push(j.passenger_seats);
            operator_classes.push(j.operator_class.clone());
            distances.push(j.distance);
            durations.push(j.duration);
            has_incentives.push(j.has_incentive);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO journeys (
                journey_id, trip_id,
                start_datetime, start_date, start_time,
                start_lon, start_lat, start_insee, start_postalcode,
                start_department, start_town, start_towngroup, start_country,
                end_datetime, end_date, end_time,
                end_lon, end_lat, end_insee, end_postalcode,
                end_department, end_town, end_towngroup, end_country,
                passenger_seats, operator_class, distance, duration, has_incentive
            )
            SELECT * FROM UNNEST(
                $1::bigint[], $2::uuid[],
                $3::timestamptz[], $4::date[], $5::time[],
                $6::bigint[], $7::bigint[], $8::bigint[], $9::text[],
                $10::text[], $11::text[], $12::text[], $13::text[],
                $14::timestamptz[], $15::date[], $16::time[],
                $17::bigint[], $18::bigint[], $19::bigint[], $20::text[],
                $21::text[], $22::text[], $23::text[], $24::text[],
                $25::smallint[], $26::text[], $27::bigint[], $28::bigint[], $29::bool[]
            )
            ON CONFLICT (journey_id) DO NOTHING
            "#,
        )
        .bind(&journey_ids)
        .bind(&trip_ids)
        .bind(&start_datetimes)
        .bind(&start_dates)
        .bind(&start_times)
        .bind(&start_lons)
        .bind(&start_lats)
        .bind(&start_insees)
        .bind(&start_postalcodes)
        .bind(&start_departments)
        .bind(&start_towns)
        .bind(&start_towngroups)
        .bind(&start_countries)
        .bind(&end_datetimes)
        .bind(&end_dates)
        .bind(&end_times)
        .bind(&end_lons)
        .bind(&end_lats)
        .bind(&end_insees)
        .bind(&end_postalcodes)
        .bind(&end_departments)
        .bind(&end_towns)
        .bind(&end_towngroups)
        .bind(&end_countries)
        .bind(&passenger_seats)
        .bind(&operator_classes)
        .bind(&distances)
        .bind(&durations)
        .bind(&has_incentives)
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected();
        log::debug!("bulk insert: {} sent, {inserted} new", journeys.len());
        Ok(inserted)
    }
}

#[async_trait]
impl PageSource for PgJourneyStore {
    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Vec<Journey>, StoreError> {
        let journeys = sqlx::query_as::<_, Journey>(
            r#"
            SELECT
                journey_id, trip_id,
                start_datetime, start_date, start_time,
                start_lon, start_lat, start_insee, start_postalcode,
                start_department, start_town, start_towngroup, start_country,
                end_datetime, end_date, end_time,
                end_lon, end_lat, end_insee, end_postalcode,
                end_department, end_town, end_towngroup, end_country,
                passenger_seats, operator_class, distance, duration, has_incentive
            FROM journeys
            ORDER BY journey_id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(journeys)
    }
}
