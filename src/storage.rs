//! SQLite storage layer for raw meteor counts.
//!
//! Each row is one station's count for one observation slot:
//!
//! - `ts`: start of the slot, Unix timestamp in seconds
//! - `shower`: IMO shower code ("SPO" for sporadics)
//! - `station`: station code as reported
//! - `teff`, `eca`, `met`: effective time (min), collecting area (km²·h), meteors
//!
//! Flux queries sum over stations per slot, so the binner sees one row per
//! instant. A separate `stations` table maps upper-cased station codes to
//! their observer and country.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::dataset::ObservationSource;
use crate::model::{
    CountRecord, CoveragePoint, Observation, ObservationQuery, StationInfo, StationSummary,
};

/// Shower code under which sporadic meteors are stored.
const SPORADIC_SHOWER: &str = "SPO";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:meteorflux.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Every connection to an in-memory database sees its own empty database.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            5
        };

        // Create connection pool
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        // Ensure tables exist before first use
        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    /// Create the database schema if it doesn't exist.
    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS meteor_counts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts INTEGER NOT NULL,
                shower TEXT NOT NULL,
                station TEXT NOT NULL,
                teff REAL NOT NULL,
                eca REAL,
                met INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Index for time-range queries by shower
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_meteor_counts_shower_ts
            ON meteor_counts(shower, ts)
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Station metadata, keyed by upper-cased code
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stations (
                station TEXT PRIMARY KEY,
                observer TEXT,
                country TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store one station's count for one observation slot.
    pub async fn insert_count(&self, record: &CountRecord) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO meteor_counts (ts, shower, station, teff, eca, met)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.timestamp.timestamp())
        .bind(&record.shower)
        .bind(&record.station)
        .bind(record.teff)
        .bind(record.eca)
        .bind(i64::from(record.met))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Register or update a station's observer and country.
    pub async fn upsert_station(&self, info: &StationInfo) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stations (station, observer, country)
            VALUES (UPPER(?), ?, ?)
            ON CONFLICT(station) DO UPDATE SET
                observer = excluded.observer,
                country = excluded.country
            "#,
        )
        .bind(&info.station)
        .bind(&info.observer)
        .bind(&info.country)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Per-station totals for the query's shower and range, with each station's
    /// observer, country and sporadic count alongside.
    ///
    /// Unlike flux queries this keeps every row with a positive collecting area.
    pub async fn station_summary(
        &self,
        query: &ObservationQuery,
    ) -> anyhow::Result<Vec<StationSummary>> {
        // Shower totals per station, with sporadics and metadata joined on
        let rows = sqlx::query(
            r#"
            SELECT
                a.station AS station,
                m.observer AS observer,
                m.country AS country,
                a.teff AS teff,
                a.eca AS eca,
                a.met AS met,
                COALESCE(b.spo, 0) AS spo
            FROM (
                SELECT UPPER(station) AS station,
                       SUM(teff) AS teff, SUM(eca) AS eca, SUM(met) AS met
                FROM meteor_counts
                WHERE ts >= ? AND ts <= ?
                  AND shower = ?
                  AND eca IS NOT NULL AND eca > 0
                  AND (? IS NULL OR UPPER(station) = UPPER(?))
                GROUP BY UPPER(station)
            ) AS a
            LEFT JOIN (
                SELECT UPPER(station) AS station, SUM(met) AS spo
                FROM meteor_counts
                WHERE ts >= ? AND ts <= ?
                  AND shower = ?
                  AND eca IS NOT NULL AND eca > 0
                GROUP BY UPPER(station)
            ) AS b ON a.station = b.station
            LEFT JOIN stations AS m ON a.station = m.station
            ORDER BY a.station
            "#,
        )
        .bind(query.begin.timestamp())
        .bind(query.end.timestamp())
        .bind(&query.shower)
        .bind(&query.station_filter)
        .bind(&query.station_filter)
        .bind(query.begin.timestamp())
        .bind(query.end.timestamp())
        .bind(SPORADIC_SHOWER)
        .fetch_all(&self.pool)
        .await?;

        // Map rows to summaries
        Ok(rows
            .iter()
            .map(|r| StationSummary {
                station: r.get("station"),
                observer: r.get("observer"),
                country: r.get("country"),
                teff: r.get("teff"),
                eca: r.get("eca"),
                met: r.get("met"),
                sporadic: r.get("spo"),
            })
            .collect())
    }

    /// Number of reporting stations and meteors per observation slot.
    pub async fn coverage(&self, query: &ObservationQuery) -> anyhow::Result<Vec<CoveragePoint>> {
        // Count contributing stations per slot
        let rows = sqlx::query(
            r#"
            SELECT ts, COUNT(*) AS stations, SUM(met) AS met
            FROM meteor_counts
            WHERE ts >= ? AND ts <= ?
              AND shower = ?
              AND eca IS NOT NULL AND eca > ?
              AND (? IS NULL OR UPPER(station) = UPPER(?))
            GROUP BY ts
            ORDER BY ts
            "#,
        )
        .bind(query.begin.timestamp())
        .bind(query.end.timestamp())
        .bind(&query.shower)
        .bind(query.min_row_eca)
        .bind(&query.station_filter)
        .bind(&query.station_filter)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| -> anyhow::Result<CoveragePoint> {
                Ok(CoveragePoint {
                    timestamp: timestamp_from_secs(r.get("ts"))?,
                    stations: r.get("stations"),
                    met: r.get("met"),
                })
            })
            .collect()
    }
}

fn timestamp_from_secs(ts: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0).ok_or_else(|| anyhow::anyhow!("timestamp {ts} out of range"))
}

#[async_trait]
impl ObservationSource for Storage {
    async fn fetch_observations(
        &self,
        query: &ObservationQuery,
    ) -> anyhow::Result<Vec<Observation>> {
        // Sum matching stations per slot
        let rows = sqlx::query(
            r#"
            SELECT ts, SUM(teff) AS teff, SUM(eca) AS eca, SUM(met) AS met
            FROM meteor_counts
            WHERE ts >= ? AND ts <= ?
              AND shower = ?
              AND eca IS NOT NULL AND eca > ?
              AND (? IS NULL OR UPPER(station) = UPPER(?))
            GROUP BY ts
            ORDER BY ts
            "#,
        )
        .bind(query.begin.timestamp())
        .bind(query.end.timestamp())
        .bind(&query.shower)
        .bind(query.min_row_eca)
        .bind(&query.station_filter)
        .bind(&query.station_filter)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            // Summed counts must fit the binner's u32
            .map(|r| -> anyhow::Result<Observation> {
                let met: i64 = r.get("met");
                Ok(Observation {
                    timestamp: timestamp_from_secs(r.get("ts"))?,
                    teff: r.get("teff"),
                    eca: r.get("eca"),
                    met: u32::try_from(met)?,
                })
            })
            .collect()
    }
}
