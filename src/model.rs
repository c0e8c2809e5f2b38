//! Data models for meteorflux.
//!
//! Raw observations come in per observation slot (summed over stations), bins
//! come out of the binner, and the remaining types are views derived from one or
//! the other for consumers such as the HTTP API.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{FluxError, FluxResult};
use crate::time::{parse_flexible_timestamp, solar_longitude};
use crate::zenith::{DEFAULT_POPULATION_INDEX, MIN_POPULATION_INDEX, flux_to_zhr};

/// Longest time range a single flux request may cover.
pub const MAX_SPAN_DAYS: i64 = 40;

/// Rows with an effective collecting area at or below this (km²·h) are
/// excluded by observation sources; they carry almost no information.
pub const MIN_ROW_ECA: f64 = 0.5;

/// One observation slot: counts from all contributing stations at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Start of the observation slot (UTC).
    pub timestamp: DateTime<Utc>,

    /// Effective observing time in minutes.
    pub teff: f64,

    /// Effective collecting area in km²·h.
    pub eca: f64,

    /// Number of shower meteors counted.
    pub met: u32,
}

/// One aggregated flux bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    /// Representative time of the bin.
    ///
    /// Adaptive bins use the centroid of their observation times; fixed bins use
    /// the middle of their interval.
    pub center: DateTime<Utc>,

    /// Total effective observing time in minutes.
    pub teff: f64,

    /// Total effective collecting area in km²·h.
    pub eca: f64,

    /// Total meteor count.
    pub met: u32,

    /// Flux in meteoroids per 1000 km²·h. `None` when the bin has no collecting area.
    pub flux: Option<f64>,

    /// One-sigma Poisson uncertainty of `flux`.
    pub flux_uncertainty: Option<f64>,
}

/// Binning strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinMode {
    /// Bins close once enough meteors, area and time have accumulated.
    #[default]
    Adaptive,

    /// Bins of constant width `min_interval`, aligned to the requested begin time.
    Fixed,
}

/// Stopping rules for the binner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinningConfig {
    /// Meteors required before an adaptive bin may close.
    pub min_meteors: u32,

    /// Collecting area required before an adaptive bin may close, in 1000 km²·h.
    pub min_eca: f64,

    /// Minimum bin duration in hours; the bin width in fixed mode.
    pub min_interval: f64,

    /// Duration in hours after which an adaptive bin closes unconditionally.
    pub max_interval: f64,

    pub mode: BinMode,
}

impl Default for BinningConfig {
    fn default() -> Self {
        Self {
            min_meteors: default_min_meteors(),
            min_eca: default_min_eca(),
            min_interval: default_min_interval(),
            max_interval: default_max_interval(),
            mode: BinMode::default(),
        }
    }
}

impl BinningConfig {
    /// Check the thresholds for consistency.
    pub fn validate(&self) -> FluxResult<()> {
        if !self.min_eca.is_finite() || self.min_eca < 0.0 {
            return Err(FluxError::Config(format!(
                "min_eca must be a non-negative number, got {}",
                self.min_eca
            )));
        }
        if !self.min_interval.is_finite() || self.min_interval < 0.0 {
            return Err(FluxError::Config(format!(
                "min_interval must be a non-negative number of hours, got {}",
                self.min_interval
            )));
        }
        if self.max_interval.is_nan() || self.max_interval <= self.min_interval {
            return Err(FluxError::Config(format!(
                "max_interval ({}) must exceed min_interval ({})",
                self.max_interval, self.min_interval
            )));
        }
        if self.mode == BinMode::Fixed && self.min_interval == 0.0 {
            return Err(FluxError::Config(
                "fixed binning needs a positive min_interval".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_min_meteors() -> u32 {
    20
}

fn default_min_eca() -> f64 {
    0.0
}

fn default_min_interval() -> f64 {
    0.2
}

fn default_max_interval() -> f64 {
    24.0
}

fn default_population_index() -> f64 {
    DEFAULT_POPULATION_INDEX
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse_flexible_timestamp(&text).map_err(serde::de::Error::custom)
}

/// Everything needed to produce one flux profile.
///
/// Unknown keys are rejected so that a misspelt option never silently falls
/// back to its default. `stations` and `popindex` are accepted as the legacy
/// names of `station_filter` and `population_index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FluxRequest {
    /// Three-letter IMO shower code, e.g. "PER".
    pub shower: String,

    #[serde(deserialize_with = "deserialize_timestamp")]
    pub begin: DateTime<Utc>,

    #[serde(deserialize_with = "deserialize_timestamp")]
    pub end: DateTime<Utc>,

    #[serde(default = "default_min_meteors")]
    pub min_meteors: u32,

    #[serde(default = "default_min_eca")]
    pub min_eca: f64,

    #[serde(default = "default_min_interval")]
    pub min_interval: f64,

    #[serde(default = "default_max_interval")]
    pub max_interval: f64,

    #[serde(default)]
    pub mode: BinMode,

    /// Restrict to one station (case-insensitive). Empty means all stations.
    #[serde(default, alias = "stations")]
    pub station_filter: Option<String>,

    #[serde(default = "default_population_index", alias = "popindex")]
    pub population_index: f64,
}

impl FluxRequest {
    /// A request with default binning for `shower` over `[begin, end]`.
    pub fn new(shower: &str, begin: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let binning = BinningConfig::default();
        Self {
            shower: shower.to_string(),
            begin,
            end,
            min_meteors: binning.min_meteors,
            min_eca: binning.min_eca,
            min_interval: binning.min_interval,
            max_interval: binning.max_interval,
            mode: binning.mode,
            station_filter: None,
            population_index: DEFAULT_POPULATION_INDEX,
        }
    }

    /// Replace the binning options.
    pub fn with_binning(mut self, binning: BinningConfig) -> Self {
        self.min_meteors = binning.min_meteors;
        self.min_eca = binning.min_eca;
        self.min_interval = binning.min_interval;
        self.max_interval = binning.max_interval;
        self.mode = binning.mode;
        self
    }

    pub fn with_station(mut self, station: &str) -> Self {
        self.station_filter = Some(station.to_string());
        self
    }

    pub fn with_population_index(mut self, population_index: f64) -> Self {
        self.population_index = population_index;
        self
    }

    /// The binning options of this request.
    pub fn binning(&self) -> BinningConfig {
        BinningConfig {
            min_meteors: self.min_meteors,
            min_eca: self.min_eca,
            min_interval: self.min_interval,
            max_interval: self.max_interval,
            mode: self.mode,
        }
    }

    /// The station filter, treating a blank value as "all stations".
    pub fn station(&self) -> Option<&str> {
        self.station_filter
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// The row selection an observation source should apply for this request.
    pub fn observation_query(&self) -> ObservationQuery {
        ObservationQuery {
            shower: self.shower.clone(),
            begin: self.begin,
            end: self.end,
            station_filter: self.station().map(str::to_string),
            min_row_eca: MIN_ROW_ECA,
        }
    }

    /// Check the whole request; run before any data is fetched.
    pub fn validate(&self) -> FluxResult<()> {
        if self.shower.trim().is_empty() {
            return Err(FluxError::Config("shower code is empty".to_string()));
        }
        if self.end <= self.begin {
            return Err(FluxError::Config(format!(
                "end ({}) must be after begin ({})",
                self.end, self.begin
            )));
        }
        if self.end - self.begin > Duration::days(MAX_SPAN_DAYS) {
            return Err(FluxError::Config(format!(
                "requested time range exceeds {MAX_SPAN_DAYS} days"
            )));
        }
        let span_hours = (self.end - self.begin).num_seconds() as f64 / 3_600.0;
        if self.mode == BinMode::Fixed && self.min_interval > span_hours {
            return Err(FluxError::Config(format!(
                "fixed bin width of {} hours exceeds the requested range of {span_hours} hours",
                self.min_interval
            )));
        }
        if !self.population_index.is_finite() || self.population_index <= MIN_POPULATION_INDEX {
            return Err(FluxError::Config(format!(
                "population index must exceed {MIN_POPULATION_INDEX}, got {}",
                self.population_index
            )));
        }
        self.binning().validate()
    }
}

/// Row selection handed to an observation source.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationQuery {
    pub shower: String,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,

    /// Only rows from this station (case-insensitive), if set.
    pub station_filter: Option<String>,

    /// Rows must have an effective collecting area strictly above this.
    pub min_row_eca: f64,
}

/// One line of a flux table: a bin in the units observers usually quote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FluxTableRow {
    pub time: DateTime<Utc>,

    /// Solar longitude (J2000.0) of the bin center in degrees.
    pub solar_longitude: f64,

    pub teff_hours: f64,

    /// Effective collecting area in 1000 km²·h.
    pub eca_thousands: f64,

    pub met: u32,
    pub flux: Option<f64>,
    pub flux_uncertainty: Option<f64>,

    /// Equivalent ZHR of `flux`.
    pub zhr: Option<f64>,
}

impl FluxTableRow {
    /// Derive a table row from a bin using population index `r` for the ZHR.
    pub fn from_bin(bin: &Bin, population_index: f64) -> FluxResult<Self> {
        let zhr = bin
            .flux
            .map(|flux| flux_to_zhr(flux, population_index))
            .transpose()?;

        Ok(Self {
            time: bin.center,
            solar_longitude: solar_longitude(bin.center),
            teff_hours: bin.teff / 60.0,
            eca_thousands: bin.eca / 1000.0,
            met: bin.met,
            flux: bin.flux,
            flux_uncertainty: bin.flux_uncertainty,
            zhr,
        })
    }
}

/// Response for GET /flux.
#[derive(Debug, Clone, Serialize)]
pub struct FluxResponse {
    pub shower: String,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub population_index: f64,
    pub bins: Vec<FluxTableRow>,
}

/// Totals contributed by one station over a request's time range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationSummary {
    /// Upper-cased station code.
    pub station: String,

    /// Observer operating the station, if registered.
    pub observer: Option<String>,
    pub country: Option<String>,

    pub teff: f64,
    pub eca: f64,

    /// Shower meteors.
    pub met: i64,

    /// Sporadic meteors recorded by the same station in the same range.
    pub sporadic: i64,
}

/// Who runs a station and where.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationInfo {
    pub station: String,
    pub observer: Option<String>,
    pub country: Option<String>,
}

/// How many stations reported, and how many meteors, at one observation time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoveragePoint {
    pub timestamp: DateTime<Utc>,
    pub stations: i64,
    pub met: i64,
}

/// One station's raw count for one observation slot, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountRecord {
    pub timestamp: DateTime<Utc>,
    pub shower: String,
    pub station: String,
    pub teff: f64,
    pub eca: f64,
    pub met: u32,
}
