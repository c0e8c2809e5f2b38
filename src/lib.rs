//! Meteorflux - meteoroid flux profiles from visual and video meteor counts.
//!
//! # Overview
//!
//! Observers report, per observation slot, the effective observing time, the
//! effective collecting area and the number of shower meteors seen. Meteorflux
//! sums those counts over stations, groups them into time bins and turns each
//! bin into a flux density (meteoroids per 1000 km²·h) with a Poisson
//! uncertainty, the solar longitude of its center and an equivalent ZHR.
//!
//! # API Endpoints
//!
//! - `GET /flux` - Binned flux profile for a shower and time range
//! - `GET /stations` - Per-station totals over the same range
//! - `GET /coverage` - Reporting stations per observation slot
//! - `GET /health` - Health check
//!
//! # Modules
//!
//! - [`time`]: Julian dates, solar longitude and timestamp parsing
//! - [`zenith`]: Zenith attraction and flux to ZHR conversion
//! - [`aggregation`]: Adaptive and fixed-width binning
//! - [`dataset`]: Memoized flux profile over an observation source
//! - [`model`]: Requests, bins and derived views
//! - [`error`]: Library error type
//! - [`storage`]: SQLite storage layer
//! - [`api`]: HTTP API handlers

pub mod aggregation;
pub mod api;
pub mod dataset;
pub mod error;
pub mod model;
pub mod storage;
pub mod time;
pub mod zenith;
