//! Temporal binning of observation rows into flux bins.
//!
//! Two strategies are provided:
//!
//! - **Adaptive**: a bin grows row by row and closes as soon as it holds enough
//!   meteors, collecting area and time, or has grown past the maximum duration.
//!   The bin is labelled with the centroid of its observation times.
//! - **Fixed**: bins have constant width and are aligned to the requested begin
//!   time, regardless of the data. Each bin is labelled with its midpoint.
//!
//! Both compute flux with Poisson statistics and a 0.5-count continuity
//! correction, so an empty-but-observed bin yields a finite upper limit.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::{FluxError, FluxResult};
use crate::model::{Bin, BinMode, BinningConfig, Observation};

/// A trailing adaptive bin is kept only if it holds more meteors than this.
///
/// Long-standing behaviour, deliberately independent of `min_meteors`.
pub const TRAILING_BIN_MIN_METEORS: u32 = 5;

const SECONDS_PER_HOUR: f64 = 3_600.0;

/// Flux and its uncertainty (meteoroids per 1000 km²·h) for `met` meteors
/// over `eca` km²·h.
pub fn flux_from_counts(met: u32, eca: f64) -> FluxResult<(f64, f64)> {
    if !(eca.is_finite() && eca > 0.0) {
        return Err(FluxError::Domain(format!(
            "flux needs a positive collecting area, got {eca}"
        )));
    }

    let corrected = f64::from(met) + 0.5;
    Ok((1000.0 * corrected / eca, 1000.0 * corrected.sqrt() / eca))
}

/// Running totals of the bin currently being filled.
#[derive(Debug, Clone)]
struct BinAccumulator {
    start: DateTime<Utc>,
    teff: f64,
    eca: f64,
    met: u32,
    /// Seconds from `start` of every contributing row.
    offsets: Vec<f64>,
}

impl BinAccumulator {
    fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            teff: 0.0,
            eca: 0.0,
            met: 0,
            offsets: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    fn elapsed_seconds(&self, at: DateTime<Utc>) -> f64 {
        let delta = at - self.start;
        delta.num_seconds() as f64 + f64::from(delta.subsec_nanos()) / 1e9
    }

    fn add(&mut self, row: &Observation) -> FluxResult<()> {
        self.met = self.met.checked_add(row.met).ok_or_else(|| {
            FluxError::Domain(format!(
                "meteor count overflows at {} ({} + {})",
                row.timestamp, self.met, row.met
            ))
        })?;
        self.offsets.push(self.elapsed_seconds(row.timestamp));
        self.teff += row.teff;
        self.eca += row.eca;
        Ok(())
    }

    /// Mean observation time of the rows added so far.
    fn centroid(&self) -> DateTime<Utc> {
        if self.offsets.is_empty() {
            return self.start;
        }
        let mean = self.offsets.iter().sum::<f64>() / self.offsets.len() as f64;
        self.start + Duration::microseconds((mean * 1e6).round() as i64)
    }

    fn finish(self, center: DateTime<Utc>) -> FluxResult<Bin> {
        let (flux, flux_uncertainty) = if self.eca > 0.0 {
            let (flux, sigma) = flux_from_counts(self.met, self.eca)?;
            (Some(flux), Some(sigma))
        } else {
            (None, None)
        };

        Ok(Bin {
            center,
            teff: self.teff,
            eca: self.eca,
            met: self.met,
            flux,
            flux_uncertainty,
        })
    }
}

/// Reject rows that are out of order or carry impossible totals.
fn check_rows(rows: &[Observation]) -> FluxResult<()> {
    for (index, pair) in rows.windows(2).enumerate() {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(FluxError::InputOrder {
                index: index + 1,
                previous: pair[0].timestamp,
                current: pair[1].timestamp,
            });
        }
    }

    if let Some(row) = rows
        .iter()
        .find(|r| !(r.teff.is_finite() && r.teff >= 0.0 && r.eca.is_finite() && r.eca >= 0.0))
    {
        return Err(FluxError::Domain(format!(
            "observation at {} has teff {} and eca {}",
            row.timestamp, row.teff, row.eca
        )));
    }

    Ok(())
}

/// Whether an adaptive bin should close before a row `hours` after its start is added.
fn should_close(acc: &BinAccumulator, hours: f64, config: &BinningConfig) -> bool {
    let complete = acc.met >= config.min_meteors
        && acc.eca >= config.min_eca * 1000.0
        && hours >= config.min_interval;

    complete || hours >= config.max_interval
}

/// Adaptive binning.
///
/// Before each row is added, the open bin is closed if it already holds at
/// least `min_meteors` meteors and `min_eca` thousand km²·h and spans at least
/// `min_interval` hours up to that row, or if it spans `max_interval` hours.
/// The row then starts the next bin. Whatever remains at the end becomes a
/// final bin only if it holds more than [`TRAILING_BIN_MIN_METEORS`] meteors.
pub fn bin_adaptive(rows: &[Observation], config: &BinningConfig) -> FluxResult<Vec<Bin>> {
    config.validate()?;
    check_rows(rows)?;

    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };

    let mut bins = Vec::new();
    let mut acc = BinAccumulator::new(first.timestamp);

    for row in rows {
        let hours = acc.elapsed_seconds(row.timestamp) / SECONDS_PER_HOUR;

        if !acc.is_empty() && should_close(&acc, hours, config) {
            let closed = std::mem::replace(&mut acc, BinAccumulator::new(row.timestamp));
            let center = closed.centroid();
            bins.push(closed.finish(center)?);
        }

        acc.add(row)?;
    }

    if acc.met > TRAILING_BIN_MIN_METEORS {
        let center = acc.centroid();
        bins.push(acc.finish(center)?);
    } else {
        debug!(
            met = acc.met,
            rows = acc.offsets.len(),
            "Discarding sparse trailing bin"
        );
    }

    debug!(rows = rows.len(), bins = bins.len(), "Adaptive binning complete");
    Ok(bins)
}

fn hours_to_duration(hours: f64) -> Duration {
    Duration::microseconds((hours * SECONDS_PER_HOUR * 1e6).round() as i64)
}

/// Fixed-width binning with bins of `min_interval` hours starting at `begin`.
///
/// A row at or past the current bin's end closes that bin and moves the
/// boundary forward by one width. Only one bin is closed per row, so a gap of
/// several widths is not back-filled with empty bins. The last bin is always
/// emitted.
pub fn bin_fixed(
    rows: &[Observation],
    config: &BinningConfig,
    begin: DateTime<Utc>,
) -> FluxResult<Vec<Bin>> {
    config.validate()?;
    check_rows(rows)?;

    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let width = hours_to_duration(config.min_interval);
    let half_width = width / 2;
    let advance = |at: DateTime<Utc>| {
        at.checked_add_signed(width).ok_or_else(|| {
            FluxError::Domain(format!(
                "bin of {} hours starting at {at} ends out of range",
                config.min_interval
            ))
        })
    };

    let mut bins = Vec::new();
    let mut bin_end = advance(begin)?;
    let mut acc = BinAccumulator::new(begin);

    for row in rows {
        if row.timestamp >= bin_end {
            let closed = std::mem::replace(&mut acc, BinAccumulator::new(bin_end));
            bins.push(closed.finish(bin_end - half_width)?);
            bin_end = advance(bin_end)?;
        }

        acc.add(row)?;
    }

    bins.push(acc.finish(bin_end - half_width)?);

    debug!(
        rows = rows.len(),
        bins = bins.len(),
        width_hours = config.min_interval,
        "Fixed binning complete"
    );
    Ok(bins)
}

/// Bin `rows` with the strategy selected in `config`.
///
/// Both strategies reject an inconsistent `config` with [`FluxError::Config`].
/// `begin` anchors fixed-width bins and is ignored in adaptive mode.
pub fn bin_observations(
    rows: &[Observation],
    config: &BinningConfig,
    begin: DateTime<Utc>,
) -> FluxResult<Vec<Bin>> {
    match config.mode {
        BinMode::Adaptive => bin_adaptive(rows, config),
        BinMode::Fixed => bin_fixed(rows, config, begin),
    }
}
