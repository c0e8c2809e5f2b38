//! Astronomical time coordinates for labelling flux bins.
//!
//! Observations are timestamped in UTC; meteor shower activity is usually
//! reported against solar longitude (J2000.0), which repeats from year to year
//! and so lets profiles from different returns be compared directly.

use std::f64::consts::TAU;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};

use crate::error::{FluxError, FluxResult};

/// Julian date of the J2000.0 epoch (2000-01-01T12:00:00).
pub const J2000: f64 = 2_451_545.0;

/// Days in a Julian millennium.
const DAYS_PER_MILLENNIUM: f64 = 365_250.0;

/// Convert a UTC instant to a Julian date.
///
/// Follows Meeus, *Astronomical Algorithms*, chapter 7. The integral part is
/// assembled first and the day fraction added last, so two instants exactly one
/// day apart always map to values exactly 1.0 apart.
pub fn julian_date(instant: DateTime<Utc>) -> f64 {
    let mut year = instant.year() as f64;
    let mut month = instant.month() as f64;

    // January and February count as months 13 and 14 of the previous year.
    if month <= 2.0 {
        month += 12.0;
        year -= 1.0;
    }

    let century = (year / 100.0).floor();
    let correction = 2.0 - century + (century / 4.0).floor();

    let microsecond = f64::from(instant.nanosecond() / 1_000);
    let day_fraction = f64::from(instant.hour()) / 24.0
        + f64::from(instant.minute()) / 1_440.0
        + (f64::from(instant.second()) + microsecond / 1e6) / 86_400.0;

    let whole = (365.25 * (year + 4716.0)).floor()
        + (30.6001 * (month + 1.0)).floor()
        + f64::from(instant.day())
        + correction
        - 1524.5;

    whole + day_fraction
}

// Periodic terms of the Sun's longitude (Meeus p. 205, after Steyaert, WGN).
const S0_AMPLITUDE: [f64; 28] = [
    334166.0, 3489.0, 350.0, 342.0, 314.0, 268.0, 234.0, 132.0, 127.0, 120.0, 99.0, 90.0, 86.0,
    78.0, 75.0, 51.0, 49.0, 36.0, 32.0, 28.0, 27.0, 24.0, 21.0, 21.0, 20.0, 16.0, 13.0, 13.0,
];
const S0_PHASE: [f64; 28] = [
    4.669257, 4.6261, 2.744, 2.829, 3.628, 4.418, 6.135, 0.742, 2.037, 1.11, 5.233, 2.045, 3.508,
    1.179, 2.533, 4.58, 4.21, 2.92, 5.85, 1.90, 0.31, 0.34, 4.81, 1.87, 2.46, 0.83, 3.41, 1.08,
];
const S0_FREQUENCY: [f64; 28] = [
    6283.07585, 12566.1517, 5753.385, 3.523, 77713.771, 7860.419, 3930.210, 11506.77, 529.691,
    1577.344, 5884.927, 26.298, 398.149, 5223.694, 5507.553, 18849.23, 775.52, 0.07, 11790.63,
    796.30, 10977.08, 5486.78, 2544.31, 5573.14, 6069.78, 213.30, 2942.46, 20.78,
];
const S1_AMPLITUDE: [f64; 3] = [20606.0, 430.0, 43.0];
const S1_PHASE: [f64; 3] = [2.67823, 2.635, 1.59];

/// Solar longitude (J2000.0) in degrees, in `[0, 360)`.
///
/// Accurate to roughly 0.003° for dates within a few millennia of J2000.
pub fn solar_longitude(instant: DateTime<Utc>) -> f64 {
    let t = (julian_date(instant) - J2000) / DAYS_PER_MILLENNIUM;

    let mean = 4.8950627 + t * (6283.0758500 - t * 0.0000099);

    let s0: f64 = S0_AMPLITUDE
        .iter()
        .zip(S0_PHASE.iter())
        .zip(S0_FREQUENCY.iter())
        .map(|((a, b), c)| a * (b + c * t).cos())
        .sum();

    let s1: f64 = S1_AMPLITUDE
        .iter()
        .zip(S1_PHASE.iter())
        .zip(S0_FREQUENCY.iter())
        .map(|((a, b), c)| a * (b + c * t).cos())
        .sum();

    let s2 = 872.0 * (1.073 + S0_FREQUENCY[0] * t).cos()
        + 29.0 * (0.44 + S0_FREQUENCY[1] * t).cos();

    let s3 = 29.0 * (5.84 + S0_FREQUENCY[0] * t).cos();

    let longitude = mean + (s0 + t * (s1 + t * (s2 + t * s3))) * 1.0e-7;

    let mut radians = longitude.rem_euclid(TAU);
    if radians >= TAU {
        radians = 0.0;
    }

    let degrees = radians.to_degrees();
    if degrees >= 360.0 { degrees - 360.0 } else { degrees }
}

/// How a format string is turned into a timestamp.
#[derive(Debug, Clone, Copy)]
enum Layout {
    /// Complete date and time down to at least the minute.
    DateTime(&'static str),
    /// Date plus hour only; minutes are zero.
    DateHour,
    /// Calendar date at midnight.
    Date(&'static str),
}

/// Accepted input formats, most specific first.
const LAYOUTS: [Layout; 6] = [
    Layout::DateTime("%Y-%m-%d %H:%M:%S"),
    Layout::DateTime("%Y-%m-%dT%H:%M:%S"),
    Layout::DateTime("%Y-%m-%d %H:%M"),
    Layout::DateHour,
    Layout::Date("%Y-%m-%d"),
    Layout::Date("%Y%m%d"),
];

impl Layout {
    fn parse(self, text: &str) -> Option<NaiveDateTime> {
        match self {
            Layout::DateTime(fmt) => NaiveDateTime::parse_from_str(text, fmt).ok(),
            // chrono refuses a time without minutes, so supply them.
            Layout::DateHour => {
                NaiveDateTime::parse_from_str(&format!("{text}:00"), "%Y-%m-%d %H:%M").ok()
            }
            Layout::Date(fmt) => NaiveDate::parse_from_str(text, fmt)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0)),
        }
    }
}

/// Parse a user-supplied timestamp, trying progressively less specific formats.
///
/// Accepts `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD HH:MM`,
/// `YYYY-MM-DD HH`, `YYYY-MM-DD` and `YYYYMMDD`, all interpreted as UTC.
pub fn parse_flexible_timestamp(text: &str) -> FluxResult<DateTime<Utc>> {
    let trimmed = text.trim();

    LAYOUTS
        .iter()
        .find_map(|layout| layout.parse(trimmed))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| FluxError::Parse {
            input: text.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    /// Smallest angular separation between two longitudes in degrees.
    fn angular_gap(a: f64, b: f64) -> f64 {
        let d = (a - b).rem_euclid(360.0);
        d.min(360.0 - d)
    }

    #[test]
    fn test_julian_date_j2000() {
        assert_eq!(julian_date(utc(2000, 1, 1, 12, 0, 0)), 2_451_545.0);
    }

    #[test]
    fn test_julian_date_sub_second() {
        let instant = utc(2000, 1, 1, 12, 0, 0) + Duration::microseconds(100_000);
        let jd = julian_date(instant);
        assert!((jd - 2_451_545.000_001_157_6).abs() < 1e-9);
    }

    #[test]
    fn test_julian_date_known_values() {
        // Start of the Gregorian calendar and a leap day.
        assert_eq!(julian_date(utc(1582, 10, 15, 0, 0, 0)), 2_299_160.5);
        assert_eq!(julian_date(utc(2024, 2, 29, 6, 0, 0)), 2_460_369.75);
    }

    #[test]
    fn test_julian_date_one_day_step_is_exact() {
        let mut instant = utc(2011, 12, 30, 17, 23, 41);
        for _ in 0..800 {
            let next = instant + Duration::days(1);
            assert_eq!(julian_date(next) - julian_date(instant), 1.0, "at {instant}");
            instant = next;
        }
    }

    #[test]
    fn test_julian_date_strictly_monotonic() {
        let mut instant = utc(2010, 12, 31, 22, 0, 0);
        let mut previous = julian_date(instant);
        for _ in 0..5_000 {
            instant += Duration::minutes(7);
            let jd = julian_date(instant);
            assert!(jd > previous, "not increasing at {instant}");
            previous = jd;
        }
    }

    #[test]
    fn test_solar_longitude_reference_values() {
        assert!((solar_longitude(utc(2000, 1, 1, 12, 0, 0)) - 280.3776).abs() < 1e-3);
        // Perseid maximum 2011.
        assert!((solar_longitude(utc(2011, 8, 13, 0, 0, 0)) - 139.7688).abs() < 1e-3);
        // March equinox 2020 in the J2000 frame sits just short of 360°.
        assert!((solar_longitude(utc(2020, 3, 20, 3, 50, 0)) - 359.7273).abs() < 1e-3);
    }

    #[test]
    fn test_solar_longitude_in_range() {
        let mut instant = utc(1990, 1, 1, 0, 0, 0);
        while instant < utc(2030, 1, 1, 0, 0, 0) {
            let lon = solar_longitude(instant);
            assert!((0.0..360.0).contains(&lon), "{lon} at {instant}");
            instant += Duration::hours(53);
        }
    }

    #[test]
    fn test_solar_longitude_repeats_yearly() {
        let sidereal_year = Duration::microseconds((365.256_36 * 86_400e6) as i64);
        let tropical_year = Duration::microseconds((365.2422 * 86_400e6) as i64);

        for start in [
            utc(2000, 1, 1, 12, 0, 0),
            utc(2011, 8, 13, 0, 0, 0),
            utc(2016, 12, 14, 0, 0, 0),
            utc(2020, 3, 20, 3, 50, 0),
        ] {
            let here = solar_longitude(start);
            assert!(angular_gap(here, solar_longitude(start + sidereal_year)) < 0.01);
            // The J2000 frame does not follow precession (~0.014° per year).
            assert!(angular_gap(here, solar_longitude(start + tropical_year)) < 0.02);
        }
    }

    #[test]
    fn test_parse_all_formats() {
        let cases = [
            ("2011-08-12 05:30:15", utc(2011, 8, 12, 5, 30, 15)),
            ("2011-08-12T05:30:15", utc(2011, 8, 12, 5, 30, 15)),
            ("2011-08-12 05:30", utc(2011, 8, 12, 5, 30, 0)),
            ("2011-08-12 05", utc(2011, 8, 12, 5, 0, 0)),
            ("2011-08-12", utc(2011, 8, 12, 0, 0, 0)),
            ("20110812", utc(2011, 8, 12, 0, 0, 0)),
            ("  2011-08-12 05:30  ", utc(2011, 8, 12, 5, 30, 0)),
        ];

        for (text, expected) in cases {
            assert_eq!(parse_flexible_timestamp(text).unwrap(), expected, "{text}");
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for text in ["", "yesterday", "2011-13-01", "2011-08-12 25:00", "12/08/2011"] {
            match parse_flexible_timestamp(text) {
                Err(FluxError::Parse { input }) => assert_eq!(input, text),
                other => panic!("expected parse error for {text:?}, got {other:?}"),
            }
        }
    }
}
