//! Radiant altitude correction and flux/ZHR conversion.
//!
//! Velocity conventions:
//!
//! - `v_inf`: velocity just before atmospheric entry (observed velocity corrected
//!   for deceleration and diurnal aberration).
//! - `v_geo`: geocentric velocity, i.e. `v_inf` corrected for the Earth's gravity.

use crate::error::{FluxError, FluxResult};

/// Square of the Earth's escape velocity at the top of the atmosphere, in km²/s².
const ESCAPE_VELOCITY_SQ: f64 = 123.06;

/// Population index assumed when none is given.
pub const DEFAULT_POPULATION_INDEX: f64 = 2.0;

/// Smallest population index for which the ZHR conversion is defined.
pub const MIN_POPULATION_INDEX: f64 = 1.3;

/// Geocentric velocity (km/s) for a pre-atmospheric velocity `v_inf` (km/s).
pub fn geocentric_velocity(v_inf: f64) -> FluxResult<f64> {
    let radicand = v_inf * v_inf - ESCAPE_VELOCITY_SQ;
    if radicand.is_nan() || radicand < 0.0 {
        return Err(FluxError::Domain(format!(
            "v_inf {v_inf} km/s is below escape velocity ({:.2} km/s)",
            ESCAPE_VELOCITY_SQ.sqrt()
        )));
    }
    Ok(radicand.sqrt())
}

/// Correct an observed radiant altitude for zenith attraction.
///
/// Schiaparelli's relation, as given in Jenniskens, *Meteor Showers and their
/// Parent Comets*, appendix B. Gravity pulls apparent radiants towards the
/// zenith, so the corrected altitude is never higher than the observed one.
pub fn correct_zenith_attraction(altitude_deg: f64, v_inf: f64) -> FluxResult<f64> {
    let v_geo = geocentric_velocity(v_inf)?;

    let zenith_distance = 90.0 - altitude_deg;
    let offset = 2.0
        * ((v_inf - v_geo) / (v_inf + v_geo) * (zenith_distance / 2.0).to_radians().tan()).atan();

    Ok(90.0 - (zenith_distance + offset.to_degrees()))
}

/// Convert a flux density (meteoroids per 1000 km²·h) to an equivalent ZHR.
///
/// Koschack & Rendtel (1990b), eq. 41.
pub fn flux_to_zhr(flux: f64, population_index: f64) -> FluxResult<f64> {
    let r = population_index;
    if r.is_nan() || r <= MIN_POPULATION_INDEX {
        return Err(FluxError::Domain(format!(
            "population index {r} must exceed {MIN_POPULATION_INDEX}"
        )));
    }

    let denominator = (13.1 * r - 16.45) * (r - MIN_POPULATION_INDEX).powf(0.748);
    if denominator == 0.0 || !denominator.is_finite() {
        return Err(FluxError::Domain(format!(
            "ZHR conversion undefined for population index {r}"
        )));
    }

    Ok(flux / 1000.0 * 37_200.0 / denominator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zenith_correction_lowers_radiant() {
        let corrected = correct_zenith_attraction(45.0, 20.0).unwrap();
        assert!((corrected - 40.651_509_866).abs() < 1e-6);

        // Faster meteoroids are deflected less.
        let fast = correct_zenith_attraction(45.0, 60.0).unwrap();
        assert!(fast > corrected && fast < 45.0);
    }

    #[test]
    fn test_zenith_correction_at_zenith_is_identity() {
        assert!((correct_zenith_attraction(90.0, 30.0).unwrap() - 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_zenith_correction_below_escape_velocity() {
        assert!(matches!(
            correct_zenith_attraction(45.0, 11.0),
            Err(FluxError::Domain(_))
        ));
        assert!(matches!(
            correct_zenith_attraction(45.0, f64::NAN),
            Err(FluxError::Domain(_))
        ));
        assert!(correct_zenith_attraction(45.0, 11.1).is_ok());
    }

    #[test]
    fn test_geocentric_velocity() {
        assert!((geocentric_velocity(59.0).unwrap() - 57.9477).abs() < 1e-3);
        assert!(geocentric_velocity(11.0).is_err());
    }

    #[test]
    fn test_flux_to_zhr_pinned() {
        let zhr = flux_to_zhr(5.0, DEFAULT_POPULATION_INDEX).unwrap();
        assert!((zhr - 24.910_072_674_919_622).abs() < 1e-9);
    }

    #[test]
    fn test_flux_to_zhr_scales_linearly() {
        let one = flux_to_zhr(1.0, 2.5).unwrap();
        let ten = flux_to_zhr(10.0, 2.5).unwrap();
        assert!((ten - 10.0 * one).abs() < 1e-9);
        assert_eq!(flux_to_zhr(0.0, 2.5).unwrap(), 0.0);
    }

    #[test]
    fn test_flux_to_zhr_rejects_small_population_index() {
        for r in [1.3, 1.0, 0.0, -2.0, f64::NAN] {
            assert!(matches!(flux_to_zhr(5.0, r), Err(FluxError::Domain(_))), "r = {r}");
        }
    }

    #[test]
    fn test_flux_to_zhr_degenerate_denominator() {
        assert!(matches!(
            flux_to_zhr(5.0, f64::INFINITY),
            Err(FluxError::Domain(_))
        ));
    }
}
