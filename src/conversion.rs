//! Angular helpers shared by the track fit, the spatial indices and the linkers.
//!
//! Right ascension is carried in **hours** on `[0, 24)`, declination in **degrees**,
//! and every distance returned here is a great-circle angle in **degrees**.

use crate::constants::{Degree, Hours, DEG_PER_HOUR, HOURS_PER_CIRCLE, RADEG, RADH};

/// Great-circle distance between two sky positions.
///
/// Arguments
/// ---------
/// * `ra1`, `dec1`: first position (hours, degrees)
/// * `ra2`, `dec2`: second position (hours, degrees)
///
/// Return
/// ------
/// * the separation in degrees, computed with the haversine formula so that
///   sub-arcsecond separations keep full precision
pub fn angular_distance(ra1: Hours, dec1: Degree, ra2: Hours, dec2: Degree) -> Degree {
    let d1 = dec1 * RADEG;
    let d2 = dec2 * RADEG;
    let half_ddec = 0.5 * (d2 - d1);
    let half_dra = 0.5 * (ra2 - ra1) * RADH;

    let h = half_ddec.sin().powi(2) + d1.cos() * d2.cos() * half_dra.sin().powi(2);
    2.0 * h.sqrt().min(1.0).asin() / RADEG
}

/// Wrap an hour angle onto `[0, 24)`.
pub fn wrap_hours(ra: Hours) -> Hours {
    let r = ra.rem_euclid(HOURS_PER_CIRCLE);
    // rem_euclid can round up to exactly 24.0 for tiny negative inputs
    if r >= HOURS_PER_CIRCLE {
        0.0
    } else {
        r
    }
}

/// Signed shortest difference `to - from` in hours, on `[-12, 12)`.
pub fn ra_delta_hours(from: Hours, to: Hours) -> Hours {
    let d = (to - from).rem_euclid(HOURS_PER_CIRCLE);
    if d >= 0.5 * HOURS_PER_CIRCLE {
        d - HOURS_PER_CIRCLE
    } else {
        d
    }
}

/// Shift `ra` by whole circles so that it lies within 12 hours of `reference`.
///
/// The returned value may fall outside `[0, 24)`; it is meant for continuous
/// arithmetic (fits, velocities) and must be wrapped before being reported.
pub fn unwrap_ra_near(ra: Hours, reference: Hours) -> Hours {
    reference + ra_delta_hours(reference, ra)
}

/// Convert a right ascension in hours to degrees.
#[inline]
pub fn hours_to_deg(ra: Hours) -> Degree {
    ra * DEG_PER_HOUR
}

/// Convert degrees of right ascension to hours.
#[inline]
pub fn deg_to_hours(ra: Degree) -> Hours {
    ra / DEG_PER_HOUR
}

/// Circular mean of a set of right ascensions, in hours.
///
/// Return
/// ------
/// * `None` for an empty input or when the directions cancel out exactly
pub fn circular_mean_hours<I>(ras: I) -> Option<Hours>
where
    I: IntoIterator<Item = Hours>,
{
    let (mut s, mut c, mut n) = (0.0, 0.0, 0usize);
    for ra in ras {
        s += (ra * RADH).sin();
        c += (ra * RADH).cos();
        n += 1;
    }
    if n == 0 || (s.abs() < 1e-15 && c.abs() < 1e-15) {
        return None;
    }
    Some(wrap_hours(s.atan2(c) / RADH))
}

#[cfg(test)]
mod conversion_test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_angular_distance() {
        assert_abs_diff_eq!(angular_distance(0.0, 0.0, 0.0, 1.0), 1.0, epsilon = 1e-12);
        // one hour of RA on the equator is fifteen degrees
        assert_abs_diff_eq!(angular_distance(1.0, 0.0, 2.0, 0.0), 15.0, epsilon = 1e-10);
        // at 60 degrees of declination the same step shrinks by cos(60)
        let d = angular_distance(0.0, 60.0, 0.001, 60.0);
        assert_abs_diff_eq!(d, 0.015 * 0.5, epsilon = 1e-9);
        // seam crossing
        assert_abs_diff_eq!(
            angular_distance(23.99, 10.0, 0.01, 10.0),
            angular_distance(0.0, 10.0, 0.02, 10.0),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(angular_distance(3.0, 90.0, 17.0, 90.0), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_wrap_and_delta() {
        assert_abs_diff_eq!(wrap_hours(25.5), 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_hours(-0.5), 23.5, epsilon = 1e-12);
        assert_eq!(wrap_hours(-1e-18), 0.0);
        assert_abs_diff_eq!(ra_delta_hours(23.5, 0.5), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(ra_delta_hours(0.5, 23.5), -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(unwrap_ra_near(0.2, 23.9), 24.2, epsilon = 1e-12);
    }

    #[test]
    fn test_circular_mean() {
        let m = circular_mean_hours([23.0, 1.0]).unwrap();
        assert!(m < 1e-9 || (24.0 - m) < 1e-9);
        assert_abs_diff_eq!(
            circular_mean_hours([5.0, 7.0]).unwrap(),
            6.0,
            epsilon = 1e-12
        );
        assert!(circular_mean_hours(std::iter::empty()).is_none());
    }
}
