//! Closed-form weighted least-squares fit of the polynomial motion model.
//!
//! Each coordinate is modelled as
//!
//! ```text
//! x(t) = x0 + v·(t − t0) + ½·a·(t − t0)²
//! ```
//!
//! with `t0` the earliest epoch of the track. The normal equations are at most
//! 3×3 and are solved with `nalgebra`'s LU decomposition. Right ascension
//! residuals are weighted by `cos²(DEC)` so that both axes are minimized in
//! true angular units; declination residuals carry unit weight.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::constants::{Degree, Hours, MJD, MIN_WIDTH, RADEG, TIME_EPS};
use crate::conversion::{unwrap_ra_near, wrap_hours};

/// Fitted motion model of a track.
///
/// # Fields
///
/// * `t0` - reference epoch, the earliest observation time (MJD)
/// * `ra0`, `vra`, `ara` - RA at `t0` (hours, wrapped), rate (hours/day),
///   acceleration (hours/day²)
/// * `dec0`, `vdec`, `adec` - DEC at `t0` (deg), rate (deg/day), acceleration (deg/day²)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionModel {
    pub t0: MJD,
    pub ra0: Hours,
    pub vra: f64,
    pub ara: f64,
    pub dec0: Degree,
    pub vdec: f64,
    pub adec: f64,
}

impl MotionModel {
    /// Predicted position at epoch `t`.
    ///
    /// Return
    /// ------
    /// * `(ra, dec)` with RA wrapped onto `[0, 24)` hours and DEC in degrees
    #[inline]
    pub fn predict(&self, t: MJD) -> (Hours, Degree) {
        let dt = t - self.t0;
        let ra = self.ra0 + dt * (self.vra + 0.5 * self.ara * dt);
        let dec = self.dec0 + dt * (self.vdec + 0.5 * self.adec * dt);
        (wrap_hours(ra), dec)
    }

    /// Predicted position at epoch `t`, ignoring the acceleration terms.
    #[inline]
    pub fn predict_linear(&self, t: MJD) -> (Hours, Degree) {
        let dt = t - self.t0;
        (wrap_hours(self.ra0 + dt * self.vra), self.dec0 + dt * self.vdec)
    }
}

/// Count the distinct epochs of a time-sorted sequence.
pub(crate) fn count_distinct_times(sorted_times: &[MJD]) -> usize {
    if sorted_times.is_empty() {
        return 0;
    }
    1 + sorted_times
        .windows(2)
        .filter(|w| w[1] - w[0] > TIME_EPS)
        .count()
}

/// Fit the motion model through time-sorted samples.
///
/// Arguments
/// ---------
/// * `samples`: `(time, ra_hours, dec_deg)` triplets sorted by ascending time, non-empty
/// * `num_for_quad`: minimum number of distinct epochs before the acceleration is fitted
///
/// Return
/// ------
/// * the fitted [`MotionModel`]; with a single distinct epoch the rates are zero and the
///   position is the weighted mean, below `num_for_quad` epochs the accelerations are zero
pub(crate) fn fit_motion(samples: &[(MJD, Hours, Degree)], num_for_quad: usize) -> MotionModel {
    assert!(!samples.is_empty(), "cannot fit a motion model to zero samples");

    let t0 = samples[0].0;
    let ra_ref = samples[0].1;

    let times: Vec<MJD> = samples.iter().map(|s| s.0).collect();
    let distinct = count_distinct_times(&times);
    let mut n_coef = match distinct {
        1 => 1,
        d if d < num_for_quad => 2,
        _ => 3,
    };

    let ra: Vec<(f64, f64, f64)> = samples
        .iter()
        .map(|&(t, ra, dec)| {
            let w = (dec * RADEG).cos().powi(2).max(MIN_WIDTH);
            (t - t0, unwrap_ra_near(ra, ra_ref), w)
        })
        .collect();
    let dec: Vec<(f64, f64, f64)> = samples
        .iter()
        .map(|&(t, _, dec)| (t - t0, dec, 1.0))
        .collect();

    loop {
        if let (Some(cr), Some(cd)) = (solve_axis(&ra, n_coef), solve_axis(&dec, n_coef)) {
            return MotionModel {
                t0,
                ra0: wrap_hours(cr[0]),
                vra: cr[1],
                ara: cr[2],
                dec0: cd[0],
                vdec: cd[1],
                adec: cd[2],
            };
        }
        // an ill-conditioned system falls back to a lower degree; one coefficient always solves
        n_coef -= 1;
    }
}

/// Solve the weighted normal equations of one axis for the first `n_coef` basis functions.
///
/// Unused coefficients are pinned to zero by an identity block, which keeps the
/// system a fixed 3×3 regardless of degree.
fn solve_axis(samples: &[(f64, f64, f64)], n_coef: usize) -> Option<Vector3<f64>> {
    let mut normal = Matrix3::<f64>::zeros();
    let mut rhs = Vector3::<f64>::zeros();

    for &(dt, x, w) in samples {
        let phi = Vector3::new(1.0, dt, 0.5 * dt * dt);
        for r in 0..n_coef {
            rhs[r] += w * phi[r] * x;
            for c in 0..n_coef {
                normal[(r, c)] += w * phi[r] * phi[c];
            }
        }
    }
    for k in n_coef..3 {
        normal[(k, k)] = 1.0;
    }

    let coef = normal.lu().solve(&rhs)?;
    coef.iter().all(|c| c.is_finite()).then_some(coef)
}

#[cfg(test)]
mod fit_test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_single_sample_is_stationary() {
        let m = fit_motion(&[(100.0, 5.5, -20.0)], 4);
        assert_eq!(m.t0, 100.0);
        assert_abs_diff_eq!(m.ra0, 5.5, epsilon = 1e-12);
        assert_abs_diff_eq!(m.dec0, -20.0, epsilon = 1e-12);
        assert_eq!((m.vra, m.ara, m.vdec, m.adec), (0.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_same_epoch_uses_weighted_mean() {
        let m = fit_motion(&[(1.0, 2.0, 10.0), (1.0, 2.2, 12.0)], 4);
        assert_eq!((m.vra, m.vdec), (0.0, 0.0));
        assert_abs_diff_eq!(m.dec0, 11.0, epsilon = 1e-12);
        assert!(m.ra0 > 2.0 && m.ra0 < 2.2);
    }

    #[test]
    fn test_linear_below_quad_threshold() {
        let samples: Vec<_> = (0..3)
            .map(|i| {
                let t = i as f64;
                (t, 1.0 + 0.01 * t + 0.001 * t * t, 5.0 - 0.02 * t)
            })
            .collect();
        let m = fit_motion(&samples, 4);
        assert_eq!(m.ara, 0.0);
        assert_eq!(m.adec, 0.0);
        assert_abs_diff_eq!(m.vdec, -0.02, epsilon = 1e-12);
    }

    #[test]
    fn test_quadratic_recovers_acceleration() {
        let samples: Vec<_> = (0..6)
            .map(|i| {
                let t = 0.7 * i as f64;
                (t, 3.0 + 0.02 * t + 0.5 * 0.004 * t * t, 40.0 + 0.1 * t - 0.5 * 0.01 * t * t)
            })
            .collect();
        let m = fit_motion(&samples, 4);
        assert_abs_diff_eq!(m.vra, 0.02, epsilon = 1e-9);
        assert_abs_diff_eq!(m.ara, 0.004, epsilon = 1e-9);
        assert_abs_diff_eq!(m.adec, -0.01, epsilon = 1e-9);
    }

    #[test]
    fn test_fit_across_ra_seam() {
        let m = fit_motion(&[(0.0, 23.99, 0.0), (1.0, 0.01, 0.0)], 4);
        assert_abs_diff_eq!(m.vra, 0.02, epsilon = 1e-12);
        let (ra, _) = m.predict(0.5);
        assert!(ra < 1e-9 || ra > 24.0 - 1e-9);
    }

    #[test]
    fn test_count_distinct_times() {
        assert_eq!(count_distinct_times(&[]), 0);
        assert_eq!(count_distinct_times(&[1.0, 1.0, 1.5, 2.0]), 3);
    }
}
