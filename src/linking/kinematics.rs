//! Interval kinematics for bounded-acceleration motion.
//!
//! Along one axis, a trajectory with constant acceleration `a` satisfies
//!
//! ```text
//! x_B = x_A + v_A·δ + ½·a·δ²,        δ = t_B − t_A
//! ```
//!
//! Given boxes on positions and velocities at two epochs, the accelerations compatible
//! with *some* member of both boxes form an interval. It is evaluated in both time
//! directions (using the velocity box of `A`, then that of `B`) with plain interval
//! arithmetic, so the result is always a superset of the exact feasible set and pruning
//! on an empty intersection never discards a real trajectory.

use serde::{Deserialize, Serialize};

use crate::constants::MIN_WIDTH;

/// Closed interval `[lo, hi]`; empty when `lo > hi`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub lo: f64,
    pub hi: f64,
}

impl Interval {
    pub const EMPTY: Interval = Interval {
        lo: f64::INFINITY,
        hi: f64::NEG_INFINITY,
    };

    #[inline]
    pub fn new(lo: f64, hi: f64) -> Self {
        Interval { lo, hi }
    }

    /// `[center − half_width, center + half_width]`.
    #[inline]
    pub fn around(center: f64, half_width: f64) -> Self {
        Interval::new(center - half_width, center + half_width)
    }

    /// `[-bound, bound]`.
    #[inline]
    pub fn symmetric(bound: f64) -> Self {
        Interval::new(-bound, bound)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !(self.lo <= self.hi)
    }

    #[inline]
    pub fn width(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.hi - self.lo
        }
    }

    #[inline]
    pub fn center(&self) -> f64 {
        0.5 * (self.lo + self.hi)
    }

    #[inline]
    pub fn contains(&self, x: f64) -> bool {
        self.lo <= x && x <= self.hi
    }

    #[inline]
    pub fn intersect(&self, other: &Interval) -> Interval {
        Interval::new(self.lo.max(other.lo), self.hi.min(other.hi))
    }

    /// Smallest interval containing both.
    #[inline]
    pub fn hull(&self, other: &Interval) -> Interval {
        Interval::new(self.lo.min(other.lo), self.hi.max(other.hi))
    }

    #[inline]
    pub fn add(&self, other: &Interval) -> Interval {
        Interval::new(self.lo + other.lo, self.hi + other.hi)
    }

    #[inline]
    pub fn sub(&self, other: &Interval) -> Interval {
        Interval::new(self.lo - other.hi, self.hi - other.lo)
    }

    /// Multiply by a scalar of either sign.
    #[inline]
    pub fn scale(&self, k: f64) -> Interval {
        if k >= 0.0 {
            Interval::new(self.lo * k, self.hi * k)
        } else {
            Interval::new(self.hi * k, self.lo * k)
        }
    }
}

/// Position and velocity boxes of one coordinate at a single epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisState {
    pub pos: Interval,
    pub vel: Interval,
}

/// Accelerations compatible with leaving `a` at `t_a` and reaching `b` at `t_b`, using
/// the velocity box of `a`.
pub fn forward_acceleration(a: &AxisState, t_a: f64, b: &AxisState, t_b: f64) -> Interval {
    let delta = t_b - t_a;
    let d2 = (delta * delta).max(MIN_WIDTH);
    // 2·(x_B − x_A − v_A·δ)/δ²
    b.pos
        .sub(&a.pos)
        .sub(&a.vel.scale(delta))
        .scale(2.0 / d2)
}

/// Accelerations compatible with arriving in `b` at `t_b` from `a` at `t_a`, using the
/// velocity box of `b`.
pub fn backward_acceleration(a: &AxisState, t_a: f64, b: &AxisState, t_b: f64) -> Interval {
    let delta = t_b - t_a;
    let d2 = (delta * delta).max(MIN_WIDTH);
    // 2·(x_A − x_B + v_B·δ)/δ²
    a.pos
        .sub(&b.pos)
        .add(&b.vel.scale(delta))
        .scale(2.0 / d2)
}

/// Tighten `current` with both directional bounds between `a` and `b`.
#[inline]
pub fn tighten(current: &Interval, a: &AxisState, t_a: f64, b: &AxisState, t_b: f64) -> Interval {
    current
        .intersect(&forward_acceleration(a, t_a, b, t_b))
        .intersect(&backward_acceleration(a, t_a, b, t_b))
}

#[cfg(test)]
mod kinematics_test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn point(x: f64, v: f64) -> AxisState {
        AxisState {
            pos: Interval::new(x, x),
            vel: Interval::new(v, v),
        }
    }

    #[test]
    fn test_interval_ops() {
        let a = Interval::new(1.0, 2.0);
        assert_eq!(a.scale(-2.0), Interval::new(-4.0, -2.0));
        assert_eq!(a.sub(&Interval::new(0.5, 1.0)), Interval::new(0.0, 1.5));
        assert!(a.intersect(&Interval::new(3.0, 4.0)).is_empty());
        assert!(Interval::EMPTY.is_empty());
        assert!(Interval::new(f64::NAN, 1.0).is_empty());
        assert_eq!(a.hull(&Interval::new(-1.0, 0.0)), Interval::new(-1.0, 2.0));
    }

    #[test]
    fn test_exact_states_recover_acceleration() {
        // x(t) = 1 + 2t + ½·0.3·t²
        let x = |t: f64| 1.0 + 2.0 * t + 0.15 * t * t;
        let v = |t: f64| 2.0 + 0.3 * t;
        let a = point(x(0.0), v(0.0));
        let b = point(x(3.0), v(3.0));
        let fwd = forward_acceleration(&a, 0.0, &b, 3.0);
        let bwd = backward_acceleration(&a, 0.0, &b, 3.0);
        assert_abs_diff_eq!(fwd.lo, 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(bwd.hi, 0.3, epsilon = 1e-12);

        // reversed time direction gives the same acceleration
        let rev = forward_acceleration(&b, 3.0, &a, 0.0);
        assert_abs_diff_eq!(rev.center(), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_tighten_prunes_inconsistent_boxes() {
        let a = AxisState {
            pos: Interval::around(0.0, 1e-3),
            vel: Interval::around(1.0, 1e-2),
        };
        let on_track = AxisState {
            pos: Interval::around(2.0, 1e-3),
            vel: Interval::around(1.0, 1e-2),
        };
        let off_track = AxisState {
            pos: Interval::around(2.5, 1e-3),
            vel: Interval::around(1.0, 1e-2),
        };
        let bound = Interval::symmetric(0.01);
        let ok = tighten(&bound, &a, 0.0, &on_track, 2.0);
        assert!(ok.contains(0.0));
        assert!(tighten(&bound, &a, 0.0, &off_track, 2.0).is_empty());
    }
}
