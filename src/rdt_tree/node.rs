//! Nodes of the RDT-tree: bounding boxes over `(time, RA, DEC, brightness)` plus an
//! angular bounding radius around the box's sky midpoint.

use crate::{
    constants::{Degree, Hours, ObsIndex, DEG_PER_HOUR, HOURS_PER_CIRCLE, MIN_WIDTH, MJD, RADEG},
    conversion::{angular_distance, wrap_hours},
    observations::ObservationStore,
};

pub const TIME: usize = 0;
pub const RA: usize = 1;
pub const DEC: usize = 2;
pub const BRIGHTNESS: usize = 3;

/// Boxes whose RA bounds reach below this many hours *and* above `24 -` this many
/// hours are treated as straddling the RA = 0/24 seam.
const SEAM_HOURS: f64 = 2.0;

#[derive(Debug, Clone)]
pub enum NodeKind {
    Leaf(Vec<ObsIndex>),
    Internal {
        split_axis: usize,
        split_value: f64,
        left: Box<RdtNode>,
        right: Box<RdtNode>,
    },
}

#[derive(Debug, Clone)]
pub struct RdtNode {
    pub(crate) lo: [f64; 4],
    pub(crate) hi: [f64; 4],
    pub(crate) center: (Hours, Degree),
    pub(crate) radius: Degree,
    pub(crate) num_points: usize,
    pub(crate) kind: NodeKind,
}

/// Bounding information gathered in one pass over a set of observations.
#[derive(Debug, Clone)]
pub(crate) struct Bounds {
    pub lo: [f64; 4],
    pub hi: [f64; 4],
    pub center: (Hours, Degree),
    pub radius: Degree,
}

impl Bounds {
    /// Compute the box, the sky midpoint and the exact angular radius of a subset.
    ///
    /// A box straddling the RA seam is widened to the full `[0, 24)` hour range and
    /// its midpoint is taken on the unwrapped values, so that no gap is left at the seam.
    pub(crate) fn of(store: &ObservationStore, indices: &[ObsIndex]) -> Self {
        if indices.is_empty() {
            return Bounds {
                lo: [f64::INFINITY; 4],
                hi: [f64::NEG_INFINITY; 4],
                center: (0.0, 0.0),
                radius: 0.0,
            };
        }

        let mut lo = [f64::INFINITY; 4];
        let mut hi = [f64::NEG_INFINITY; 4];
        for &i in indices {
            let o = store.obs(i);
            for (d, v) in [o.time, o.ra, o.dec, o.brightness].into_iter().enumerate() {
                if v.is_finite() {
                    lo[d] = lo[d].min(v);
                    hi[d] = hi[d].max(v);
                }
            }
        }
        // all-NaN brightness leaves an inverted interval; collapse it to a point
        if lo[BRIGHTNESS] > hi[BRIGHTNESS] {
            lo[BRIGHTNESS] = 0.0;
            hi[BRIGHTNESS] = 0.0;
        }

        let straddles = lo[RA] < SEAM_HOURS && hi[RA] > HOURS_PER_CIRCLE - SEAM_HOURS;
        let ra_center = if straddles {
            let (mut ulo, mut uhi) = (f64::INFINITY, f64::NEG_INFINITY);
            for &i in indices {
                let ra = store.obs(i).ra;
                let shifted = if ra < 0.5 * HOURS_PER_CIRCLE {
                    ra + HOURS_PER_CIRCLE
                } else {
                    ra
                };
                ulo = ulo.min(shifted);
                uhi = uhi.max(shifted);
            }
            lo[RA] = 0.0;
            hi[RA] = HOURS_PER_CIRCLE;
            wrap_hours(0.5 * (ulo + uhi))
        } else {
            0.5 * (lo[RA] + hi[RA])
        };
        let center = (ra_center, 0.5 * (lo[DEC] + hi[DEC]));

        let radius = indices
            .iter()
            .map(|&i| {
                let o = store.obs(i);
                angular_distance(center.0, center.1, o.ra, o.dec)
            })
            .fold(0.0, f64::max);

        Bounds {
            lo,
            hi,
            center,
            radius,
        }
    }

    /// Half-width along `axis`, never narrower than [`MIN_WIDTH`].
    pub(crate) fn half_width(&self, axis: usize) -> f64 {
        (0.5 * (self.hi[axis] - self.lo[axis])).max(MIN_WIDTH)
    }

    /// Half-widths of time, RA and DEC expressed in comparable units.
    ///
    /// RA is converted to degrees on the sky (`15·cos(DEC)`), then RA and DEC are
    /// divided by the global angular scale and time by the global time scale.
    pub(crate) fn normalized_half_widths(&self, scales: &Scales) -> [f64; 3] {
        let t = (0.5 * (self.hi[TIME] - self.lo[TIME])).max(0.0) / scales.time;
        let cos_dec = (self.center.1 * RADEG).cos().abs().max(MIN_WIDTH);
        let ra =
            (0.5 * (self.hi[RA] - self.lo[RA])).max(0.0) * DEG_PER_HOUR * cos_dec / scales.angle;
        let dec = (0.5 * (self.hi[DEC] - self.lo[DEC])).max(0.0) / scales.angle;
        [t, ra, dec]
    }
}

/// Global per-axis scales used to compare extents of different units.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scales {
    pub time: f64,
    pub angle: Degree,
}

impl Scales {
    pub(crate) fn from_root(bounds: &Bounds) -> Self {
        let time = if bounds.hi[TIME] >= bounds.lo[TIME] {
            bounds.half_width(TIME)
        } else {
            MIN_WIDTH
        };
        Scales {
            time,
            angle: bounds.radius.max(MIN_WIDTH),
        }
    }
}

impl RdtNode {
    pub(crate) fn leaf(bounds: Bounds, indices: Vec<ObsIndex>) -> Self {
        RdtNode {
            lo: bounds.lo,
            hi: bounds.hi,
            center: bounds.center,
            radius: bounds.radius,
            num_points: indices.len(),
            kind: NodeKind::Leaf(indices),
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    #[inline]
    pub fn num_points(&self) -> usize {
        self.num_points
    }

    /// Lower corner of the box, `(time, RA, DEC, brightness)`.
    pub fn lo(&self) -> &[f64; 4] {
        &self.lo
    }

    /// Upper corner of the box, `(time, RA, DEC, brightness)`.
    pub fn hi(&self) -> &[f64; 4] {
        &self.hi
    }

    pub fn radius(&self) -> Degree {
        self.radius
    }

    /// Closest and farthest `|t − time|` reachable inside `[t_start, t_end] ∩ box`.
    ///
    /// Return
    /// ------
    /// * `None` when the node's time span misses the window
    pub(crate) fn time_gap(&self, time: MJD, t_start: MJD, t_end: MJD) -> Option<(f64, f64)> {
        let a = self.lo[TIME].max(t_start);
        let b = self.hi[TIME].min(t_end);
        if a > b {
            return None;
        }
        Some(if time < a {
            (a - time, b - time)
        } else if time > b {
            (time - b, time - a)
        } else {
            (0.0, (time - a).max(b - time))
        })
    }

    /// Lower and upper bounds on the angular distance from `(ra, dec)` to any point
    /// of this node.
    pub(crate) fn distance_bounds(&self, ra: Hours, dec: Degree) -> (Degree, Degree) {
        let dc = angular_distance(ra, dec, self.center.0, self.center.1);
        let dec_gap = if dec < self.lo[DEC] {
            self.lo[DEC] - dec
        } else if dec > self.hi[DEC] {
            dec - self.hi[DEC]
        } else {
            0.0
        };
        ((dc - self.radius).max(dec_gap).max(0.0), dc + self.radius)
    }
}
