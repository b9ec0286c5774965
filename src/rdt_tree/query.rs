//! Recursive, pruning queries over an [`RdtTree`].
//!
//! All queries share one pattern: a node is skipped when the bounds derived from its
//! box and angular radius prove that no point below it can satisfy the predicate;
//! leaves are scanned against the exact predicate. The pruning tests add a tiny
//! slack so that floating-point rounding can never discard a true match, which keeps
//! every query exactly equivalent to an exhaustive scan.

use log::warn;
use serde::{Deserialize, Serialize};

use super::{NodeKind, RdtNode, RdtTree};
use crate::{
    constants::{Degree, Hours, ObsIndex, MJD, PRUNE_SLACK},
    conversion::angular_distance,
    observations::Observation,
};

/// Parameters of a moving-point query.
///
/// An observation `Y` matches an anchor `X` when
///
/// ```text
/// t_start ≤ time(Y) ≤ t_end
/// v_min·|Δt| − thresh ≤ dist(X, Y) ≤ v_max·|Δt| + thresh,   Δt = time(Y) − time(X)
/// ```
///
/// with velocities in degrees/day and `thresh` in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovingPointQuery {
    pub t_start: MJD,
    pub t_end: MJD,
    pub v_min: f64,
    pub v_max: f64,
    pub thresh: Degree,
}

impl MovingPointQuery {
    /// Exact predicate, shared by leaf scans and brute-force oracles.
    #[inline]
    pub fn matches(&self, anchor: &Observation, y: &Observation) -> bool {
        if y.time < self.t_start || y.time > self.t_end {
            return false;
        }
        let dt = (y.time - anchor.time).abs();
        let d = anchor.distance_to(y);
        d >= self.v_min * dt - self.thresh && d <= self.v_max * dt + self.thresh
    }

    fn may_contain(&self, node: &RdtNode, anchor: &Observation) -> bool {
        if node.num_points == 0 {
            return false;
        }
        let Some((dt_min, dt_max)) = node.time_gap(anchor.time, self.t_start, self.t_end) else {
            return false;
        };
        let (d_lo, d_hi) = node.distance_bounds(anchor.ra, anchor.dec);
        if d_lo > self.v_max * dt_max + self.thresh + PRUNE_SLACK {
            return false;
        }
        if d_hi < self.v_min * dt_min - self.thresh - PRUNE_SLACK {
            return false;
        }
        true
    }
}

/// Bounded list of the best hits seen so far, kept sorted by distance.
#[derive(Debug)]
struct TopHits {
    max_length: usize,
    hits: Vec<(Degree, ObsIndex)>,
}

impl TopHits {
    fn new(max_length: usize) -> Self {
        TopHits {
            max_length,
            hits: Vec::with_capacity(max_length + 1),
        }
    }

    /// Distance a candidate must beat to enter the list.
    fn worst(&self) -> Degree {
        if self.hits.len() < self.max_length {
            f64::INFINITY
        } else {
            self.hits[self.hits.len() - 1].0
        }
    }

    fn try_add(&mut self, distance: Degree, index: ObsIndex) {
        if distance >= self.worst() {
            return;
        }
        let at = self
            .hits
            .partition_point(|&(d, i)| (d, i) <= (distance, index));
        self.hits.insert(at, (distance, index));
        self.hits.truncate(self.max_length);
    }
}

impl<'a> RdtTree<'a> {
    /// Find every observation reachable from `anchor` within the velocity envelope.
    ///
    /// Arguments
    /// ---------
    /// * `anchor`: the query point; it does not need to belong to the store
    /// * `query`: time window, angular-velocity envelope and positional slack
    ///
    /// Return
    /// ------
    /// * matching indices in ascending order
    ///
    /// Notes
    /// -----
    /// * An anchor whose own epoch lies inside `[t_start, t_end]` makes self-matches
    ///   ambiguous; this is flagged with `log::warn!` but the query still runs.
    pub fn moving_point_query(
        &self,
        anchor: &Observation,
        query: &MovingPointQuery,
    ) -> Vec<ObsIndex> {
        if query.t_start <= anchor.time && anchor.time <= query.t_end {
            warn!(
                "moving-point query anchor epoch {} lies inside its own window [{}, {}]",
                anchor.time, query.t_start, query.t_end
            );
        }

        let mut out = Vec::new();
        self.moving_point_rec(&self.root, anchor, query, &mut out);
        out.sort_unstable();
        out
    }

    fn moving_point_rec(
        &self,
        node: &RdtNode,
        anchor: &Observation,
        query: &MovingPointQuery,
        out: &mut Vec<ObsIndex>,
    ) {
        if !query.may_contain(node, anchor) {
            return;
        }
        match &node.kind {
            NodeKind::Leaf(ids) => out.extend(
                ids.iter()
                    .copied()
                    .filter(|&i| query.matches(anchor, self.store.obs(i))),
            ),
            NodeKind::Internal { left, right, .. } => {
                self.moving_point_rec(left, anchor, query, out);
                self.moving_point_rec(right, anchor, query, out);
            }
        }
    }

    /// Find every observation within `radius` degrees of `(ra, dec)`.
    ///
    /// Arguments
    /// ---------
    /// * `ra`, `dec`: query position (hours, degrees)
    /// * `radius`: angular radius (degrees), inclusive
    /// * `time_window`: optional inclusive `(t_start, t_end)` restriction
    ///
    /// Return
    /// ------
    /// * matching indices in ascending order
    pub fn range_query(
        &self,
        ra: Hours,
        dec: Degree,
        radius: Degree,
        time_window: Option<(MJD, MJD)>,
    ) -> Vec<ObsIndex> {
        let (t_start, t_end) = time_window.unwrap_or((f64::NEG_INFINITY, f64::INFINITY));
        let mut out = Vec::new();
        let mut stack = vec![&self.root];

        while let Some(node) = stack.pop() {
            if node.num_points == 0 || node.time_gap(0.0, t_start, t_end).is_none() {
                continue;
            }
            if node.distance_bounds(ra, dec).0 > radius + PRUNE_SLACK {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf(ids) => out.extend(ids.iter().copied().filter(|&i| {
                    let o = self.store.obs(i);
                    o.time >= t_start
                        && o.time <= t_end
                        && angular_distance(ra, dec, o.ra, o.dec) <= radius
                })),
                NodeKind::Internal { left, right, .. } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
        out.sort_unstable();
        out
    }

    /// Closest observation to `(ra, dec)`.
    ///
    /// Arguments
    /// ---------
    /// * `ra`, `dec`: query position (hours, degrees)
    /// * `exclude`: an index to skip, typically the query point itself
    /// * `time_window`: optional inclusive `(t_start, t_end)` restriction
    ///
    /// Return
    /// ------
    /// * `(index, distance_deg)`, or `None` if no observation qualifies
    pub fn nearest_neighbor(
        &self,
        ra: Hours,
        dec: Degree,
        exclude: Option<ObsIndex>,
        time_window: Option<(MJD, MJD)>,
    ) -> Option<(ObsIndex, Degree)> {
        self.k_nearest(ra, dec, 1, exclude, time_window).into_iter().next()
    }

    /// The `k` closest observations to `(ra, dec)`, nearest first.
    ///
    /// Ties in distance are broken by ascending index. The child whose lower distance
    /// bound is smaller is explored first, which tightens the live bound early; the
    /// ordering affects only how much is pruned, never the answer.
    pub fn k_nearest(
        &self,
        ra: Hours,
        dec: Degree,
        k: usize,
        exclude: Option<ObsIndex>,
        time_window: Option<(MJD, MJD)>,
    ) -> Vec<(ObsIndex, Degree)> {
        if k == 0 {
            return Vec::new();
        }
        let window = time_window.unwrap_or((f64::NEG_INFINITY, f64::INFINITY));
        let mut hits = TopHits::new(k);
        self.nearest_rec(&self.root, ra, dec, exclude, window, &mut hits);
        hits.hits.into_iter().map(|(d, i)| (i, d)).collect()
    }

    fn nearest_rec(
        &self,
        node: &RdtNode,
        ra: Hours,
        dec: Degree,
        exclude: Option<ObsIndex>,
        window: (MJD, MJD),
        hits: &mut TopHits,
    ) {
        if node.num_points == 0 || node.time_gap(0.0, window.0, window.1).is_none() {
            return;
        }
        if node.distance_bounds(ra, dec).0 > hits.worst() + PRUNE_SLACK {
            return;
        }
        match &node.kind {
            NodeKind::Leaf(ids) => {
                for &i in ids {
                    if Some(i) == exclude {
                        continue;
                    }
                    let o = self.store.obs(i);
                    if o.time < window.0 || o.time > window.1 {
                        continue;
                    }
                    hits.try_add(angular_distance(ra, dec, o.ra, o.dec), i);
                }
            }
            NodeKind::Internal { left, right, .. } => {
                let bl = left.distance_bounds(ra, dec).0;
                let br = right.distance_bounds(ra, dec).0;
                let (first, second) = if bl <= br { (left, right) } else { (right, left) };
                self.nearest_rec(first, ra, dec, exclude, window, hits);
                self.nearest_rec(second, ra, dec, exclude, window, hits);
            }
        }
    }
}
