//! Partial Hough transform in velocity space.
//!
//! Every pair `(X, C)` maps to a velocity disc: the secant velocity from `X` to `C` on
//! the tangent plane at `X` (deg/day), with radius `2·thresh/Δt`. For each end point `E`
//! (latest first) the tracklet collects every candidate strictly between `X` and `E`
//! whose disc overlaps the disc of `E`; when several candidates share an epoch, the one
//! whose velocity is closest to that of `E` is taken.

use itertools::Itertools;

use crate::{
    constants::{Degree, ObsIndex, DEG_PER_HOUR, RADEG, TIME_EPS},
    conversion::ra_delta_hours,
    observations::{Observation, ObservationStore},
    tracks::Track,
};

use super::TrackletParams;

#[derive(Debug, Clone, Copy)]
struct VelocityDisc {
    vx: f64,
    vy: f64,
    radius: f64,
}

impl VelocityDisc {
    fn between(x: &Observation, y: &Observation, thresh: Degree) -> Self {
        let dt = (y.time - x.time).max(TIME_EPS);
        let cos_dec = (x.dec * RADEG).cos();
        VelocityDisc {
            vx: ra_delta_hours(x.ra, y.ra) * DEG_PER_HOUR * cos_dec / dt,
            vy: (y.dec - x.dec) / dt,
            radius: 2.0 * thresh / dt,
        }
    }

    fn distance(&self, other: &VelocityDisc) -> f64 {
        (self.vx - other.vx).hypot(self.vy - other.vy)
    }

    fn overlaps(&self, other: &VelocityDisc) -> bool {
        self.distance(other) <= self.radius + other.radius
    }
}

/// Build one tracklet per end point from start observation `x`.
///
/// Candidate tracklets whose observations are all contained in an earlier one are
/// dropped when `remove_subsets` is set; in greedy mode only the longest survive.
/// A singleton `{x}` is reported when `min_obs <= 1`.
pub fn expand(
    store: &ObservationStore,
    x: ObsIndex,
    candidates: &[ObsIndex],
    params: &TrackletParams,
) -> Vec<Track> {
    let ox = store.obs(x);
    let discs: Vec<VelocityDisc> = candidates
        .iter()
        .map(|&c| VelocityDisc::between(ox, store.obs(c), params.thresh))
        .collect();

    let mut kept: Vec<Track> = Vec::new();

    for (e_pos, &e) in candidates.iter().enumerate().rev() {
        let t_e = store.obs(e).time;
        let disc_e = &discs[e_pos];

        let chosen = candidates[..e_pos]
            .iter()
            .zip(&discs[..e_pos])
            .filter(|&(&c, d)| {
                let t_c = store.obs(c).time;
                t_c > ox.time + TIME_EPS && t_c < t_e - TIME_EPS && disc_e.overlaps(d)
            })
            .chunk_by(|&(&c, _)| store.obs(c).time)
            .into_iter()
            .filter_map(|(_, same_epoch)| {
                same_epoch
                    .min_by(|a, b| disc_e.distance(a.1).total_cmp(&disc_e.distance(b.1)))
                    .map(|(&c, _)| c)
            })
            .collect::<Vec<_>>();

        let track = Track::with_quad_threshold(
            store,
            std::iter::once(x).chain(chosen).chain(std::iter::once(e)),
            params.num_for_quad,
        );
        if track.num_obs() > params.max_obs {
            continue;
        }

        if params.remove_subsets && kept.iter().any(|k| track.is_subset_of(k)) {
            continue;
        }
        kept.push(track);
    }

    if params.min_obs <= 1 {
        kept.push(Track::with_quad_threshold(store, [x], params.num_for_quad));
    }
    if params.greedy {
        let longest = kept.iter().map(Track::num_obs).max().unwrap_or(0);
        kept.retain(|t| t.num_obs() == longest);
    }
    kept
}
