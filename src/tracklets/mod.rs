//! # Same-night tracklet assembly
//!
//! For every start observation `X`, an [`RdtTree`] moving-point query collects the
//! detections reachable from `X` within `(t(X), t(X) + maxt]` at an angular speed
//! between `minv` and `maxv`. Those candidates are then grouped into short tracks by
//! one of two strategies:
//!
//! * [`TrackletStrategy::Mht`] – multi-hypothesis expansion ([`mht`]),
//! * [`TrackletStrategy::Pht`] – partial Hough transform in velocity space ([`pht`]).
//!
//! Every candidate tracklet is then checked against the trail metadata of its
//! detections (see [`elongation`]), filtered to `[min_obs, max_obs]` observations and,
//! unless disabled, stripped of tracklets contained in a longer one.
//!
//! In `greedy` mode observations claimed by an emitted tracklet are not used as start
//! points again, and start points are visited in ascending time order.

pub mod elongation;
pub mod mht;
pub mod pht;

use std::cmp::Ordering::{Equal, Greater, Less};

use log::debug;
use serde::{Deserialize, Serialize};

#[cfg(feature = "progress")]
use crate::progress_bar::LoopProgress;
use crate::{
    constants::{Degree, ObsIndex, DEFAULT_NUM_FOR_QUAD, TIME_EPS},
    linker_errors::LinkerError,
    observations::ObservationStore,
    postprocess::TrackSetExt,
    rdt_tree::{MovingPointQuery, RdtTree, RdtTreeParams},
    tracks::Track,
};

/// Candidate grouping strategy of the tracklet assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackletStrategy {
    #[default]
    Mht,
    Pht,
}

/// Configuration of the same-night tracklet assembler.
///
/// Fields
/// -----------------
/// * `min_obs`, `max_obs` – accepted tracklet sizes (inclusive).
/// * `maxt` – longest time baseline of a tracklet (days).
/// * `minv`, `maxv` – angular-speed envelope (deg/day).
/// * `thresh` – astrometric threshold (deg); the MHT mean-residual bound and the PHT
///   velocity-disc half-width are derived from it.
/// * `greedy` – replace hypotheses in place (MHT) or keep only the longest tracklets
///   (PHT), and never restart from a consumed observation.
/// * `remove_subsets` – drop tracklets whose observations all belong to a longer one.
/// * `strategy` – [`TrackletStrategy`].
/// * `num_for_quad` – distinct epochs required before a tracklet fit gets an acceleration.
/// * `max_lerr` – tolerated mismatch between predicted and imaged trail length (deg).
/// * `athresh` – tolerated mismatch between track bearing and trail angle (deg).
/// * `min_elong_for_angle` – trails shorter than this (deg) carry no usable direction.
/// * `rdt` – construction parameters of the query tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackletParams {
    pub min_obs: usize,
    pub max_obs: usize,
    pub maxt: f64,
    pub minv: f64,
    pub maxv: f64,
    pub thresh: Degree,
    pub greedy: bool,
    pub remove_subsets: bool,
    pub strategy: TrackletStrategy,
    pub num_for_quad: usize,
    pub max_lerr: Degree,
    pub athresh: Degree,
    pub min_elong_for_angle: Degree,
    pub rdt: RdtTreeParams,
}

impl Default for TrackletParams {
    fn default() -> Self {
        TrackletParams {
            min_obs: 2,
            max_obs: 10,
            maxt: 0.5,
            minv: 0.0,
            maxv: 0.5,
            thresh: 3e-4,
            greedy: false,
            remove_subsets: true,
            strategy: TrackletStrategy::Mht,
            num_for_quad: DEFAULT_NUM_FOR_QUAD,
            max_lerr: 0.01,
            athresh: 10.0,
            min_elong_for_angle: 2e-3,
            rdt: RdtTreeParams::default(),
        }
    }
}

impl TrackletParams {
    pub fn builder() -> TrackletParamsBuilder {
        TrackletParamsBuilder::new()
    }

    /// The moving-point query issued from start observation `x_time`.
    pub(crate) fn query_from(&self, x_time: f64) -> MovingPointQuery {
        MovingPointQuery {
            t_start: x_time + TIME_EPS,
            t_end: x_time + self.maxt,
            v_min: self.minv,
            v_max: self.maxv,
            thresh: self.thresh,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrackletParamsBuilder {
    params: TrackletParams,
}

impl TrackletParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: TrackletParams::default(),
        }
    }

    pub fn min_obs(mut self, v: usize) -> Self {
        self.params.min_obs = v;
        self
    }
    pub fn max_obs(mut self, v: usize) -> Self {
        self.params.max_obs = v;
        self
    }
    pub fn maxt(mut self, v: f64) -> Self {
        self.params.maxt = v;
        self
    }
    pub fn minv(mut self, v: f64) -> Self {
        self.params.minv = v;
        self
    }
    pub fn maxv(mut self, v: f64) -> Self {
        self.params.maxv = v;
        self
    }
    pub fn thresh(mut self, v: Degree) -> Self {
        self.params.thresh = v;
        self
    }
    pub fn greedy(mut self, v: bool) -> Self {
        self.params.greedy = v;
        self
    }
    pub fn remove_subsets(mut self, v: bool) -> Self {
        self.params.remove_subsets = v;
        self
    }
    pub fn strategy(mut self, v: TrackletStrategy) -> Self {
        self.params.strategy = v;
        self
    }
    pub fn num_for_quad(mut self, v: usize) -> Self {
        self.params.num_for_quad = v;
        self
    }
    pub fn max_lerr(mut self, v: Degree) -> Self {
        self.params.max_lerr = v;
        self
    }
    pub fn athresh(mut self, v: Degree) -> Self {
        self.params.athresh = v;
        self
    }
    pub fn min_elong_for_angle(mut self, v: Degree) -> Self {
        self.params.min_elong_for_angle = v;
        self
    }
    pub fn rdt(mut self, v: RdtTreeParams) -> Self {
        self.params.rdt = v;
        self
    }

    #[inline]
    fn gt0(x: f64) -> bool {
        x.partial_cmp(&0.0) == Some(Greater)
    }

    #[inline]
    fn ge0(x: f64) -> bool {
        matches!(x.partial_cmp(&0.0), Some(Greater) | Some(Equal))
    }

    #[inline]
    fn le(a: f64, b: f64) -> bool {
        matches!(a.partial_cmp(&b), Some(Less) | Some(Equal))
    }

    /// Validate and return the parameters.
    ///
    /// Return
    /// ------
    /// * `Err(LinkerError::InvalidParameter)` when a threshold is negative or NaN,
    ///   `maxt` is not strictly positive, `minv > maxv`, `min_obs > max_obs`,
    ///   `max_obs == 0`, `num_for_quad < 3` or `rdt.max_leaf_size == 0`
    pub fn build(self) -> Result<TrackletParams, LinkerError> {
        let p = &self.params;

        if p.max_obs == 0 || p.min_obs > p.max_obs {
            return Err(LinkerError::InvalidParameter(
                "require 0 < max_obs and min_obs <= max_obs".into(),
            ));
        }
        if !Self::gt0(p.maxt) {
            return Err(LinkerError::InvalidParameter("maxt must be > 0".into()));
        }
        if !(Self::ge0(p.minv) && Self::ge0(p.maxv) && Self::le(p.minv, p.maxv)) {
            return Err(LinkerError::InvalidParameter(
                "require 0 <= minv <= maxv".into(),
            ));
        }
        if !Self::ge0(p.thresh) {
            return Err(LinkerError::InvalidParameter("thresh must be >= 0".into()));
        }
        if !(Self::ge0(p.max_lerr) && Self::ge0(p.athresh) && Self::ge0(p.min_elong_for_angle)) {
            return Err(LinkerError::InvalidParameter(
                "elongation tolerances must be >= 0".into(),
            ));
        }
        if p.num_for_quad < 3 {
            return Err(LinkerError::InvalidParameter(
                "num_for_quad must be >= 3".into(),
            ));
        }
        if p.rdt.max_leaf_size == 0 {
            return Err(LinkerError::InvalidParameter(
                "rdt.max_leaf_size must be >= 1".into(),
            ));
        }

        Ok(self.params)
    }
}

/// Assemble same-night tracklets from every live observation of the store.
///
/// Arguments
/// ---------
/// * `store`: the observations
/// * `params`: assembler configuration
///
/// Return
/// ------
/// * the tracklets, ordered by their first observation time; an empty store yields
///   an empty vector
pub fn assemble_tracklets(store: &ObservationStore, params: &TrackletParams) -> Vec<Track> {
    let mut starts = store.live_indices();
    starts.sort_by(|&a, &b| {
        store
            .obs(a)
            .time
            .total_cmp(&store.obs(b).time)
            .then(a.cmp(&b))
    });

    let tree = RdtTree::build(store, Some(&starts), params.rdt);
    let mut consumed = vec![false; store.len()];
    let mut tracklets: Vec<Track> = Vec::new();

    #[cfg(feature = "progress")]
    let mut progress = LoopProgress::new(starts.len() as u64);

    for &x in &starts {
        #[cfg(feature = "progress")]
        progress.step();

        if params.greedy && consumed[x] {
            continue;
        }
        let anchor = store.obs(x);
        let mut candidates = tree.moving_point_query(anchor, &params.query_from(anchor.time));
        sort_by_time(store, &mut candidates);

        let found = match params.strategy {
            TrackletStrategy::Mht => mht::expand(store, x, &candidates, params),
            TrackletStrategy::Pht => pht::expand(store, x, &candidates, params),
        };

        for t in found {
            if t.num_obs() < params.min_obs || t.num_obs() > params.max_obs {
                continue;
            }
            if !elongation::is_consistent(store, &t, params) {
                continue;
            }
            if params.greedy {
                for &i in t.individuals() {
                    consumed[i] = true;
                }
            }
            tracklets.push(t);
        }
    }

    #[cfg(feature = "progress")]
    progress.finish();

    let found = tracklets.len();
    if params.remove_subsets {
        tracklets = tracklets.remove_subsets();
    }
    tracklets.sort_by(|a, b| {
        a.first_time()
            .total_cmp(&b.first_time())
            .then_with(|| a.individuals().cmp(b.individuals()))
    });
    debug!(
        "tracklet assembly: {} start points, {} candidates, {} kept",
        starts.len(),
        found,
        tracklets.len()
    );
    tracklets
}

/// Sort indices by ascending observation time, ties by index.
pub(crate) fn sort_by_time(store: &ObservationStore, indices: &mut [ObsIndex]) {
    indices.sort_by(|&a, &b| {
        store
            .obs(a)
            .time
            .total_cmp(&store.obs(b).time)
            .then(a.cmp(&b))
    });
}

#[cfg(test)]
mod tracklets_test {
    use super::*;
    use crate::observations::Observation;

    /// Two objects observed four times in one night plus one stray detection.
    fn night_store() -> ObservationStore {
        let mut obs = Vec::new();
        for k in 0..4 {
            let t = 100.0 + 0.01 * k as f64;
            let dt = t - 100.0;
            let (a_ra, a_dec) = (5.0 + 0.002 * dt, 10.0 + 0.1 * dt);
            let (b_ra, b_dec) = (7.0 - 0.001 * dt, -5.0 + 0.2 * dt);
            obs.push(Observation::new(&format!("A{k}"), t, a_ra, a_dec, 20.0));
            obs.push(Observation::new(&format!("B{k}"), t, b_ra, b_dec, 21.0));
        }
        obs.push(Observation::new("X", 100.015, 12.0, 40.0, 19.0));
        obs.into_iter().collect()
    }

    fn ids(store: &ObservationStore, t: &Track) -> Vec<String> {
        store.identities(t.individuals())
    }

    #[test]
    fn test_builder_validation() {
        assert!(TrackletParams::builder().build().is_ok());
        assert!(TrackletParams::builder().min_obs(5).max_obs(3).build().is_err());
        assert!(TrackletParams::builder().maxt(0.0).build().is_err());
        assert!(TrackletParams::builder().minv(2.0).maxv(1.0).build().is_err());
        assert!(TrackletParams::builder().thresh(f64::NAN).build().is_err());
        assert!(TrackletParams::builder().num_for_quad(2).build().is_err());
        assert!(TrackletParams::builder()
            .rdt(RdtTreeParams::new(0, false))
            .build()
            .is_err());
    }

    #[test]
    fn test_both_strategies_recover_objects() {
        let store = night_store();
        for strategy in [TrackletStrategy::Mht, TrackletStrategy::Pht] {
            let params = TrackletParams::builder()
                .strategy(strategy)
                .maxt(0.1)
                .maxv(1.0)
                .thresh(1e-4)
                .build()
                .unwrap();
            let tracklets = assemble_tracklets(&store, &params);
            let names: Vec<Vec<String>> = tracklets.iter().map(|t| ids(&store, t)).collect();
            assert!(names.contains(&vec!["A0".into(), "A1".into(), "A2".into(), "A3".into()]));
            assert!(names.contains(&vec!["B0".into(), "B1".into(), "B2".into(), "B3".into()]));
            assert_eq!(tracklets.len(), 2, "{strategy:?}: {names:?}");
        }
    }

    #[test]
    fn test_size_filter_and_empty_store() {
        let store = night_store();
        let params = TrackletParams::builder()
            .min_obs(5)
            .max_obs(8)
            .maxv(1.0)
            .thresh(1e-4)
            .build()
            .unwrap();
        assert!(assemble_tracklets(&store, &params).is_empty());
        let empty = ObservationStore::new();
        assert!(assemble_tracklets(&empty, &TrackletParams::default()).is_empty());
    }

    #[test]
    fn test_greedy_consumes_start_points() {
        let store = night_store();
        let params = TrackletParams::builder()
            .greedy(true)
            .remove_subsets(false)
            .maxt(0.1)
            .maxv(1.0)
            .thresh(1e-4)
            .build()
            .unwrap();
        let tracklets = assemble_tracklets(&store, &params);
        // without subset removal, only the greedy consumption prevents A1.. and B1.. restarts
        assert_eq!(tracklets.len(), 2);
    }
}
