//! # Multi-night linking
//!
//! Tracklets from different nights are assembled into full tracks under the assumption
//! of a **bounded-acceleration** motion in RA and DEC.
//!
//! Strategies
//! -----------------
//! * [`LinkStrategy::Vtree`] – branch-and-bound search over pairs of plates of the
//!   [`tbt::TrackletBoundTree`] (see [`vtree`]). Every pair of "model" nodes tightens an
//!   acceleration envelope; support nodes inconsistent with it are pruned whole.
//! * [`LinkStrategy::Sequential`] – greedy forward extension from each tracklet using
//!   moving-point queries on an [`RdtTree`](crate::rdt_tree::RdtTree) built over the
//!   tracklets' first observations (see [`sequential`]).
//!
//! Both strategies share the acceptance rule: a track needs contributions from at least
//! `min_support` distinct plates (model endpoints included) and a final mean squared
//! residual below `fit_thresh`.
//!
//! Units
//! -----------------
//! All kinematic quantities live in the [`tbt::LinkerFrame`]: RA in degrees, unwrapped
//! around the field's circular-mean RA, and DEC in degrees. Velocities are in deg/day and
//! accelerations in deg/day².

pub mod kinematics;
pub mod sequential;
pub mod tbt;
pub mod vtree;

use std::cmp::Ordering::{Equal, Greater};

use serde::{Deserialize, Serialize};

use crate::{
    constants::{Degree, DEFAULT_NUM_FOR_QUAD, MJD},
    linker_errors::LinkerError,
    observations::ObservationStore,
    tracks::Track,
};

/// Multi-night search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinkStrategy {
    #[default]
    Vtree,
    Sequential,
}

/// Configuration of the multi-night linker.
///
/// Fields
/// -----------------
/// **Tracklet boxes**
/// * `thresh` – astrometric threshold inflating tracklet positions (deg).
/// * `max_velocity` – velocity half-width given to single-epoch tracklets (deg/day); also
///   the speed limit of the sequential linker's queries.
/// * `tbt_leaf_size` – maximum number of tracklet boxes per TBT leaf.
///
/// **Search**
/// * `acc_r_max`, `acc_d_max` – acceleration bounds in RA and DEC (deg/day²).
/// * `min_support` – minimum number of distinct plates contributing to a track.
/// * `fit_thresh` – maximum mean squared residual of an emitted track (deg²).
/// * `pred_fit_thresh` – maximum mean distance between a support tracklet and the
///   model tracks' prediction (deg).
/// * `endpoints_only` – model plates are the first and last plates of a track: supports
///   are taken strictly between them. Otherwise every other plate may support.
/// * `last_start_time`, `first_end_time` – optional filters on the first and last model
///   plate epochs.
/// * `min_model_dt` – minimum time between the two model plates (days).
/// * `skip_flip` – re-filter the support set every `skip_flip` recursion levels; it is
///   always re-filtered once both model nodes are leaves.
/// * `num_for_quad` – distinct epochs required before a fit gets an acceleration.
///
/// **Sequential strategy**
/// * `strategy` – [`LinkStrategy`].
/// * `max_gap` – longest time between consecutive tracklets of a sequential track (days).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VtreeParams {
    pub thresh: Degree,
    pub max_velocity: f64,
    pub tbt_leaf_size: usize,
    pub acc_r_max: f64,
    pub acc_d_max: f64,
    pub min_support: usize,
    pub fit_thresh: f64,
    pub pred_fit_thresh: Degree,
    pub endpoints_only: bool,
    pub last_start_time: Option<MJD>,
    pub first_end_time: Option<MJD>,
    pub min_model_dt: f64,
    pub skip_flip: usize,
    pub num_for_quad: usize,
    pub strategy: LinkStrategy,
    pub max_gap: f64,
}

impl Default for VtreeParams {
    fn default() -> Self {
        VtreeParams {
            thresh: 5e-4,
            max_velocity: 0.5,
            tbt_leaf_size: 4,
            acc_r_max: 0.02,
            acc_d_max: 0.02,
            min_support: 3,
            fit_thresh: 1e-6,
            pred_fit_thresh: 0.01,
            endpoints_only: true,
            last_start_time: None,
            first_end_time: None,
            min_model_dt: 0.5,
            skip_flip: 2,
            num_for_quad: DEFAULT_NUM_FOR_QUAD,
            strategy: LinkStrategy::Vtree,
            max_gap: 4.0,
        }
    }
}

impl VtreeParams {
    pub fn builder() -> VtreeParamsBuilder {
        VtreeParamsBuilder::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct VtreeParamsBuilder {
    params: VtreeParams,
}

impl VtreeParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: VtreeParams::default(),
        }
    }

    pub fn thresh(mut self, v: Degree) -> Self {
        self.params.thresh = v;
        self
    }
    pub fn max_velocity(mut self, v: f64) -> Self {
        self.params.max_velocity = v;
        self
    }
    pub fn tbt_leaf_size(mut self, v: usize) -> Self {
        self.params.tbt_leaf_size = v;
        self
    }
    pub fn acc_r_max(mut self, v: f64) -> Self {
        self.params.acc_r_max = v;
        self
    }
    pub fn acc_d_max(mut self, v: f64) -> Self {
        self.params.acc_d_max = v;
        self
    }
    pub fn min_support(mut self, v: usize) -> Self {
        self.params.min_support = v;
        self
    }
    pub fn fit_thresh(mut self, v: f64) -> Self {
        self.params.fit_thresh = v;
        self
    }
    pub fn pred_fit_thresh(mut self, v: Degree) -> Self {
        self.params.pred_fit_thresh = v;
        self
    }
    pub fn endpoints_only(mut self, v: bool) -> Self {
        self.params.endpoints_only = v;
        self
    }
    pub fn last_start_time(mut self, v: Option<MJD>) -> Self {
        self.params.last_start_time = v;
        self
    }
    pub fn first_end_time(mut self, v: Option<MJD>) -> Self {
        self.params.first_end_time = v;
        self
    }
    pub fn min_model_dt(mut self, v: f64) -> Self {
        self.params.min_model_dt = v;
        self
    }
    pub fn skip_flip(mut self, v: usize) -> Self {
        self.params.skip_flip = v;
        self
    }
    pub fn num_for_quad(mut self, v: usize) -> Self {
        self.params.num_for_quad = v;
        self
    }
    pub fn strategy(mut self, v: LinkStrategy) -> Self {
        self.params.strategy = v;
        self
    }
    pub fn max_gap(mut self, v: f64) -> Self {
        self.params.max_gap = v;
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

    /// Validate and return the parameters.
    ///
    /// Return
    /// ------
    /// * `Err(LinkerError::InvalidParameter)` for a negative or NaN threshold or bound,
    ///   `min_support == 0`, `skip_flip == 0`, `tbt_leaf_size == 0`, `num_for_quad < 3`,
    ///   or a non-positive `max_gap`
    pub fn build(self) -> Result<VtreeParams, LinkerError> {
        let p = &self.params;

        if !(Self::ge0(p.thresh) && Self::ge0(p.pred_fit_thresh) && Self::ge0(p.fit_thresh)) {
            return Err(LinkerError::InvalidParameter(
                "thresh, pred_fit_thresh and fit_thresh must be >= 0".into(),
            ));
        }
        if !(Self::ge0(p.acc_r_max) && Self::ge0(p.acc_d_max)) {
            return Err(LinkerError::InvalidParameter(
                "acceleration bounds must be >= 0".into(),
            ));
        }
        if !(Self::ge0(p.max_velocity) && Self::ge0(p.min_model_dt)) {
            return Err(LinkerError::InvalidParameter(
                "max_velocity and min_model_dt must be >= 0".into(),
            ));
        }
        if !Self::gt0(p.max_gap) {
            return Err(LinkerError::InvalidParameter("max_gap must be > 0".into()));
        }
        if p.min_support == 0 {
            return Err(LinkerError::InvalidParameter(
                "min_support must be >= 1".into(),
            ));
        }
        if p.skip_flip == 0 {
            return Err(LinkerError::InvalidParameter(
                "skip_flip must be >= 1".into(),
            ));
        }
        if p.tbt_leaf_size == 0 {
            return Err(LinkerError::InvalidParameter(
                "tbt_leaf_size must be >= 1".into(),
            ));
        }
        if p.num_for_quad < 3 {
            return Err(LinkerError::InvalidParameter(
                "num_for_quad must be >= 3".into(),
            ));
        }
        for t in [p.last_start_time, p.first_end_time].into_iter().flatten() {
            if !t.is_finite() {
                return Err(LinkerError::InvalidParameter(
                    "time filters must be finite".into(),
                ));
            }
        }

        Ok(self.params)
    }
}

/// Link tracklets into multi-night tracks with the configured strategy.
///
/// Arguments
/// ---------
/// * `store`: the observations the tracklets index into
/// * `tracklets`: same-night tracklets, typically from
///   [`assemble_tracklets`](crate::tracklets::assemble_tracklets)
/// * `params`: linker configuration
///
/// Return
/// ------
/// * the accepted tracks, without duplicates, in discovery order
pub fn link_tracklets(
    store: &ObservationStore,
    tracklets: &[Track],
    params: &VtreeParams,
) -> Vec<Track> {
    match params.strategy {
        LinkStrategy::Vtree => vtree::search(store, tracklets, params),
        LinkStrategy::Sequential => sequential::search(store, tracklets, params),
    }
}
