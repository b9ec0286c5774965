//! # End-to-end linking pipeline
//!
//! [`Linker`] chains the three stages of the crate over one [`ObservationStore`]:
//!
//! 1. [`assemble_tracklets`](crate::tracklets::assemble_tracklets) – same-night tracklets,
//! 2. [`link_tracklets`](crate::linking::link_tracklets) – multi-night tracks,
//! 3. [`post_process`](crate::postprocess::post_process) – subset and overlap removal,
//!
//! and packs the surviving tracks into a [`TrackResultSet`].
//!
//! Configuration
//! -----------------
//! [`LinkerParams`] aggregates the per-stage parameters. Its builder configures each
//! stage through that stage's own validating builder:
//!
//! ```rust, no_run
//! use tracklink::pipeline::{Linker, LinkerParams};
//! use tracklink::observations::ObservationStore;
//!
//! let params = LinkerParams::builder()
//!     .tracklets(|b| b.maxt(0.1).thresh(2e-4))
//!     .linking(|b| b.min_support(3).acc_r_max(0.01))
//!     .postprocess(|b| b.remove_overlaps(true))
//!     .build()?;
//!
//! let store = ObservationStore::new();
//! let results = Linker::new(params).run(&store);
//! println!("{results}");
//! # Ok::<(), tracklink::linker_errors::LinkerError>(())
//! ```

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    linker_errors::LinkerError,
    linking::{self, LinkStrategy, VtreeParams, VtreeParamsBuilder},
    observations::ObservationStore,
    postprocess::{self, PostProcessParams, PostProcessParamsBuilder},
    rdt_tree::RdtTreeParams,
    results::TrackResultSet,
    tracklets::{self, TrackletParams, TrackletParamsBuilder, TrackletStrategy},
    tracks::Track,
};

/// Parameters of a full [`Linker`] run.
///
/// Fields
/// -----------------
/// * `tracklets` – same-night assembly, including the [`RdtTreeParams`] of its index.
/// * `linking` – multi-night search.
/// * `postprocess` – final clean-up of the track set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkerParams {
    pub tracklets: TrackletParams,
    pub linking: VtreeParams,
    pub postprocess: PostProcessParams,
}

impl LinkerParams {
    pub fn builder() -> LinkerParamsBuilder {
        LinkerParamsBuilder::new()
    }

    /// Spatial index configuration used by the tracklet assembler.
    pub fn rdt(&self) -> &RdtTreeParams {
        &self.tracklets.rdt
    }
}

/// Builder for [`LinkerParams`], delegating to the per-stage builders.
#[derive(Debug, Clone, Default)]
pub struct LinkerParamsBuilder {
    tracklets: TrackletParamsBuilder,
    linking: VtreeParamsBuilder,
    postprocess: PostProcessParamsBuilder,
}

impl LinkerParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the tracklet assembler.
    pub fn tracklets<F>(mut self, f: F) -> Self
    where
        F: FnOnce(TrackletParamsBuilder) -> TrackletParamsBuilder,
    {
        self.tracklets = f(self.tracklets);
        self
    }

    /// Configure the multi-night linker.
    pub fn linking<F>(mut self, f: F) -> Self
    where
        F: FnOnce(VtreeParamsBuilder) -> VtreeParamsBuilder,
    {
        self.linking = f(self.linking);
        self
    }

    /// Configure post-processing.
    pub fn postprocess<F>(mut self, f: F) -> Self
    where
        F: FnOnce(PostProcessParamsBuilder) -> PostProcessParamsBuilder,
    {
        self.postprocess = f(self.postprocess);
        self
    }

    /// Shortcut for the tracklet assembler's spatial index.
    pub fn rdt(mut self, rdt: RdtTreeParams) -> Self {
        self.tracklets = self.tracklets.rdt(rdt);
        self
    }

    /// Validate every stage.
    ///
    /// Return
    /// ------
    /// * the first `Err(LinkerError::InvalidParameter)` raised by a stage builder
    pub fn build(self) -> Result<LinkerParams, LinkerError> {
        Ok(LinkerParams {
            tracklets: self.tracklets.build()?,
            linking: self.linking.build()?,
            postprocess: self.postprocess.build()?,
        })
    }
}

impl fmt::Display for LinkerParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !f.alternate() {
            let t = &self.tracklets;
            let l = &self.linking;
            return write!(
                f,
                "LinkerParams {{ tracklets: {:?} obs {}..={} maxt={} thresh={:e}, linking: {:?} thresh={:e} acc=({:e}, {:e}) min_support={}, subsets={} overlaps={} }}",
                t.strategy,
                t.min_obs,
                t.max_obs,
                t.maxt,
                t.thresh,
                l.strategy,
                l.thresh,
                l.acc_r_max,
                l.acc_d_max,
                l.min_support,
                self.postprocess.remove_subsets,
                self.postprocess.remove_overlaps,
            );
        }

        const PARAM_COL: usize = 40;
        writeln!(f, "Linker Parameters")?;
        writeln!(f, "-----------------")?;

        macro_rules! line {
            ($fmt:expr, $val:expr, $comment:expr) => {{
                let s = format!($fmt, $val);
                let pad = if s.len() < PARAM_COL {
                    " ".repeat(PARAM_COL - s.len())
                } else {
                    " ".to_string()
                };
                writeln!(f, "  {}{}# {}", s, pad, $comment)
            }};
        }

        let t = &self.tracklets;
        writeln!(f, "[Tracklets]")?;
        let strategy = match t.strategy {
            TrackletStrategy::Mht => "mht",
            TrackletStrategy::Pht => "pht",
        };
        line!("strategy        = {}", strategy, "Same-night search")?;
        line!("min_obs         = {}", t.min_obs, "Smallest tracklet kept")?;
        line!("max_obs         = {}", t.max_obs, "Largest tracklet kept")?;
        line!("maxt            = {:.4} d", t.maxt, "Longest tracklet span")?;
        line!("minv            = {:.4} deg/d", t.minv, "Slowest motion")?;
        line!("maxv            = {:.4} deg/d", t.maxv, "Fastest motion")?;
        line!("thresh          = {:.2e} deg", t.thresh, "Astrometric slack")?;
        line!("greedy          = {}", t.greedy, "Keep longest only")?;
        line!("remove_subsets  = {}", t.remove_subsets, "Drop contained tracklets")?;
        line!("rdt.leaf        = {}", t.rdt.max_leaf_size, "Index leaf size")?;

        let l = &self.linking;
        writeln!(f, "\n[Linking]")?;
        let strategy = match l.strategy {
            LinkStrategy::Vtree => "vtree",
            LinkStrategy::Sequential => "sequential",
        };
        line!("strategy        = {}", strategy, "Multi-night search")?;
        line!("thresh          = {:.2e} deg", l.thresh, "Tracklet box slack")?;
        line!("acc_r_max       = {:.2e} deg/d²", l.acc_r_max, "RA acceleration bound")?;
        line!("acc_d_max       = {:.2e} deg/d²", l.acc_d_max, "DEC acceleration bound")?;
        line!("min_support     = {}", l.min_support, "Distinct plates per track")?;
        line!("fit_thresh      = {:.2e} deg²", l.fit_thresh, "Track MSE bound")?;
        line!("pred_fit_thresh = {:.2e} deg", l.pred_fit_thresh, "Support residual bound")?;
        line!("endpoints_only  = {}", l.endpoints_only, "Models span the track")?;

        let p = &self.postprocess;
        writeln!(f, "\n[Post-processing]")?;
        line!("remove_subsets  = {}", p.remove_subsets, "Drop contained tracks")?;
        line!("remove_overlaps = {}", p.remove_overlaps, "Merge or drop overlaps")?;
        line!("overlap_ratio   = {:.2}", p.min_overlap_ratio, "Overlap trigger")?;
        Ok(())
    }
}

/// Full linker over one observation store.
#[derive(Debug, Clone, Default)]
pub struct Linker {
    params: LinkerParams,
}

impl Linker {
    pub fn new(params: LinkerParams) -> Self {
        Linker { params }
    }

    pub fn params(&self) -> &LinkerParams {
        &self.params
    }

    pub fn assemble_tracklets(&self, store: &ObservationStore) -> Vec<Track> {
        tracklets::assemble_tracklets(store, &self.params.tracklets)
    }

    pub fn link_tracklets(&self, store: &ObservationStore, tracklets: &[Track]) -> Vec<Track> {
        linking::link_tracklets(store, tracklets, &self.params.linking)
    }

    pub fn post_process(&self, store: &ObservationStore, tracks: Vec<Track>) -> Vec<Track> {
        postprocess::post_process(store, tracks, &self.params.postprocess)
    }

    /// Run all three stages.
    ///
    /// Return
    /// ------
    /// * the surviving tracks, empty for an empty store
    pub fn run(&self, store: &ObservationStore) -> TrackResultSet {
        let tracklets = self.assemble_tracklets(store);
        let tracks = self.link_tracklets(store, &tracklets);
        let tracks = self.post_process(store, tracks);
        debug!(
            "linker: {} observations, {} tracklets, {} tracks",
            store.num_live(),
            tracklets.len(),
            tracks.len()
        );
        TrackResultSet::from_tracks(store, &tracks)
    }
}

#[cfg(test)]
mod pipeline_test {
    use super::*;

    #[test]
    fn test_builder_delegates_validation() {
        assert!(LinkerParams::builder().build().is_ok());
        assert!(LinkerParams::builder()
            .tracklets(|b| b.min_obs(5).max_obs(3))
            .build()
            .is_err());
        assert!(LinkerParams::builder()
            .linking(|b| b.min_support(0))
            .build()
            .is_err());
        assert!(LinkerParams::builder()
            .postprocess(|b| b.min_overlap_ratio(0.0))
            .build()
            .is_err());

        let p = LinkerParams::builder()
            .rdt(RdtTreeParams::new(3, true))
            .build()
            .unwrap();
        assert_eq!(p.rdt().max_leaf_size, 3);
    }

    #[test]
    fn test_display_both_forms() {
        let p = LinkerParams::default();
        assert!(format!("{p}").starts_with("LinkerParams {"));
        let long = format!("{p:#}");
        assert!(long.contains("[Linking]"));
        assert!(long.contains("min_support     = 3"));
    }

    #[test]
    fn test_empty_store_gives_empty_result() {
        let store = ObservationStore::new();
        assert!(Linker::default().run(&store).is_empty());
    }
}
