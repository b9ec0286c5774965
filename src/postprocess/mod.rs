//! # Track post-processing
//!
//! Clean-up passes over a set of discovered tracks:
//!
//! * **Subset removal** – tracks are visited longest first, and a track is kept only
//!   if no already-kept track contains all of its observations. Containment is
//!   answered through an inverted index `observation → kept tracks` stored in an
//!   [`SbGraph`], by intersecting the sorted lists of the track's observations.
//! * **Overlap removal** – a track sharing at least `min_overlap_ratio` of its
//!   observations with a kept track is merged into it when the two do not collide
//!   (no epoch with two different observations), and dropped otherwise.
//!
//! Both passes are available on `Vec<Track>` through [`TrackSetExt`].

pub mod sb_graph;

pub use sb_graph::SbGraph;

use std::cmp::Ordering::{Equal, Greater, Less};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    linker_errors::LinkerError,
    observations::ObservationStore,
    tracks::Track,
};

/// Configuration of the post-processing passes.
///
/// Fields
/// -----------------
/// * `remove_subsets` – run subset removal.
/// * `remove_overlaps` – run overlap removal after subset removal.
/// * `min_overlap_ratio` – shared observations over candidate length above which two
///   tracks are considered the same object, in `(0, 1]`.
/// * `merge_fit_thresh` – if set, a merge is accepted only when the merged track's mean
///   squared residual (deg²) stays below it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostProcessParams {
    pub remove_subsets: bool,
    pub remove_overlaps: bool,
    pub min_overlap_ratio: f64,
    pub merge_fit_thresh: Option<f64>,
}

impl Default for PostProcessParams {
    fn default() -> Self {
        PostProcessParams {
            remove_subsets: true,
            remove_overlaps: false,
            min_overlap_ratio: 0.5,
            merge_fit_thresh: None,
        }
    }
}

impl PostProcessParams {
    pub fn builder() -> PostProcessParamsBuilder {
        PostProcessParamsBuilder::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PostProcessParamsBuilder {
    params: PostProcessParams,
}

impl PostProcessParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: PostProcessParams::default(),
        }
    }

    pub fn remove_subsets(mut self, v: bool) -> Self {
        self.params.remove_subsets = v;
        self
    }
    pub fn remove_overlaps(mut self, v: bool) -> Self {
        self.params.remove_overlaps = v;
        self
    }
    pub fn min_overlap_ratio(mut self, v: f64) -> Self {
        self.params.min_overlap_ratio = v;
        self
    }
    pub fn merge_fit_thresh(mut self, v: Option<f64>) -> Self {
        self.params.merge_fit_thresh = v;
        self
    }

    pub fn build(self) -> Result<PostProcessParams, LinkerError> {
        let p = &self.params;
        let ratio_ok = p.min_overlap_ratio.partial_cmp(&0.0) == Some(Greater)
            && matches!(p.min_overlap_ratio.partial_cmp(&1.0), Some(Less) | Some(Equal));
        if !ratio_ok {
            return Err(LinkerError::InvalidParameter(
                "min_overlap_ratio must lie in (0, 1]".into(),
            ));
        }
        if let Some(th) = p.merge_fit_thresh {
            if !matches!(th.partial_cmp(&0.0), Some(Greater) | Some(Equal)) {
                return Err(LinkerError::InvalidParameter(
                    "merge_fit_thresh must be >= 0".into(),
                ));
            }
        }
        Ok(self.params)
    }
}

/// Clean-up passes on a collection of tracks.
pub trait TrackSetExt {
    /// Drop every track whose observations all belong to a longer (or equal, earlier)
    /// kept track.
    ///
    /// Return
    /// ------
    /// * the surviving tracks, longest first; ties keep their input order, so running
    ///   the pass again on its own output returns it unchanged
    fn remove_subsets(self) -> Vec<Track>;

    /// Merge or drop tracks that share too many observations with a kept track.
    ///
    /// Arguments
    /// ---------
    /// * `store`: the observations, used to refit merged tracks
    /// * `params`: overlap ratio and optional merged-fit threshold
    ///
    /// Return
    /// ------
    /// * the surviving tracks, longest first
    fn remove_overlaps(self, store: &ObservationStore, params: &PostProcessParams) -> Vec<Track>;
}

impl TrackSetExt for Vec<Track> {
    fn remove_subsets(mut self) -> Vec<Track> {
        self.sort_by(|a, b| b.num_obs().cmp(&a.num_obs()));
        let num_obs = max_index(&self);
        let n_tracks = self.len();
        // nodes [0, num_obs) are observations, [num_obs, num_obs + n_tracks) kept tracks
        let mut index = SbGraph::new(num_obs + n_tracks, true);

        let mut kept = Vec::with_capacity(n_tracks);
        for track in self {
            if has_common_container(&index, track.individuals()) {
                continue;
            }
            let node = num_obs + kept.len();
            for &i in track.individuals() {
                index.add_edge(i, node);
            }
            kept.push(track);
        }
        kept
    }

    fn remove_overlaps(
        mut self,
        store: &ObservationStore,
        params: &PostProcessParams,
    ) -> Vec<Track> {
        self.sort_by(|a, b| b.num_obs().cmp(&a.num_obs()));
        let num_obs = max_index(&self);
        let n_tracks = self.len();
        let mut index = SbGraph::new(num_obs + n_tracks, true);

        let mut kept: Vec<Track> = Vec::with_capacity(n_tracks);
        let (mut merged, mut dropped) = (0usize, 0usize);

        for track in self {
            let mut overlapping: Vec<usize> = track
                .individuals()
                .iter()
                .flat_map(|&i| index.neighbors(i).iter().map(|&n| n - num_obs))
                .collect();
            overlapping.sort_unstable();
            overlapping.dedup();

            let mut absorbed = false;
            for k in overlapping {
                let shared = track.shared_count(&kept[k]);
                if (shared as f64) < params.min_overlap_ratio * track.num_obs() as f64 {
                    continue;
                }
                if !track.collides_with(&kept[k]) {
                    let candidate = kept[k].combine(store, &track);
                    let fit_ok = params
                        .merge_fit_thresh
                        .map_or(true, |th| candidate.mean_sq_residual() < th);
                    if fit_ok {
                        for &i in candidate.individuals() {
                            index.add_edge(i, num_obs + k);
                        }
                        kept[k] = candidate;
                        merged += 1;
                        absorbed = true;
                        break;
                    }
                }
                dropped += 1;
                absorbed = true;
                break;
            }

            if !absorbed {
                let node = num_obs + kept.len();
                for &i in track.individuals() {
                    index.add_edge(i, node);
                }
                kept.push(track);
            }
        }

        debug!(
            "overlap removal: {} merged, {} dropped, {} kept",
            merged,
            dropped,
            kept.len()
        );
        kept.sort_by(|a, b| b.num_obs().cmp(&a.num_obs()));
        kept
    }
}

/// Run the enabled passes in order: subsets, then overlaps.
pub fn post_process(
    store: &ObservationStore,
    tracks: Vec<Track>,
    params: &PostProcessParams,
) -> Vec<Track> {
    let before = tracks.len();
    let mut tracks = tracks;
    if params.remove_subsets {
        tracks = tracks.remove_subsets();
    }
    if params.remove_overlaps {
        tracks = tracks.remove_overlaps(store, params);
    }
    debug!("post-processing: {} tracks in, {} out", before, tracks.len());
    tracks
}

fn max_index(tracks: &[Track]) -> usize {
    tracks
        .iter()
        .flat_map(|t| t.individuals().iter().copied())
        .max()
        .map_or(0, |m| m + 1)
}

/// Whether some kept track contains every one of `observations`.
fn has_common_container(index: &SbGraph, observations: &[usize]) -> bool {
    let Some((&first, rest)) = observations.split_first() else {
        return false;
    };
    let mut common: Vec<usize> = index.neighbors(first).to_vec();
    for &i in rest {
        if common.is_empty() {
            break;
        }
        let other = index.neighbors(i);
        common.retain(|n| other.binary_search(n).is_ok());
    }
    !common.is_empty()
}

#[cfg(test)]
mod postprocess_test {
    use super::*;
    use crate::observations::Observation;

    fn store() -> ObservationStore {
        // object on a line, one detection per epoch, plus an impostor at epoch 2
        let mut obs: Vec<Observation> = (0..6)
            .map(|k| {
                let t = k as f64;
                Observation::new(&format!("o{k}"), t, 4.0 + 0.01 * t, 10.0 + 0.02 * t, 20.0)
            })
            .collect();
        obs.push(Observation::new("imp", 2.0, 4.02, 10.1, 20.0));
        obs.into_iter().collect()
    }

    fn ids(tracks: &[Track]) -> Vec<Vec<usize>> {
        tracks.iter().map(|t| t.individuals().to_vec()).collect()
    }

    #[test]
    fn test_remove_subsets_keeps_maximal() {
        let s = store();
        let tracks = vec![
            Track::new(&s, [0, 1]),
            Track::new(&s, [0, 1, 2, 3]),
            Track::new(&s, [2, 3]),
            Track::new(&s, [3, 4, 5]),
            Track::new(&s, [0, 1, 2, 3]),
            Track::new(&s, [1, 6]),
        ];
        let kept = tracks.remove_subsets();
        assert_eq!(ids(&kept), vec![vec![0, 1, 2, 3], vec![3, 4, 5], vec![1, 6]]);
        assert_eq!(ids(&kept.clone().remove_subsets()), ids(&kept));
    }

    #[test]
    fn test_remove_overlaps_merges_and_drops() {
        let s = store();
        let tracks = vec![
            Track::new(&s, [0, 1, 2, 3]),
            // shares 2 of 3, no collision: merged
            Track::new(&s, [2, 3, 4]),
            // shares 2 of 3 with the merged track but puts the impostor at epoch 2
            Track::new(&s, [0, 1, 6]),
            // the impostor was never kept, so nothing is shared: kept
            Track::new(&s, [5, 6]),
        ];
        let params = PostProcessParams::builder()
            .remove_overlaps(true)
            .min_overlap_ratio(0.6)
            .build()
            .unwrap();
        let out = tracks.remove_overlaps(&s, &params);
        assert_eq!(ids(&out), vec![vec![0, 1, 2, 3, 4], vec![5, 6]]);
    }

    #[test]
    fn test_merge_fit_threshold_blocks_bad_merge() {
        let s = store();
        let tracks = vec![Track::new(&s, [0, 1, 3, 4]), Track::new(&s, [3, 4, 6])];
        let params = PostProcessParams::builder()
            .remove_overlaps(true)
            .merge_fit_thresh(Some(1e-10))
            .build()
            .unwrap();
        let out = tracks.remove_overlaps(&s, &params);
        assert_eq!(ids(&out), vec![vec![0, 1, 3, 4]]);
    }

    #[test]
    fn test_post_process_and_builder() {
        let s = store();
        assert!(PostProcessParams::builder().min_overlap_ratio(0.0).build().is_err());
        assert!(PostProcessParams::builder().merge_fit_thresh(Some(-1.0)).build().is_err());
        let out = post_process(
            &s,
            vec![Track::new(&s, [0, 1]), Track::new(&s, [0, 1, 2])],
            &PostProcessParams::default(),
        );
        assert_eq!(ids(&out), vec![vec![0, 1, 2]]);
        assert!(post_process(&s, Vec::new(), &PostProcessParams::default()).is_empty());
    }
}
