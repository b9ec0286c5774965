//! Greedy sequential linker.
//!
//! Starting from each tracklet in time order, the current track is extended forward one
//! tracklet at a time. Candidates are found with a moving-point query on an [`RdtTree`]
//! over the tracklets' first observations, anchored on the track's last observation and
//! limited to `max_gap` days and `max_velocity` deg/day. Among the candidates of the
//! earliest plate that offers one, the tracklet closest to the track's prediction
//! (below `pred_fit_thresh`) is taken.
//!
//! A track is fitted with a constant velocity until it spans three plates; only then
//! does it get a quadratic model. From a single plate the velocity is too poorly known
//! to extrapolate, so the first hop scores a candidate by the residual of the joint
//! linear fit instead. Once a track spans three or more plates, an extension whose
//! fitted acceleration leaves the `acc_r_max` / `acc_d_max` envelope is refused and the
//! next candidate is tried.

use ahash::{AHashMap, AHashSet};
use log::debug;

use crate::{
    constants::{IndexList, ObsIndex, DEG_PER_HOUR, TIME_EPS},
    observations::ObservationStore,
    rdt_tree::{MovingPointQuery, RdtTree, RdtTreeParams},
    tracks::Track,
};

use super::VtreeParams;

/// Run the sequential linker over a set of tracklets.
///
/// Return
/// ------
/// * every accepted track, once per distinct observation set, in start-tracklet order
pub fn search(store: &ObservationStore, tracklets: &[Track], params: &VtreeParams) -> Vec<Track> {
    if tracklets.is_empty() {
        return Vec::new();
    }

    let mut by_first: AHashMap<ObsIndex, Vec<usize>> = AHashMap::new();
    for (k, t) in tracklets.iter().enumerate() {
        by_first.entry(t.first_index()).or_default().push(k);
    }
    let mut firsts: Vec<ObsIndex> = by_first.keys().copied().collect();
    firsts.sort_unstable();
    let tree = RdtTree::build(store, Some(&firsts), RdtTreeParams::default());

    let mut order: Vec<usize> = (0..tracklets.len()).collect();
    order.sort_by(|&a, &b| {
        tracklets[a]
            .first_time()
            .total_cmp(&tracklets[b].first_time())
            .then(a.cmp(&b))
    });

    let mut seen: AHashSet<IndexList> = AHashSet::new();
    let mut found = Vec::new();

    for &start in &order {
        let (track, plates) = extend_from(store, tracklets, &tree, &by_first, start, params);
        if plates < params.min_support || !(track.mean_sq_residual() < params.fit_thresh) {
            continue;
        }
        if seen.insert(track.sorted_indices()) {
            found.push(track);
        }
    }

    debug!(
        "sequential: {} tracklets, {} tracks",
        tracklets.len(),
        found.len()
    );
    found
}

/// Greedily extend tracklet `start`; returns the track and its number of plates.
fn extend_from(
    store: &ObservationStore,
    tracklets: &[Track],
    tree: &RdtTree,
    by_first: &AHashMap<ObsIndex, Vec<usize>>,
    start: usize,
    params: &VtreeParams,
) -> (Track, usize) {
    let mut track = Track::linear(store, tracklets[start].individuals().iter().copied());
    let mut plates = 1;

    loop {
        let anchor = store.obs(track.last_index());
        let query = MovingPointQuery {
            t_start: track.last_time() + TIME_EPS,
            t_end: track.last_time() + params.max_gap,
            v_min: 0.0,
            v_max: params.max_velocity,
            thresh: params.thresh,
        };

        // (plate time, residual, tracklet)
        let mut candidates: Vec<(f64, f64, usize)> = tree
            .moving_point_query(anchor, &query)
            .into_iter()
            .flat_map(|first| by_first.get(&first).into_iter().flatten().copied())
            .filter(|&k| !tracklets[k].collides_with(&track))
            .filter_map(|k| {
                let t = &tracklets[k];
                let r = candidate_residual(store, &track, plates, t);
                (r < params.pred_fit_thresh).then_some((t.first_time(), r, k))
            })
            .collect();
        candidates.sort_by(|x, y| {
            x.0.total_cmp(&y.0)
                .then(x.1.total_cmp(&y.1))
                .then(x.2.cmp(&y.2))
        });

        let next = candidates.into_iter().find_map(|(_, _, k)| {
            let members = track.individuals().iter().chain(tracklets[k].individuals());
            if plates + 1 < 3 {
                return Some(Track::linear(store, members.copied()));
            }
            let extended = Track::with_quad_threshold(store, members.copied(), params.num_for_quad);
            within_envelope(&extended, params).then_some(extended)
        });
        match next {
            Some(extended) => {
                track = extended;
                plates += 1;
            }
            None => return (track, plates),
        }
    }
}

/// Mean residual of candidate tracklet `t` against a track spanning `plates` plates.
fn candidate_residual(store: &ObservationStore, track: &Track, plates: usize, t: &Track) -> f64 {
    if plates > 1 {
        return track.prediction_residual(store, t.individuals());
    }
    Track::linear(store, track.individuals().iter().chain(t.individuals()).copied())
        .mean_residual()
}

/// Whether the fitted acceleration lies inside the configured bounds (deg/day²).
fn within_envelope(track: &Track, params: &VtreeParams) -> bool {
    let m = track.model();
    (m.ara * DEG_PER_HOUR).abs() <= params.acc_r_max && m.adec.abs() <= params.acc_d_max
}

#[cfg(test)]
mod sequential_test {
    use super::*;
    use crate::observations::Observation;

    fn tracklets_on(store: &mut ObservationStore, dec_acc: f64) -> Vec<Track> {
        (0..4)
            .map(|night| {
                let ids: Vec<ObsIndex> = [0.0, 0.02]
                    .iter()
                    .map(|&dt| {
                        let t = night as f64 + dt;
                        store.push(Observation::new(
                            &format!("s{night}{}", (dt * 100.0) as u8),
                            t,
                            10.0 + 0.01 * t,
                            20.0 + 0.005 * t + 0.5 * dec_acc * t * t,
                            20.0,
                        ))
                    })
                    .collect();
                Track::new(store, ids)
            })
            .collect()
    }

    fn params() -> VtreeParams {
        VtreeParams::builder()
            .thresh(1e-4)
            .acc_r_max(0.001)
            .acc_d_max(0.001)
            .min_support(3)
            .pred_fit_thresh(0.01)
            .fit_thresh(1e-8)
            .strategy(super::super::LinkStrategy::Sequential)
            .build()
            .unwrap()
    }

    #[test]
    fn test_links_straight_path() {
        let mut store = ObservationStore::new();
        let tracklets = tracklets_on(&mut store, 0.0);
        let found = search(&store, &tracklets, &params());
        // start 1 also reaches three plates and yields a distinct, shorter track
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].num_obs(), 8);
        assert!(found.iter().all(|t| t.num_distinct_times() >= 6));
    }

    #[test]
    fn test_first_hop_tolerates_tilted_tracklet() {
        // per-night DEC errors of a few 1e-5 deg tilt each tracklet's own velocity by
        // up to 6e-3 deg/day, far beyond what one night can extrapolate
        let sigma = 3e-5;
        let tilt = [2.0, -1.0, 1.0, -2.0];
        let mut store = ObservationStore::new();
        let tracklets: Vec<Track> = (0..4)
            .map(|night| {
                let ids: Vec<ObsIndex> = (0..3)
                    .map(|k| {
                        let t = night as f64 + 0.01 * k as f64;
                        let err = tilt[night] * sigma * (1.0 - k as f64);
                        store.push(Observation::new(
                            &format!("w{night}{k}"),
                            t,
                            10.0 + 0.01 * t,
                            20.0 + 0.005 * t + err,
                            20.0,
                        ))
                    })
                    .collect();
                Track::new(&store, ids)
            })
            .collect();
        let p = VtreeParams {
            pred_fit_thresh: 1e-3,
            ..params()
        };

        let found = search(&store, &tracklets, &p);
        assert_eq!(found[0].num_obs(), 12);
        assert!(found[0].model().adec.abs() < 1e-4);
    }

    #[test]
    fn test_acceleration_envelope_refuses_extension() {
        let mut store = ObservationStore::new();
        let tracklets = tracklets_on(&mut store, 0.004);
        let found = search(&store, &tracklets, &params());
        assert!(found.is_empty());
    }
}
