//! VTREE branch-and-bound search.
//!
//! For every ordered pair of plates `(i, j)`, `i < j`, the two plate subtrees are the
//! **model** nodes bracketing a candidate track. The search then walks down both model
//! trees at once:
//!
//! 1. **Bounds check** – the acceleration envelope is intersected with the forward and
//!    backward kinematic bounds between the two model boxes; an empty envelope prunes
//!    the branch.
//! 2. **Support filter** – support nodes (other plates) are tested against both model
//!    boxes under the tightened envelope. A node is rejected whole, accepted whole, or
//!    split when it is coarse compared to the width interpolated between the models.
//!    The filter only runs every `skip_flip` levels, and always once both models are
//!    leaves. The support set only ever shrinks on the way down.
//! 3. **Recurse** on the children of the wider model node.
//! 4. **Leaf check** – with both models at leaves, every pair of model tracklets forms
//!    a constant-velocity base track. Support tracklets whose observations lie within
//!    `pred_fit_thresh` of the base prediction are added in ascending residual order,
//!    skipping plates already used and detections colliding in time. The result is
//!    emitted when at least `min_support` plates contribute and the mean squared
//!    residual of the refitted track, quadratic from `num_for_quad` epochs, is below
//!    `fit_thresh`.
//!
//! Only step 1 and the rejection half of step 2 prune, and both rely on interval
//! bounds that contain every feasible trajectory, so a consistent track is never
//! dropped by the tree walk itself.

use ahash::AHashSet;
use log::{debug, trace};
use smallvec::SmallVec;

#[cfg(feature = "progress")]
use crate::progress_bar::LoopProgress;
use crate::{
    constants::{IndexList, ObsIndex, MJD, TIME_EPS},
    observations::ObservationStore,
    tracks::Track,
};

use super::{
    kinematics::{tighten, Interval},
    tbt::{LinkerFrame, TbtKind, TbtNode, TrackletBoundTree, TrackletBox},
    VtreeParams,
};

/// A support subtree together with its plate epoch.
#[derive(Debug, Clone, Copy)]
struct Support<'a> {
    time: MJD,
    node: &'a TbtNode,
}

#[derive(Debug, Default, Clone, Copy)]
struct SearchStats {
    pairs: usize,
    pairs_time_pruned: usize,
    nodes: usize,
    leaf_checks: usize,
}

struct Search<'a> {
    store: &'a ObservationStore,
    tracklets: &'a [Track],
    boxes: &'a [TrackletBox],
    params: &'a VtreeParams,
    seen: AHashSet<IndexList>,
    found: Vec<Track>,
    stats: SearchStats,
}

/// Run the VTREE search over a set of tracklets.
///
/// Arguments
/// ---------
/// * `store`: the observations
/// * `tracklets`: tracklets to link
/// * `params`: thresholds, acceleration bounds and pruning heuristics
///
/// Return
/// ------
/// * every accepted track, once per distinct observation set, in discovery order
pub fn search(store: &ObservationStore, tracklets: &[Track], params: &VtreeParams) -> Vec<Track> {
    if tracklets.is_empty() {
        return Vec::new();
    }

    let frame = LinkerFrame::for_tracklets(store, tracklets);
    let boxes: Vec<TrackletBox> = tracklets
        .iter()
        .enumerate()
        .map(|(i, t)| {
            TrackletBox::from_tracklet(store, &frame, i, t, params.thresh, params.max_velocity)
        })
        .collect();
    let tbt = TrackletBoundTree::build(boxes, params.tbt_leaf_size);
    let plates = tbt.plates();
    debug!(
        "vtree: {} tracklets on {} plates",
        tracklets.len(),
        plates.len()
    );

    let mut search = Search {
        store,
        tracklets,
        boxes: tbt.boxes(),
        params,
        seen: AHashSet::new(),
        found: Vec::new(),
        stats: SearchStats::default(),
    };
    let envelope = [
        Interval::symmetric(params.acc_r_max),
        Interval::symmetric(params.acc_d_max),
    ];

    #[cfg(feature = "progress")]
    let mut progress = LoopProgress::new(plates.len() as u64);

    for (i, pa) in plates.iter().enumerate() {
        #[cfg(feature = "progress")]
        progress.step();

        if let Some(limit) = params.last_start_time {
            if pa.time > limit {
                debug!(
                    "vtree: start plate at {} after last_start_time {}, pruning the remaining {} plates",
                    pa.time,
                    limit,
                    plates.len() - i
                );
                search.stats.pairs_time_pruned += plates.len() - i - 1;
                break;
            }
        }

        for (j, pb) in plates.iter().enumerate().skip(i + 1) {
            if pb.time - pa.time < params.min_model_dt {
                continue;
            }
            if let Some(limit) = params.first_end_time {
                if pb.time < limit {
                    debug!(
                        "vtree: end plate at {} before first_end_time {}, pair ({i}, {j}) pruned",
                        pb.time, limit
                    );
                    search.stats.pairs_time_pruned += 1;
                    continue;
                }
            }

            let supports: Vec<Support> = plates
                .iter()
                .enumerate()
                .filter(|&(k, _)| {
                    k != i && k != j && (!params.endpoints_only || (k > i && k < j))
                })
                .map(|(_, p)| Support {
                    time: p.time,
                    node: &p.root,
                })
                .collect();

            trace!(
                "vtree: model pair ({i}, {j}) at [{}, {}] with {} support plates",
                pa.time,
                pb.time,
                supports.len()
            );
            search.stats.pairs += 1;
            search.recurse(&pa.root, pa.time, &pb.root, pb.time, envelope, supports, 0);
        }
    }

    #[cfg(feature = "progress")]
    progress.finish();

    let stats = search.stats;
    debug!(
        "vtree: {} model pairs, {} time-pruned, {} nodes, {} leaf checks, {} tracks",
        stats.pairs,
        stats.pairs_time_pruned,
        stats.nodes,
        stats.leaf_checks,
        search.found.len()
    );
    search.found
}

/// Number of distinct plate epochs in a support set.
fn distinct_times(supports: &[Support]) -> usize {
    let mut times: SmallVec<[MJD; 16]> = supports.iter().map(|s| s.time).collect();
    times.sort_by(f64::total_cmp);
    times.dedup_by(|a, b| (*a - *b).abs() <= TIME_EPS);
    times.len()
}

impl<'a> Search<'a> {
    #[allow(clippy::too_many_arguments)]
    fn recurse(
        &mut self,
        a: &'a TbtNode,
        ta: MJD,
        b: &'a TbtNode,
        tb: MJD,
        envelope: [Interval; 2],
        supports: Vec<Support<'a>>,
        skip: usize,
    ) {
        self.stats.nodes += 1;

        let mut acc = envelope;
        for (ax, bound) in acc.iter_mut().enumerate() {
            *bound = tighten(bound, &a.axes[ax], ta, &b.axes[ax], tb);
            if bound.is_empty() {
                return;
            }
        }

        let min_support = self.params.min_support;
        if distinct_times(&supports) + 2 < min_support {
            return;
        }

        let both_leaves = a.is_leaf() && b.is_leaf();
        let (supports, skip) = if skip == 0 || both_leaves {
            let filtered = self.filter_supports(a, ta, b, tb, &acc, supports);
            if distinct_times(&filtered) + 2 < min_support {
                return;
            }
            (filtered, self.params.skip_flip - 1)
        } else {
            (supports, skip - 1)
        };

        if both_leaves {
            self.leaf_check(a, b, &acc, &supports);
            return;
        }

        let delta = tb - ta;
        let split_a = match (a.is_leaf(), b.is_leaf()) {
            (false, true) => true,
            (true, false) => false,
            _ => a.spread(delta) >= b.spread(delta),
        };
        if split_a {
            if let Some((l, r)) = a.children() {
                self.recurse(l, ta, b, tb, acc, supports.clone(), skip);
                self.recurse(r, ta, b, tb, acc, supports, skip);
            }
        } else if let Some((l, r)) = b.children() {
            self.recurse(a, ta, l, tb, acc, supports.clone(), skip);
            self.recurse(a, ta, r, tb, acc, supports, skip);
        }
    }

    /// Keep the support nodes that may host a tracklet consistent with both models.
    fn filter_supports(
        &self,
        a: &TbtNode,
        ta: MJD,
        b: &TbtNode,
        tb: MJD,
        acc: &[Interval; 2],
        supports: Vec<Support<'a>>,
    ) -> Vec<Support<'a>> {
        let width_a = a.position_width();
        let width_b = b.position_width();
        let mut kept = Vec::with_capacity(supports.len());
        let mut stack = supports;

        while let Some(s) = stack.pop() {
            let consistent = (0..2).all(|ax| {
                let via_a = tighten(&acc[ax], &a.axes[ax], ta, &s.node.axes[ax], s.time);
                !tighten(&via_a, &s.node.axes[ax], s.time, &b.axes[ax], tb).is_empty()
            });
            if !consistent {
                continue;
            }

            if let Some((l, r)) = s.node.children() {
                let frac = ((s.time - ta) / (tb - ta)).clamp(0.0, 1.0);
                let expected = width_a + (width_b - width_a) * frac;
                if s.node.position_width() > expected {
                    stack.push(Support { time: s.time, node: l });
                    stack.push(Support { time: s.time, node: r });
                    continue;
                }
            }
            kept.push(s);
        }
        kept
    }

    fn leaf_check(&mut self, a: &TbtNode, b: &TbtNode, acc: &[Interval; 2], supports: &[Support]) {
        let (TbtKind::Leaf(ids_a), TbtKind::Leaf(ids_b)) = (&a.kind, &b.kind) else {
            return;
        };
        self.stats.leaf_checks += 1;
        let params = self.params;
        let support_boxes: Vec<usize> = supports.iter().flat_map(|s| s.node.box_ids()).collect();

        for &ia in ids_a {
            for &ib in ids_b {
                let (ba, bb) = (&self.boxes[ia], &self.boxes[ib]);
                let feasible = (0..2).all(|ax| {
                    !tighten(&acc[ax], &ba.axes[ax], ba.time, &bb.axes[ax], bb.time).is_empty()
                });
                if !feasible {
                    continue;
                }
                let (ta, tb) = (&self.tracklets[ba.tracklet], &self.tracklets[bb.tracklet]);
                if ta.collides_with(tb) {
                    continue;
                }
                // two plates only constrain a velocity
                let base = Track::linear(
                    self.store,
                    ta.individuals().iter().chain(tb.individuals()).copied(),
                );

                let mut candidates: Vec<(f64, usize)> = support_boxes
                    .iter()
                    .filter_map(|&k| {
                        let t = &self.tracklets[self.boxes[k].tracklet];
                        let r = base.prediction_residual(self.store, t.individuals());
                        (r < params.pred_fit_thresh).then_some((r, k))
                    })
                    .collect();
                candidates.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)));

                let mut members: Vec<(MJD, ObsIndex)> = base
                    .times()
                    .iter()
                    .copied()
                    .zip(base.individuals().iter().copied())
                    .collect();
                let mut plate_times: SmallVec<[MJD; 8]> = SmallVec::from_slice(&[ba.time, bb.time]);

                for (_, k) in candidates {
                    let bx = &self.boxes[k];
                    if plate_times.iter().any(|&t| (t - bx.time).abs() <= TIME_EPS) {
                        continue;
                    }
                    let t = &self.tracklets[bx.tracklet];
                    if collides(self.store, &members, t.individuals()) {
                        continue;
                    }
                    for (&time, &i) in t.times().iter().zip(t.individuals()) {
                        if !members.iter().any(|&(_, m)| m == i) {
                            members.push((time, i));
                        }
                    }
                    plate_times.push(bx.time);
                }

                if plate_times.len() < params.min_support {
                    continue;
                }
                let track = Track::with_quad_threshold(
                    self.store,
                    members.iter().map(|&(_, i)| i),
                    params.num_for_quad,
                );
                if !(track.mean_sq_residual() < params.fit_thresh) {
                    continue;
                }
                if self.seen.insert(track.sorted_indices()) {
                    self.found.push(track);
                }
            }
        }
    }
}

/// Whether adding `indices` would put two different observations at the same epoch.
fn collides(store: &ObservationStore, members: &[(MJD, ObsIndex)], indices: &[ObsIndex]) -> bool {
    indices.iter().any(|&i| {
        let t = store.obs(i).time;
        members
            .iter()
            .any(|&(tm, m)| m != i && (tm - t).abs() <= TIME_EPS)
    })
}
