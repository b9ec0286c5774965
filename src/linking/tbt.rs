//! Tracklet-bound tree (TBT).
//!
//! Each tracklet is summarized by a box in `(time, RA, DEC, vRA, vDEC)` expressed in the
//! [`LinkerFrame`]: the first observation's position inflated by the astrometric
//! threshold, and the endpoint-to-endpoint secant velocity inflated by
//! `2·threshold/Δt`. The boxes are indexed by a kd-tree that splits on time first,
//! down to single epochs, and then on the widest of the four kinematic axes. The
//! time-width-zero subtrees are finally flattened, in time order, into **plates**.

use crate::{
    constants::{Degree, Hours, MIN_WIDTH, MJD, RADEG, TIME_EPS},
    conversion::{circular_mean_hours, hours_to_deg, unwrap_ra_near},
    observations::ObservationStore,
    tracks::Track,
};

use super::kinematics::{AxisState, Interval};

pub const AXIS_RA: usize = 0;
pub const AXIS_DEC: usize = 1;

/// Continuous angular frame of one linker run.
///
/// Right ascension is converted to degrees and unwrapped to within 180° of the field's
/// circular-mean RA, so that a field straddling the 0/24 h seam is continuous.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkerFrame {
    ra_ref: Hours,
}

impl LinkerFrame {
    pub fn new(ra_ref: Hours) -> Self {
        LinkerFrame { ra_ref }
    }

    /// Frame centred on the circular mean RA of the tracklets' first observations.
    pub fn for_tracklets(store: &ObservationStore, tracklets: &[Track]) -> Self {
        let ra_ref = circular_mean_hours(tracklets.iter().map(|t| store.obs(t.first_index()).ra))
            .unwrap_or(0.0);
        LinkerFrame { ra_ref }
    }

    /// RA coordinate in frame degrees.
    #[inline]
    pub fn ra_deg(&self, ra: Hours) -> Degree {
        hours_to_deg(unwrap_ra_near(ra, self.ra_ref))
    }
}

/// Kinematic box of a single tracklet.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackletBox {
    /// Index into the linker's tracklet slice.
    pub tracklet: usize,
    pub time: MJD,
    pub axes: [AxisState; 2],
}

impl TrackletBox {
    /// Box of `track` at its first epoch.
    ///
    /// Arguments
    /// ---------
    /// * `thresh`: astrometric threshold (deg on the sky); RA bounds are widened by
    ///   `1/cos(DEC)` to express it in RA-coordinate degrees
    /// * `max_velocity`: velocity half-width (deg/day) given to single-epoch tracklets
    pub fn from_tracklet(
        store: &ObservationStore,
        frame: &LinkerFrame,
        index: usize,
        track: &Track,
        thresh: Degree,
        max_velocity: f64,
    ) -> Self {
        let first = store.obs(track.first_index());
        let last = store.obs(track.last_index());
        let cos_dec = (first.dec * RADEG).cos().abs().max(MIN_WIDTH);
        let half = [thresh / cos_dec, thresh];
        let x0 = [frame.ra_deg(first.ra), first.dec];
        let x1 = [frame.ra_deg(last.ra), last.dec];
        let dt = last.time - first.time;

        let axes = std::array::from_fn(|ax| {
            let vel = if dt > TIME_EPS {
                Interval::around((x1[ax] - x0[ax]) / dt, 2.0 * half[ax] / dt)
            } else {
                // no baseline: unit synthetic Δt and the full velocity envelope
                Interval::around(x1[ax] - x0[ax], 2.0 * half[ax] + max_velocity)
            };
            AxisState {
                pos: Interval::around(x0[ax], half[ax]),
                vel,
            }
        });

        TrackletBox {
            tracklet: index,
            time: first.time,
            axes,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TbtKind {
    Leaf(Vec<usize>),
    Internal(Box<TbtNode>, Box<TbtNode>),
}

/// Node of the tracklet-bound tree: the hull of its boxes.
#[derive(Debug, Clone)]
pub struct TbtNode {
    pub time: Interval,
    pub axes: [AxisState; 2],
    pub num_boxes: usize,
    pub kind: TbtKind,
}

impl TbtNode {
    fn hull_of(boxes: &[TrackletBox], ids: &[usize]) -> (Interval, [AxisState; 2]) {
        let mut time = Interval::EMPTY;
        let mut axes = [AxisState {
            pos: Interval::EMPTY,
            vel: Interval::EMPTY,
        }; 2];
        for &i in ids {
            let b = &boxes[i];
            time = time.hull(&Interval::new(b.time, b.time));
            for (acc, s) in axes.iter_mut().zip(&b.axes) {
                acc.pos = acc.pos.hull(&s.pos);
                acc.vel = acc.vel.hull(&s.vel);
            }
        }
        (time, axes)
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, TbtKind::Leaf(_))
    }

    pub fn children(&self) -> Option<(&TbtNode, &TbtNode)> {
        match &self.kind {
            TbtKind::Leaf(_) => None,
            TbtKind::Internal(l, r) => Some((l, r)),
        }
    }

    /// Largest position width over both axes.
    pub fn position_width(&self) -> Degree {
        self.axes
            .iter()
            .map(|s| s.pos.width())
            .fold(0.0, f64::max)
    }

    /// Largest width a member's position could spread to after `delta` days.
    pub fn spread(&self, delta: f64) -> Degree {
        self.axes
            .iter()
            .map(|s| s.pos.width() + s.vel.width() * delta.abs())
            .fold(0.0, f64::max)
    }

    /// Box indices below this node.
    pub fn box_ids(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.num_boxes);
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match &node.kind {
                TbtKind::Leaf(ids) => out.extend_from_slice(ids),
                TbtKind::Internal(l, r) => {
                    stack.push(r);
                    stack.push(l);
                }
            }
        }
        out
    }
}

/// A time-width-zero subtree: every tracklet starting at one epoch.
#[derive(Debug, Clone)]
pub struct Plate {
    pub time: MJD,
    pub root: TbtNode,
}

/// The tracklet boxes and their plates, in ascending time order.
#[derive(Debug, Clone)]
pub struct TrackletBoundTree {
    boxes: Vec<TrackletBox>,
    plates: Vec<Plate>,
}

impl TrackletBoundTree {
    /// Build the tree over `boxes` and flatten it into plates.
    pub fn build(boxes: Vec<TrackletBox>, leaf_size: usize) -> Self {
        if boxes.is_empty() {
            return TrackletBoundTree {
                boxes,
                plates: Vec::new(),
            };
        }
        let ids: Vec<usize> = (0..boxes.len()).collect();
        let root = build_node(&boxes, ids, leaf_size.max(1));
        let mut plates = Vec::new();
        flatten(root, &mut plates);
        TrackletBoundTree { boxes, plates }
    }

    pub fn boxes(&self) -> &[TrackletBox] {
        &self.boxes
    }

    pub fn plates(&self) -> &[Plate] {
        &self.plates
    }

    pub fn num_plates(&self) -> usize {
        self.plates.len()
    }
}

fn build_node(boxes: &[TrackletBox], ids: Vec<usize>, leaf_size: usize) -> TbtNode {
    let (time, axes) = TbtNode::hull_of(boxes, &ids);
    let leaf = |ids: Vec<usize>| TbtNode {
        time,
        axes,
        num_boxes: ids.len(),
        kind: TbtKind::Leaf(ids),
    };

    // time first, down to single epochs
    let (left, right): (Vec<usize>, Vec<usize>) = if time.width() > TIME_EPS {
        let mid = time.center();
        ids.iter().copied().partition(|&i| boxes[i].time <= mid)
    } else {
        if ids.len() <= leaf_size {
            return leaf(ids);
        }
        // widest of position and velocity (velocity scaled over one day)
        let (dim, width) = (0..4)
            .map(|d| {
                let s = &axes[d % 2];
                (d, if d < 2 { s.pos.width() } else { s.vel.width() })
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or((0, 0.0));
        if width < MIN_WIDTH {
            return leaf(ids);
        }
        let key = |i: usize| {
            let s = &boxes[i].axes[dim % 2];
            if dim < 2 {
                s.pos.center()
            } else {
                s.vel.center()
            }
        };
        let lo = ids.iter().map(|&i| key(i)).fold(f64::INFINITY, f64::min);
        let hi = ids.iter().map(|&i| key(i)).fold(f64::NEG_INFINITY, f64::max);
        let mid = 0.5 * (lo + hi);
        ids.iter().copied().partition(|&i| key(i) <= mid)
    };

    if left.is_empty() || right.is_empty() {
        return leaf(ids);
    }
    let l = build_node(boxes, left, leaf_size);
    let r = build_node(boxes, right, leaf_size);
    TbtNode {
        time,
        axes,
        num_boxes: l.num_boxes + r.num_boxes,
        kind: TbtKind::Internal(Box::new(l), Box::new(r)),
    }
}

fn flatten(node: TbtNode, plates: &mut Vec<Plate>) {
    if node.time.width() <= TIME_EPS {
        plates.push(Plate {
            time: node.time.lo,
            root: node,
        });
        return;
    }
    match node.kind {
        TbtKind::Internal(l, r) => {
            flatten(*l, plates);
            flatten(*r, plates);
        }
        // unreachable for well-formed trees: a multi-epoch leaf only arises from a
        // degenerate split and is kept whole as its own plate
        TbtKind::Leaf(_) => plates.push(Plate {
            time: node.time.lo,
            root: node,
        }),
    }
}

#[cfg(test)]
mod tbt_test {
    use super::*;
    use crate::observations::Observation;
    use approx::assert_abs_diff_eq;

    fn store() -> ObservationStore {
        let mut obs = Vec::new();
        for night in 0..3 {
            for obj in 0..5 {
                for k in 0..2 {
                    let t = night as f64 + 0.02 * k as f64;
                    obs.push(Observation::new(
                        &format!("n{night}o{obj}k{k}"),
                        t,
                        (23.9 + 0.05 * obj as f64 + 0.01 * t).rem_euclid(24.0),
                        obj as f64 + 0.1 * t,
                        20.0,
                    ));
                }
            }
        }
        obs.into_iter().collect()
    }

    fn tracklets(store: &ObservationStore) -> Vec<Track> {
        (0..15).map(|k| Track::new(store, [2 * k, 2 * k + 1])).collect()
    }

    #[test]
    fn test_frame_is_continuous_across_seam() {
        let s = store();
        let ts = tracklets(&s);
        let frame = LinkerFrame::for_tracklets(&s, &ts);
        let ras: Vec<f64> = ts.iter().map(|t| frame.ra_deg(s.obs(t.first_index()).ra)).collect();
        let span = ras.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
            - ras.iter().cloned().fold(f64::INFINITY, f64::min);
        assert!(span < 5.0, "span {span}");
    }

    #[test]
    fn test_box_velocity() {
        let s = store();
        let ts = tracklets(&s);
        let frame = LinkerFrame::for_tracklets(&s, &ts);
        let b = TrackletBox::from_tracklet(&s, &frame, 0, &ts[0], 1e-4, 1.0);
        assert_abs_diff_eq!(b.axes[AXIS_RA].vel.center(), 0.15, epsilon = 1e-6);
        assert_abs_diff_eq!(b.axes[AXIS_DEC].vel.center(), 0.1, epsilon = 1e-9);
        assert_abs_diff_eq!(b.axes[AXIS_DEC].vel.width(), 2.0 * 2e-4 / 0.02, epsilon = 1e-9);

        let single = Track::new(&s, [0]);
        let sb = TrackletBox::from_tracklet(&s, &frame, 0, &single, 1e-4, 1.0);
        assert!(sb.axes[AXIS_DEC].vel.contains(0.99));
    }

    #[test]
    fn test_plates_are_time_ordered_and_complete() {
        let s = store();
        let ts = tracklets(&s);
        let frame = LinkerFrame::for_tracklets(&s, &ts);
        let boxes = ts
            .iter()
            .enumerate()
            .map(|(i, t)| TrackletBox::from_tracklet(&s, &frame, i, t, 1e-4, 1.0))
            .collect();
        let tbt = TrackletBoundTree::build(boxes, 2);
        assert_eq!(tbt.num_plates(), 3);
        let times: Vec<f64> = tbt.plates().iter().map(|p| p.time).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0]);
        let mut all: Vec<usize> = tbt.plates().iter().flat_map(|p| p.root.box_ids()).collect();
        all.sort_unstable();
        assert_eq!(all, (0..15).collect::<Vec<_>>());
        assert!(tbt.plates().iter().all(|p| p.root.num_boxes == 5));
        assert!(TrackletBoundTree::build(Vec::new(), 2).plates().is_empty());
    }
}
