//! # RDT-tree: spatial-temporal index over observations
//!
//! A balanced binary space-partitioning tree keyed on `(time, RA, DEC, brightness)`.
//! Every node stores its axis-aligned box and an angular **radius** around the box's
//! sky midpoint (exact, computed by a linear scan at construction), which is what
//! the angular queries prune on.
//!
//! Construction
//! -----------------
//! * A subset becomes a leaf when it holds at most `max_leaf_size` points or when its
//!   total normalized width collapses below `1e-10` (coincident points).
//! * Otherwise the split axis is the largest of the time, RA and DEC half-widths, each
//!   normalized by a global scale (root time half-width, root angular radius; RA measured
//!   on the sky with `15·cos(DEC)`). Brightness is never split on.
//! * `force_time_split` splits on time first, down to single epochs.
//! * Points are partitioned around the midpoint of the split axis.
//!
//! The tree borrows the [`ObservationStore`] it was built over, so the store is
//! guaranteed to outlive the index; the index itself is immutable after construction
//! and is rebuilt from scratch for every search episode.
//!
//! Queries
//! -----------------
//! * [`RdtTree::moving_point_query`] – every observation reachable from an anchor within
//!   an angular-velocity envelope over a time window,
//! * [`RdtTree::range_query`] – fixed angular radius, optional time window,
//! * [`RdtTree::nearest_neighbor`] / [`RdtTree::k_nearest`] – best-bound-first search.

pub mod node;
pub mod query;

pub use node::{NodeKind, RdtNode};
pub use query::MovingPointQuery;

use serde::{Deserialize, Serialize};

use crate::{constants::ObsIndex, observations::ObservationStore};
use node::{Bounds, Scales, TIME};

/// Construction parameters of an [`RdtTree`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RdtTreeParams {
    /// Maximum number of points a leaf may hold (values below 1 behave as 1).
    pub max_leaf_size: usize,
    /// Split on time before any angular axis.
    pub force_time_split: bool,
}

impl Default for RdtTreeParams {
    fn default() -> Self {
        RdtTreeParams {
            max_leaf_size: 10,
            force_time_split: false,
        }
    }
}

impl RdtTreeParams {
    pub fn new(max_leaf_size: usize, force_time_split: bool) -> Self {
        RdtTreeParams {
            max_leaf_size,
            force_time_split,
        }
    }
}

#[derive(Debug)]
pub struct RdtTree<'a> {
    store: &'a ObservationStore,
    root: RdtNode,
    params: RdtTreeParams,
}

impl<'a> RdtTree<'a> {
    /// Build a tree over a snapshot of the store.
    ///
    /// Arguments
    /// ---------
    /// * `store`: the observations; borrowed for the lifetime of the tree
    /// * `subset`: indices to index, or `None` for every live observation
    /// * `params`: leaf size and time-split policy
    ///
    /// Return
    /// ------
    /// * the tree; an empty subset yields a single empty leaf
    ///
    /// # Panics
    ///
    /// Panics if `subset` names a removed or out-of-range observation.
    pub fn build(
        store: &'a ObservationStore,
        subset: Option<&[ObsIndex]>,
        params: RdtTreeParams,
    ) -> Self {
        let indices = match subset {
            Some(s) => s.to_vec(),
            None => store.live_indices(),
        };
        let root_bounds = Bounds::of(store, &indices);
        let scales = Scales::from_root(&root_bounds);
        let params = RdtTreeParams {
            max_leaf_size: params.max_leaf_size.max(1),
            ..params
        };
        let root = build_node(store, indices, root_bounds, &scales, &params);

        RdtTree {
            store,
            root,
            params,
        }
    }

    #[inline]
    pub fn store(&self) -> &'a ObservationStore {
        self.store
    }

    #[inline]
    pub fn root(&self) -> &RdtNode {
        &self.root
    }

    pub fn params(&self) -> &RdtTreeParams {
        &self.params
    }

    pub fn num_points(&self) -> usize {
        self.root.num_points
    }

    pub fn is_empty(&self) -> bool {
        self.root.num_points == 0
    }

    /// Index lists of every leaf, left to right.
    pub fn leaf_sets(&self) -> Vec<&[ObsIndex]> {
        let mut out = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            match &node.kind {
                NodeKind::Leaf(ids) => out.push(ids.as_slice()),
                NodeKind::Internal { left, right, .. } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
        out
    }

    pub fn num_nodes(&self) -> usize {
        fn count(node: &RdtNode) -> usize {
            match &node.kind {
                NodeKind::Leaf(_) => 1,
                NodeKind::Internal { left, right, .. } => 1 + count(left) + count(right),
            }
        }
        count(&self.root)
    }

    /// Number of levels, a single leaf counting as one.
    pub fn depth(&self) -> usize {
        fn depth(node: &RdtNode) -> usize {
            match &node.kind {
                NodeKind::Leaf(_) => 1,
                NodeKind::Internal { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        depth(&self.root)
    }
}

fn build_node(
    store: &ObservationStore,
    indices: Vec<ObsIndex>,
    bounds: Bounds,
    scales: &Scales,
    params: &RdtTreeParams,
) -> RdtNode {
    if indices.len() <= params.max_leaf_size {
        return RdtNode::leaf(bounds, indices);
    }
    let widths = bounds.normalized_half_widths(scales);
    if widths.iter().sum::<f64>() < 1e-10 {
        return RdtNode::leaf(bounds, indices);
    }

    let split_axis = if params.force_time_split && widths[TIME] > 1e-10 {
        TIME
    } else {
        // axes 0..3 of the box are time, RA, DEC; brightness is never a candidate
        (0..3)
            .max_by(|&a, &b| widths[a].total_cmp(&widths[b]))
            .unwrap_or(TIME)
    };
    let split_value = 0.5 * (bounds.lo[split_axis] + bounds.hi[split_axis]);

    let (left_ids, right_ids): (Vec<ObsIndex>, Vec<ObsIndex>) = indices
        .into_iter()
        .partition(|&i| axis_value(store, i, split_axis) <= split_value);

    // a midpoint that rounds onto the upper bound cannot separate the points
    if left_ids.is_empty() {
        return RdtNode::leaf(bounds, right_ids);
    }
    if right_ids.is_empty() {
        return RdtNode::leaf(bounds, left_ids);
    }

    let left_bounds = Bounds::of(store, &left_ids);
    let right_bounds = Bounds::of(store, &right_ids);
    let left = build_node(store, left_ids, left_bounds, scales, params);
    let right = build_node(store, right_ids, right_bounds, scales, params);

    RdtNode {
        lo: bounds.lo,
        hi: bounds.hi,
        center: bounds.center,
        radius: bounds.radius,
        num_points: left.num_points + right.num_points,
        kind: NodeKind::Internal {
            split_axis,
            split_value,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}

#[inline]
fn axis_value(store: &ObservationStore, index: ObsIndex, axis: usize) -> f64 {
    let o = store.obs(index);
    match axis {
        node::TIME => o.time,
        node::RA => o.ra,
        node::DEC => o.dec,
        _ => o.brightness,
    }
}
