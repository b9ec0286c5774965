//! Sparse boolean graph.
//!
//! Each node owns a sorted vector of neighbour indices, so membership tests are
//! binary searches and sorted neighbour lists can be intersected in linear time.
//! Undirected graphs store every edge in both lists.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SbGraph {
    directed: bool,
    adjacency: Vec<Vec<usize>>,
}

impl SbGraph {
    /// Create a graph with `num_nodes` nodes and no edges.
    pub fn new(num_nodes: usize, directed: bool) -> Self {
        SbGraph {
            directed,
            adjacency: vec![Vec::new(); num_nodes],
        }
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_directed(&self) -> bool {
        self.directed
    }

    /// Number of edges; an undirected edge counts once.
    pub fn num_edges(&self) -> usize {
        let total: usize = self.adjacency.iter().map(Vec::len).sum();
        if self.directed {
            total
        } else {
            let loops = self
                .adjacency
                .iter()
                .enumerate()
                .filter(|(i, n)| n.binary_search(i).is_ok())
                .count();
            (total - loops) / 2 + loops
        }
    }

    /// Insert the edge `from → to`.
    ///
    /// Return
    /// ------
    /// * `true` if the edge was not present before
    ///
    /// # Panics
    ///
    /// Panics if either endpoint is out of range.
    pub fn add_edge(&mut self, from: usize, to: usize) -> bool {
        assert!(
            from < self.num_nodes() && to < self.num_nodes(),
            "edge ({from}, {to}) out of range for {} nodes",
            self.num_nodes()
        );
        let added = insert_sorted(&mut self.adjacency[from], to);
        if !self.directed && from != to {
            insert_sorted(&mut self.adjacency[to], from);
        }
        added
    }

    /// Remove the edge `from → to`; returns whether it existed.
    pub fn remove_edge(&mut self, from: usize, to: usize) -> bool {
        if from >= self.num_nodes() || to >= self.num_nodes() {
            return false;
        }
        let removed = remove_sorted(&mut self.adjacency[from], to);
        if !self.directed && from != to {
            remove_sorted(&mut self.adjacency[to], from);
        }
        removed
    }

    pub fn has_edge(&self, from: usize, to: usize) -> bool {
        self.adjacency
            .get(from)
            .is_some_and(|n| n.binary_search(&to).is_ok())
    }

    /// Sorted neighbours of `node`; empty for an out-of-range node.
    pub fn neighbors(&self, node: usize) -> &[usize] {
        self.adjacency.get(node).map_or(&[], Vec::as_slice)
    }

    pub fn degree(&self, node: usize) -> usize {
        self.neighbors(node).len()
    }

    /// Drop every edge leaving `node` (and, for undirected graphs, entering it).
    pub fn clear_node(&mut self, node: usize) {
        if node >= self.num_nodes() {
            return;
        }
        let old = std::mem::take(&mut self.adjacency[node]);
        if !self.directed {
            for n in old {
                if n != node {
                    remove_sorted(&mut self.adjacency[n], node);
                }
            }
        }
    }
}

fn insert_sorted(list: &mut Vec<usize>, value: usize) -> bool {
    match list.binary_search(&value) {
        Ok(_) => false,
        Err(at) => {
            list.insert(at, value);
            true
        }
    }
}

fn remove_sorted(list: &mut Vec<usize>, value: usize) -> bool {
    match list.binary_search(&value) {
        Ok(at) => {
            list.remove(at);
            true
        }
        Err(_) => false,
    }
}
