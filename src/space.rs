//! Nearest-neighbor queries over agent positions.
//!
//! An index is built from a frozen copy of the positions at the start of an
//! iteration and never mutated. Every query orders agents by squared
//! Euclidean distance and breaks ties by ascending [`AgentId`], so all
//! implementations return identical lists.

use crate::error::{SimError, SimResult};
use crate::model::{AgentId, Point};
use rstar::{RTree, primitives::GeomWithData};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Population size from which [`IndexKind::Auto`] switches to the R-tree.
pub const AUTO_TREE_MIN_AGENTS: usize = 512;

/// Which [`NeighborIndex`] implementation a run uses.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    #[default]
    Auto,
    Scan,
    Tree,
}

pub trait NeighborIndex: Sync {
    /// Number of indexed agents.
    fn len(&self) -> usize;

    /// Indexed position of agent `id`.
    fn position(&self, id: AgentId) -> Point;

    /// The `k` agents nearest to `point`, nearest first, never including `exclude`.
    ///
    /// # Errors
    /// Returns [`SimError::Configuration`] if `k` is not smaller than [`len`](Self::len).
    fn nearest_to(&self, point: Point, exclude: AgentId, k: usize) -> SimResult<Vec<AgentId>>;

    /// The `k` nearest other agents of agent `id`.
    fn nearest(&self, id: AgentId, k: usize) -> SimResult<Vec<AgentId>> {
        self.nearest_to(self.position(id), id, k)
    }
}

/// Build the index selected by `kind` over `pos_vec`.
pub fn build_index(kind: IndexKind, pos_vec: Vec<Point>) -> Box<dyn NeighborIndex> {
    let use_tree = match kind {
        IndexKind::Auto => pos_vec.len() >= AUTO_TREE_MIN_AGENTS,
        IndexKind::Scan => false,
        IndexKind::Tree => true,
    };
    if use_tree {
        Box::new(TreeIndex::new(pos_vec))
    } else {
        Box::new(LinearScan::new(pos_vec))
    }
}

/// Brute-force index: every query scans all positions.
pub struct LinearScan {
    pos_vec: Vec<Point>,
}

impl LinearScan {
    pub fn new(pos_vec: Vec<Point>) -> Self {
        Self { pos_vec }
    }
}

impl NeighborIndex for LinearScan {
    fn len(&self) -> usize {
        self.pos_vec.len()
    }

    fn position(&self, id: AgentId) -> Point {
        self.pos_vec[id.index()]
    }

    fn nearest_to(&self, point: Point, exclude: AgentId, k: usize) -> SimResult<Vec<AgentId>> {
        check_k(k, self.pos_vec.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut cand_vec: Vec<_> = self
            .pos_vec
            .iter()
            .enumerate()
            .filter(|&(i_agt, _)| i_agt != exclude.index())
            .map(|(i_agt, &pos)| (point.distance_2(pos), AgentId(i_agt)))
            .collect();

        if k < cand_vec.len() {
            cand_vec.select_nth_unstable_by(k - 1, cmp_candidates);
            cand_vec.truncate(k);
        }
        cand_vec.sort_unstable_by(cmp_candidates);

        Ok(cand_vec.into_iter().map(|(_, id)| id).collect())
    }
}

type TreeEntry = GeomWithData<[f64; 2], AgentId>;

/// R-tree backed index for large populations.
pub struct TreeIndex {
    pos_vec: Vec<Point>,
    tree: RTree<TreeEntry>,
}

impl TreeIndex {
    pub fn new(pos_vec: Vec<Point>) -> Self {
        let entries = pos_vec
            .iter()
            .enumerate()
            .map(|(i_agt, pos)| TreeEntry::new([pos.x, pos.y], AgentId(i_agt)))
            .collect();
        let tree = RTree::bulk_load(entries);
        Self { pos_vec, tree }
    }
}

impl NeighborIndex for TreeIndex {
    fn len(&self) -> usize {
        self.pos_vec.len()
    }

    fn position(&self, id: AgentId) -> Point {
        self.pos_vec[id.index()]
    }

    fn nearest_to(&self, point: Point, exclude: AgentId, k: usize) -> SimResult<Vec<AgentId>> {
        check_k(k, self.pos_vec.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }

        // Keep pulling past the k-th candidate while distances tie with it,
        // so the identity tie-break sees every equidistant agent.
        let mut cand_vec = Vec::with_capacity(k + 1);
        let mut cutoff = None;
        for (entry, dist_2) in self
            .tree
            .nearest_neighbor_iter_with_distance_2(&[point.x, point.y])
        {
            if entry.data == exclude {
                continue;
            }
            if cutoff.is_some_and(|cutoff| dist_2 > cutoff) {
                break;
            }
            cand_vec.push((point.distance_2(self.position(entry.data)), entry.data));
            if cand_vec.len() == k {
                cutoff = Some(dist_2);
            }
        }

        cand_vec.sort_unstable_by(cmp_candidates);
        cand_vec.truncate(k);

        Ok(cand_vec.into_iter().map(|(_, id)| id).collect())
    }
}

fn cmp_candidates(a: &(f64, AgentId), b: &(f64, AgentId)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}

fn check_k(k: usize, n_agents: usize) -> SimResult<()> {
    if k >= n_agents {
        return Err(SimError::config(
            "neighborhood_size",
            format!("must be less than the number of agents ({n_agents}), but is {k}"),
        ));
    }
    Ok(())
}
