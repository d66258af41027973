use crate::error::SimResult;
use crate::model::{AgentId, Group, Point};
use crate::space::NeighborIndex;

/// Fraction of `neighbors` that belong to `group`.
///
/// An empty neighborhood counts as fully same-type.
pub fn same_type_fraction(group: Group, neighbors: &[AgentId], groups: &[Group]) -> f64 {
    if neighbors.is_empty() {
        return 1.0;
    }
    let n_same = neighbors
        .iter()
        .filter(|id| groups[id.index()] == group)
        .count();
    n_same as f64 / neighbors.len() as f64
}

/// Satisfaction rule parameters.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub n_neighbors: usize,
    pub threshold: f64,
}

impl Rule {
    pub fn is_satisfied(&self, fraction: f64) -> bool {
        fraction >= self.threshold
    }

    /// Same-type fraction of agent `id` at its indexed position.
    pub fn fraction_of(
        &self,
        index: &dyn NeighborIndex,
        groups: &[Group],
        id: AgentId,
    ) -> SimResult<f64> {
        let neighbors = index.nearest(id, self.n_neighbors)?;
        Ok(same_type_fraction(groups[id.index()], &neighbors, groups))
    }

    /// Whether agent `id` would be satisfied if it stood at `pos`.
    ///
    /// Its own indexed position is ignored.
    pub fn satisfied_at(
        &self,
        index: &dyn NeighborIndex,
        groups: &[Group],
        id: AgentId,
        pos: Point,
    ) -> SimResult<bool> {
        let neighbors = index.nearest_to(pos, id, self.n_neighbors)?;
        let fraction = same_type_fraction(groups[id.index()], &neighbors, groups);
        Ok(self.is_satisfied(fraction))
    }

    /// Same-type fraction of every agent, in agent order.
    pub fn fractions(&self, index: &dyn NeighborIndex, groups: &[Group]) -> SimResult<Vec<f64>> {
        #[cfg(not(feature = "parallel"))]
        {
            (0..index.len())
                .map(|i_agt| self.fraction_of(index, groups, AgentId(i_agt)))
                .collect()
        }

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;

            (0..index.len())
                .into_par_iter()
                .map(|i_agt| self.fraction_of(index, groups, AgentId(i_agt)))
                .collect()
        }
    }

    /// Identities of all unsatisfied agents, ascending.
    pub fn unsatisfied(&self, index: &dyn NeighborIndex, groups: &[Group]) -> SimResult<Vec<AgentId>> {
        let fractions = self.fractions(index, groups)?;
        Ok(fractions
            .into_iter()
            .enumerate()
            .filter(|&(_, fraction)| !self.is_satisfied(fraction))
            .map(|(i_agt, _)| AgentId(i_agt))
            .collect())
    }
}
