use crate::error::{SimError, SimResult};
use crate::happiness::Rule;
use crate::model::{AgentId, Group, Point};
use crate::space::NeighborIndex;
use rand::prelude::*;
use rand_distr::Uniform;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How an unsatisfied agent picks its new position.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relocation {
    /// Any free position, uniformly at random.
    #[default]
    Uniform,
    /// Free positions are drawn uniformly until one would satisfy the agent.
    Seeking,
}

/// Sampler over the unit square, optionally snapped to lattice cell centers.
#[derive(Debug, Clone)]
pub enum Domain {
    Continuous(Uniform<f64>),
    Lattice { cell_dist: Uniform<u32>, size: u32 },
}

impl Domain {
    pub fn new(lattice: Option<u32>) -> SimResult<Self> {
        match lattice {
            None => {
                let dist = Uniform::new(0.0, 1.0)
                    .map_err(|err| SimError::InvariantViolation(err.to_string()))?;
                Ok(Self::Continuous(dist))
            }
            Some(size) => {
                let cell_dist = Uniform::new(0, size)
                    .map_err(|err| SimError::config("lattice", err.to_string()))?;
                Ok(Self::Lattice { cell_dist, size })
            }
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Point {
        match self {
            Self::Continuous(dist) => Point::new(dist.sample(rng), dist.sample(rng)),
            Self::Lattice { cell_dist, size } => Point::new(
                cell_center(cell_dist.sample(rng), *size),
                cell_center(cell_dist.sample(rng), *size),
            ),
        }
    }

    /// Draw `n_points` pairwise distinct positions.
    ///
    /// Lattice cells are drawn without replacement, so any count up to the
    /// number of cells succeeds. Continuous draws go through a [`Placer`].
    pub fn sample_distinct<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        n_points: usize,
        max_attempts: usize,
    ) -> SimResult<Vec<Point>> {
        match self {
            Self::Continuous(_) => {
                let mut placer = Placer::new(self, max_attempts, Vec::new());
                (0..n_points)
                    .map(|i_pnt| placer.place(rng, AgentId(i_pnt), |_| Ok(true)))
                    .collect()
            }
            Self::Lattice { size, .. } => {
                let side = *size as usize;
                let n_cells = side * side;
                if n_points > n_cells {
                    return Err(SimError::config(
                        "lattice",
                        format!("{n_cells} cells cannot hold {n_points} agents"),
                    ));
                }
                let pos_vec = rand::seq::index::sample(rng, n_cells, n_points)
                    .into_iter()
                    .map(|cell| {
                        Point::new(
                            cell_center((cell % side) as u32, *size),
                            cell_center((cell / side) as u32, *size),
                        )
                    })
                    .collect();
                Ok(pos_vec)
            }
        }
    }
}

fn cell_center(cell: u32, size: u32) -> f64 {
    (cell as f64 + 0.5) / size as f64
}

/// Draws positions that do not coincide with any occupied one.
///
/// Every accepted position becomes occupied for later draws.
pub struct Placer<'a> {
    domain: &'a Domain,
    max_attempts: usize,
    occupied: HashSet<(u64, u64)>,
}

impl<'a> Placer<'a> {
    pub fn new(
        domain: &'a Domain,
        max_attempts: usize,
        occupied: impl IntoIterator<Item = Point>,
    ) -> Self {
        let occupied = occupied.into_iter().map(Point::key).collect();
        Self {
            domain,
            max_attempts,
            occupied,
        }
    }

    /// Draw a free position for agent `id` that `accept` approves of.
    ///
    /// # Errors
    /// Returns [`SimError::PlacementExhausted`] after `max_attempts` draws,
    /// or any error raised by `accept`.
    pub fn place<R, F>(&mut self, rng: &mut R, id: AgentId, mut accept: F) -> SimResult<Point>
    where
        R: Rng + ?Sized,
        F: FnMut(Point) -> SimResult<bool>,
    {
        for _ in 0..self.max_attempts {
            let pos = self.domain.sample(rng);
            if self.occupied.contains(&pos.key()) {
                continue;
            }
            if accept(pos)? {
                self.occupied.insert(pos.key());
                return Ok(pos);
            }
        }
        log::warn!(
            "no position found for agent {id} in {} attempts",
            self.max_attempts
        );
        Err(SimError::PlacementExhausted {
            agent: id,
            attempts: self.max_attempts,
        })
    }
}

/// Relocation phase of one iteration.
pub struct Relocator {
    pub policy: Relocation,
    pub domain: Domain,
    pub max_attempts: usize,
    pub rule: Rule,
}

impl Relocator {
    /// Choose new positions for the `unsatisfied` agents.
    ///
    /// Decisions are made against the frozen positions in `index`; nothing is
    /// applied here, so every mover sees the same neighborhood state.
    pub fn relocate<R: Rng + ?Sized>(
        &self,
        index: &dyn NeighborIndex,
        groups: &[Group],
        unsatisfied: &[AgentId],
        rng: &mut R,
    ) -> SimResult<Vec<(AgentId, Point)>> {
        let occupied = (0..index.len()).map(|i_agt| index.position(AgentId(i_agt)));
        let mut placer = Placer::new(&self.domain, self.max_attempts, occupied);

        let mut moves = Vec::with_capacity(unsatisfied.len());
        for &id in unsatisfied {
            let pos = match self.policy {
                Relocation::Uniform => placer.place(rng, id, |_| Ok(true))?,
                Relocation::Seeking => placer.place(rng, id, |pos| {
                    self.rule.satisfied_at(index, groups, id, pos)
                })?,
            };
            moves.push((id, pos));
        }
        Ok(moves)
    }
}
