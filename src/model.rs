use crate::error::{SimError, SimResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable index of an agent in its population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub usize);

impl AgentId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Position in the unit square.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance. Orders points exactly like the true distance.
    pub fn distance_2(self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Bit pattern of both coordinates, for exact collision checks.
    pub fn key(self) -> (u64, u64) {
        (self.x.to_bits(), self.y.to_bits())
    }
}

/// One of the two agent categories.
///
/// Serialized as a boolean only at the snapshot boundary (`B` is `true`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Group {
    A,
    B,
}

impl Group {
    pub fn as_bool(self) -> bool {
        matches!(self, Group::B)
    }

    pub fn from_bool(flag: bool) -> Self {
        if flag { Group::B } else { Group::A }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pos: Point,
    group: Group,
}

impl Agent {
    pub fn new(pos: Point, group: Group) -> Self {
        Self { pos, group }
    }

    pub fn pos(&self) -> Point {
        self.pos
    }

    pub fn group(&self) -> Group {
        self.group
    }
}

/// Fixed-size collection of agents, indexed by [`AgentId`].
///
/// Positions change only through [`Population::apply_moves`]; agents are
/// never added or removed after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    agt_vec: Vec<Agent>,
    n_group_a: usize,
}

impl Population {
    pub fn new(agt_vec: Vec<Agent>) -> Self {
        let n_group_a = count_group_a(&agt_vec);
        Self { agt_vec, n_group_a }
    }

    pub fn len(&self) -> usize {
        self.agt_vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agt_vec.is_empty()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agt_vec
    }

    pub fn positions(&self) -> Vec<Point> {
        self.agt_vec.iter().map(Agent::pos).collect()
    }

    pub fn groups(&self) -> Vec<Group> {
        self.agt_vec.iter().map(Agent::group).collect()
    }

    /// Number of agents in group `A`, as counted at construction.
    pub fn n_group_a(&self) -> usize {
        self.n_group_a
    }

    /// Apply a batch of relocations at once.
    pub fn apply_moves(&mut self, moves: &[(AgentId, Point)]) -> SimResult<()> {
        for &(id, pos) in moves {
            let agt = self.agt_vec.get_mut(id.index()).ok_or_else(|| {
                SimError::InvariantViolation(format!("relocation for unknown agent {id}"))
            })?;
            agt.pos = pos;
        }
        Ok(())
    }

    /// Check that the population still has `n_agents` agents and the group split it was built with.
    pub fn check_invariants(&self, n_agents: usize) -> SimResult<()> {
        let len = self.agt_vec.len();
        if len != n_agents {
            return Err(SimError::InvariantViolation(format!(
                "population has {len} agents, expected {n_agents}"
            )));
        }
        let n_group_a = count_group_a(&self.agt_vec);
        if n_group_a != self.n_group_a {
            return Err(SimError::InvariantViolation(format!(
                "group A has {n_group_a} agents, expected {}",
                self.n_group_a
            )));
        }
        Ok(())
    }
}

fn count_group_a(agt_vec: &[Agent]) -> usize {
    agt_vec.iter().filter(|agt| agt.group == Group::A).count()
}
