use crate::config::Config;
use crate::error::{SimError, SimResult};
use crate::happiness::Rule;
use crate::model::{Agent, Group, Population};
use crate::relocation::{Domain, Relocator};
use crate::snapshot::Snapshot;
use crate::space;
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;

/// Lifecycle of an [`Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Configured, population not placed yet.
    Initializing,
    /// Initial snapshot recorded, iterations remaining.
    Stepping,
    /// All iterations done; snapshots can be taken out.
    Complete,
}

/// Simulation engine.
///
/// Holds the configuration, population, and random number generator of a
/// single run, and records one snapshot per iteration boundary.
pub struct Engine {
    cfg: Config,
    seed: u64,
    rng: ChaCha12Rng,
    relocator: Relocator,
    phase: Phase,
    groups: Vec<Group>,
    population: Population,
    snapshots: Vec<Snapshot>,
    n_steps: usize,
    settled: bool,
}

impl Engine {
    /// Validate `cfg` and seed the engine. A missing seed is drawn from the OS.
    pub fn new(cfg: Config) -> SimResult<Self> {
        cfg.validate()?;

        let seed = cfg.run.seed.unwrap_or_else(|| rand::rng().random());
        let rng = ChaCha12Rng::seed_from_u64(seed);

        let relocator = Relocator {
            policy: cfg.model.relocation,
            domain: Domain::new(cfg.model.lattice)?,
            max_attempts: cfg.model.max_attempts,
            rule: Rule {
                n_neighbors: cfg.model.n_neighbors,
                threshold: cfg.model.threshold,
            },
        };

        let snapshots = Vec::with_capacity(cfg.run.n_iterations + 1);

        Ok(Self {
            cfg,
            seed,
            rng,
            relocator,
            phase: Phase::Initializing,
            groups: Vec::new(),
            population: Population::new(Vec::new()),
            snapshots,
            n_steps: 0,
            settled: false,
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Place the population and record the initial snapshot.
    ///
    /// Groups are an exact partition: `round(n_agents * share_a)` agents of
    /// group `A`, shuffled over identities.
    pub fn generate_initial_condition(&mut self) -> SimResult<()> {
        self.expect_phase(Phase::Initializing)?;

        let n_agents = self.cfg.model.n_agents;
        let n_group_a = (n_agents as f64 * self.cfg.model.share_a).round() as usize;

        let mut groups: Vec<_> = (0..n_agents)
            .map(|i_agt| if i_agt < n_group_a { Group::A } else { Group::B })
            .collect();
        groups.shuffle(&mut self.rng);

        let pos_vec = self.relocator.domain.sample_distinct(
            &mut self.rng,
            n_agents,
            self.cfg.model.max_attempts,
        )?;
        let agt_vec = pos_vec
            .into_iter()
            .zip(&groups)
            .map(|(pos, &group)| Agent::new(pos, group))
            .collect();

        self.population = Population::new(agt_vec);
        self.groups = groups;
        self.population.check_invariants(n_agents)?;
        self.snapshots.push(Snapshot::capture(&self.population));

        log::info!(
            "placed {n_agents} agents ({n_group_a} A, {} B) with seed {}",
            n_agents - n_group_a,
            self.seed
        );

        self.phase = if self.cfg.run.n_iterations == 0 {
            Phase::Complete
        } else {
            Phase::Stepping
        };
        Ok(())
    }

    /// Advance the population by one iteration and record its snapshot.
    ///
    /// Returns the number of agents that were unsatisfied (and moved).
    pub fn perform_step(&mut self) -> SimResult<usize> {
        self.expect_phase(Phase::Stepping)?;

        // Evaluate and choose moves on frozen positions, then apply all at once.
        let index = space::build_index(self.cfg.run.index, self.population.positions());
        let unsatisfied = self
            .relocator
            .rule
            .unsatisfied(index.as_ref(), &self.groups)?;
        let moves =
            self.relocator
                .relocate(index.as_ref(), &self.groups, &unsatisfied, &mut self.rng)?;

        self.population.apply_moves(&moves)?;
        self.population.check_invariants(self.cfg.model.n_agents)?;
        self.snapshots.push(Snapshot::capture(&self.population));
        self.n_steps += 1;

        log::debug!(
            "iteration {}: {} unsatisfied agents",
            self.n_steps,
            unsatisfied.len()
        );
        if unsatisfied.is_empty() && !self.settled {
            log::info!("all agents satisfied at iteration {}", self.n_steps);
            self.settled = true;
        }

        if self.n_steps == self.cfg.run.n_iterations {
            self.phase = Phase::Complete;
        }
        Ok(unsatisfied.len())
    }

    /// Run all remaining phases and return the snapshot sequence.
    ///
    /// The sequence starts with the initial placement, so it holds
    /// `n_iterations + 1` snapshots.
    pub fn perform_simulation(mut self) -> SimResult<Vec<Snapshot>> {
        if self.phase == Phase::Initializing {
            self.generate_initial_condition()?;
        }
        while self.phase == Phase::Stepping {
            self.perform_step()?;
        }
        self.into_snapshots()
    }

    /// Take the snapshot sequence out of a completed engine.
    pub fn into_snapshots(self) -> SimResult<Vec<Snapshot>> {
        self.expect_phase(Phase::Complete)?;
        let expected = self.cfg.run.n_iterations + 1;
        if self.snapshots.len() != expected {
            return Err(SimError::InvariantViolation(format!(
                "recorded {} snapshots, expected {expected}",
                self.snapshots.len()
            )));
        }
        Ok(self.snapshots)
    }

    fn expect_phase(&self, phase: Phase) -> SimResult<()> {
        if self.phase != phase {
            return Err(SimError::InvariantViolation(format!(
                "engine is {:?}, expected {phase:?}",
                self.phase
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::happiness::same_type_fraction;
    use crate::model::AgentId;
    use crate::space::{LinearScan, NeighborIndex};

    fn engine(cfg: Config) -> Engine {
        Engine::new(cfg).unwrap()
    }

    #[test]
    fn phases_advance_in_order() {
        let mut eng = engine(Config::new(20, 3, 0.5, 2).with_seed(1));
        assert_eq!(eng.phase(), Phase::Initializing);
        assert!(matches!(eng.perform_step(), Err(SimError::InvariantViolation(_))));

        eng.generate_initial_condition().unwrap();
        assert_eq!(eng.phase(), Phase::Stepping);
        assert!(eng.generate_initial_condition().is_err());

        eng.perform_step().unwrap();
        eng.perform_step().unwrap();
        assert_eq!(eng.phase(), Phase::Complete);
        assert!(eng.perform_step().is_err());

        assert_eq!(eng.into_snapshots().unwrap().len(), 3);
    }

    #[test]
    fn zero_iterations_complete_after_placement() {
        let mut eng = engine(Config::new(4, 1, 0.5, 0).with_seed(9));
        eng.generate_initial_condition().unwrap();
        assert_eq!(eng.phase(), Phase::Complete);
        assert_eq!(eng.snapshots().len(), 1);
    }

    #[test]
    fn groups_are_an_exact_partition() {
        let mut cfg = Config::new(10, 2, 0.5, 0).with_seed(5);
        cfg.model.share_a = 0.3;
        let snapshots = engine(cfg).perform_simulation().unwrap();
        assert_eq!(snapshots[0].group_counts(), (3, 7));
    }

    #[test]
    fn initial_positions_are_distinct() {
        let mut cfg = Config::new(16, 3, 0.5, 0).with_seed(2);
        cfg.model.lattice = Some(4);
        let snapshots = engine(cfg).perform_simulation().unwrap();
        let mut keys: Vec<_> = snapshots[0].positions().iter().map(|pos| pos.key()).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), 16);
    }

    #[test]
    fn full_lattice_is_placed_for_every_seed() {
        for seed in 0..10 {
            let mut cfg = Config::new(10_000, 1, 0.0, 0).with_seed(seed);
            cfg.model.lattice = Some(100);
            let snapshots = engine(cfg).perform_simulation().unwrap();
            let mut keys: Vec<_> = snapshots[0].positions().iter().map(|pos| pos.key()).collect();
            keys.sort_unstable();
            keys.dedup();
            assert_eq!(keys.len(), 10_000, "seed {seed}");
        }
    }

    #[test]
    fn full_threshold_moves_exactly_the_mixed_neighborhoods() {
        let k = 4;
        let mut eng = engine(Config::new(60, k, 1.0, 1).with_seed(11));
        eng.generate_initial_condition().unwrap();
        let before = eng.snapshots()[0].clone();

        let n_moved = eng.perform_step().unwrap();
        let after = &eng.snapshots()[1];

        let groups = before.groups();
        let index = LinearScan::new(before.positions());
        let mut n_mixed = 0;
        for i_agt in 0..before.len() {
            let id = AgentId(i_agt);
            let neighbors = index.nearest(id, k).unwrap();
            let mixed = same_type_fraction(groups[i_agt], &neighbors, &groups) < 1.0;
            let moved = before.sites()[i_agt].pos != after.sites()[i_agt].pos;
            assert_eq!(mixed, moved, "agent {i_agt}");
            n_mixed += mixed as usize;
        }
        assert!(n_mixed > 0);
        assert_eq!(n_moved, n_mixed);
    }

    #[test]
    fn zero_threshold_never_moves_anyone() {
        let snapshots = engine(Config::new(50, 5, 0.0, 5).with_seed(3))
            .perform_simulation()
            .unwrap();
        for snapshot in &snapshots[1..] {
            assert_eq!(snapshot, &snapshots[0]);
        }
    }

    #[test]
    fn saturated_lattice_aborts_the_run() {
        let mut cfg = Config::new(4, 3, 1.0, 3).with_seed(8);
        cfg.model.lattice = Some(2);
        cfg.model.max_attempts = 200;
        let err = engine(cfg).perform_simulation().unwrap_err();
        assert!(matches!(err, SimError::PlacementExhausted { attempts: 200, .. }));
    }
}
