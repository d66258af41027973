//! Schelling model of spatial segregation.
//!
//! Agents of two groups live in the unit square. Each iteration, every agent
//! looks at its nearest neighbors; agents whose same-group fraction falls
//! below the satisfaction threshold move to a new free position. A run
//! returns one [`Snapshot`] per iteration boundary, starting with the
//! initial placement.
//!
//! ```no_run
//! let snapshots = segregate::simulate_seeded(100, 5, 0.8, 10, 42)?;
//! assert_eq!(snapshots.len(), 11);
//! let payload = serde_json::to_string(&snapshots)?; // [[[x, y, type], ...], ...]
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod happiness;
pub mod model;
pub mod relocation;
pub mod snapshot;
pub mod space;
pub mod stats;

pub use config::Config;
pub use engine::Engine;
pub use error::{SimError, SimResult};
pub use model::{AgentId, Group, Point};
pub use snapshot::{Snapshot, Triple};

/// Run one simulation with a fresh random seed.
pub fn simulate(
    agent_count: usize,
    neighborhood_size: usize,
    satisfaction_threshold: f64,
    iteration_count: usize,
) -> SimResult<Vec<Snapshot>> {
    run(&Config::new(
        agent_count,
        neighborhood_size,
        satisfaction_threshold,
        iteration_count,
    ))
}

/// Run one reproducible simulation.
pub fn simulate_seeded(
    agent_count: usize,
    neighborhood_size: usize,
    satisfaction_threshold: f64,
    iteration_count: usize,
    seed: u64,
) -> SimResult<Vec<Snapshot>> {
    let cfg = Config::new(
        agent_count,
        neighborhood_size,
        satisfaction_threshold,
        iteration_count,
    )
    .with_seed(seed);
    run(&cfg)
}

/// Run one simulation with a full configuration.
///
/// # Errors
/// [`SimError::Configuration`] if `cfg` is invalid, [`SimError::PlacementExhausted`]
/// if an agent cannot be placed. No partial sequence is ever returned.
pub fn run(cfg: &Config) -> SimResult<Vec<Snapshot>> {
    Engine::new(cfg.clone())?.perform_simulation()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::happiness::Rule;
    use crate::space::LinearScan;
    use std::thread;

    fn unsatisfied_fraction(snapshot: &Snapshot, rule: Rule) -> f64 {
        let index = LinearScan::new(snapshot.positions());
        let n_unsatisfied = rule.unsatisfied(&index, &snapshot.groups()).unwrap().len();
        n_unsatisfied as f64 / snapshot.len() as f64
    }

    #[test]
    fn sequence_shape_and_group_conservation() {
        let snapshots = simulate_seeded(100, 5, 0.8, 10, 17).unwrap();
        assert_eq!(snapshots.len(), 11);
        let counts = snapshots[0].group_counts();
        for snapshot in &snapshots {
            assert_eq!(snapshot.len(), 100);
            assert_eq!(snapshot.group_counts(), counts);
            assert_eq!(snapshot.groups(), snapshots[0].groups());
        }
    }

    #[test]
    fn small_run_without_iterations() {
        let snapshots = simulate_seeded(4, 1, 0.5, 0, 23).unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].len(), 4);
        assert_eq!(snapshots[0].group_counts(), (2, 2));

        let again = simulate_seeded(4, 1, 0.5, 0, 23).unwrap();
        assert_eq!(again[0].groups(), snapshots[0].groups());
    }

    #[test]
    fn same_seed_same_history() {
        let a = simulate_seeded(80, 6, 0.6, 8, 99).unwrap();
        let b = simulate_seeded(80, 6, 0.6, 8, 99).unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());

        let c = simulate_seeded(80, 6, 0.6, 8, 100).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn neighborhood_bounds() {
        assert!(simulate_seeded(10, 9, 0.5, 1, 1).is_ok());
        let err = simulate_seeded(10, 10, 0.5, 1, 1).unwrap_err();
        assert!(matches!(
            err,
            SimError::Configuration {
                field: "neighborhood_size",
                ..
            }
        ));
    }

    #[test]
    fn unseeded_runs_keep_their_shape() {
        let snapshots = simulate(30, 3, 0.5, 2).unwrap();
        assert_eq!(snapshots.len(), 3);
        assert!(snapshots.iter().all(|snapshot| snapshot.len() == 30));
    }

    #[test]
    fn tree_index_reproduces_scan_history() {
        let mut cfg = Config::new(120, 5, 0.7, 4).with_seed(4);
        cfg.run.index = space::IndexKind::Scan;
        let scan = run(&cfg).unwrap();
        cfg.run.index = space::IndexKind::Tree;
        let tree = run(&cfg).unwrap();
        assert_eq!(scan, tree);
    }

    #[test]
    fn concurrent_runs_are_independent() {
        let handles: Vec<_> = (0..4)
            .map(|seed| thread::spawn(move || simulate_seeded(50, 4, 0.5, 3, seed)))
            .collect();
        for (seed, handle) in handles.into_iter().enumerate() {
            let snapshots = handle.join().unwrap().unwrap();
            assert_eq!(snapshots, simulate_seeded(50, 4, 0.5, 3, seed as u64).unwrap());
        }
    }

    /// Summed unsatisfied fraction of the first and last snapshot over 40 seeds.
    fn dissatisfaction_over_seeds(base: &Config) -> (f64, f64) {
        let rule = Rule {
            n_neighbors: base.model.n_neighbors,
            threshold: base.model.threshold,
        };
        let (mut initial, mut last) = (0.0, 0.0);
        for seed in 0..40 {
            let snapshots = run(&base.clone().with_seed(seed)).unwrap();
            initial += unsatisfied_fraction(&snapshots[0], rule);
            last += unsatisfied_fraction(snapshots.last().unwrap(), rule);
        }
        (initial, last)
    }

    #[test]
    fn dissatisfaction_drops_on_average() {
        let (initial, last) = dissatisfaction_over_seeds(&Config::new(100, 5, 0.5, 10));
        assert!(last < initial, "initial {initial}, last {last}");

        let mut cfg = Config::new(100, 5, 0.8, 10);
        let (initial, last) = dissatisfaction_over_seeds(&cfg);
        assert!(last < initial, "initial {initial}, last {last}");

        cfg.model.relocation = relocation::Relocation::Seeking;
        let (initial, last) = dissatisfaction_over_seeds(&cfg);
        assert!(last < initial, "initial {initial}, last {last}");
    }
}
