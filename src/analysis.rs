use crate::config::Config;
use crate::error::SimResult;
use crate::happiness::Rule;
use crate::snapshot::Snapshot;
use crate::space;
use crate::stats::SeriesAccumulator;
use anyhow::{Context, Result};
use rmp_serde::decode;
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

/// Scalar observable of a single snapshot.
pub trait Obs {
    fn name(&self) -> &'static str;
    fn measure(&self, snapshot: &Snapshot) -> SimResult<f64>;
}

/// Fraction of agents below the satisfaction threshold.
pub struct UnsatisfiedFraction {
    rule: Rule,
    index: space::IndexKind,
}

impl Obs for UnsatisfiedFraction {
    fn name(&self) -> &'static str {
        "unsatisfied_fraction"
    }

    fn measure(&self, snapshot: &Snapshot) -> SimResult<f64> {
        let index = space::build_index(self.index, snapshot.positions());
        let unsatisfied = self.rule.unsatisfied(index.as_ref(), &snapshot.groups())?;
        Ok(unsatisfied.len() as f64 / snapshot.len() as f64)
    }
}

/// Mean same-type fraction over all agents (0.5 is well mixed, 1.0 fully segregated).
pub struct SegregationIndex {
    rule: Rule,
    index: space::IndexKind,
}

impl Obs for SegregationIndex {
    fn name(&self) -> &'static str {
        "segregation_index"
    }

    fn measure(&self, snapshot: &Snapshot) -> SimResult<f64> {
        let index = space::build_index(self.index, snapshot.positions());
        let fractions = self.rule.fractions(index.as_ref(), &snapshot.groups())?;
        Ok(fractions.iter().sum::<f64>() / fractions.len() as f64)
    }
}

/// Computes observables per iteration for each run and across runs.
pub struct Analyzer {
    obs_vec: Vec<(Box<dyn Obs>, SeriesAccumulator)>,
    n_runs: usize,
}

impl Analyzer {
    pub fn new(cfg: &Config) -> Self {
        let rule = Rule {
            n_neighbors: cfg.model.n_neighbors,
            threshold: cfg.model.threshold,
        };
        let index = cfg.run.index;
        let obs_ptr_vec: Vec<Box<dyn Obs>> = vec![
            Box::new(UnsatisfiedFraction { rule, index }),
            Box::new(SegregationIndex { rule, index }),
        ];
        let obs_vec = obs_ptr_vec
            .into_iter()
            .map(|obs| (obs, SeriesAccumulator::new()))
            .collect();
        Self { obs_vec, n_runs: 0 }
    }

    /// Measure every observable on every snapshot of one run.
    ///
    /// Returns the per-run series as JSON and folds them into the cross-run statistics.
    pub fn add_run(&mut self, snapshots: &[Snapshot]) -> SimResult<serde_json::Value> {
        let mut run_report = serde_json::Map::new();
        for (obs, series_acc) in &mut self.obs_vec {
            let series = snapshots
                .iter()
                .map(|snapshot| obs.measure(snapshot))
                .collect::<SimResult<Vec<_>>>()?;
            series_acc.add_series(&series);
            run_report.insert(obs.name().to_string(), serde_json::json!(series));
        }
        self.n_runs += 1;
        Ok(serde_json::Value::Object(run_report))
    }

    /// Read a trajectory file written by the manager and add it as a run.
    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<serde_json::Value> {
        let snapshots = read_trajectory(file)?;
        let report = self
            .add_run(&snapshots)
            .context("failed to measure observables")?;
        Ok(report)
    }

    pub fn report(&self) -> serde_json::Value {
        let mut report = serde_json::Map::new();
        report.insert("n_runs".to_string(), serde_json::json!(self.n_runs));
        for (obs, series_acc) in &self.obs_vec {
            report.insert(obs.name().to_string(), serde_json::json!(series_acc.report()));
        }
        serde_json::Value::Object(report)
    }

    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        save_json(file, &self.report())
    }
}

pub fn read_trajectory<P: AsRef<Path>>(file: P) -> Result<Vec<Snapshot>> {
    let file = file.as_ref();
    let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
    let mut reader = BufReader::new(file);
    let snapshots = decode::from_read(&mut reader).context("failed to deserialize snapshots")?;
    Ok(snapshots)
}

pub fn save_json<P: AsRef<Path>, T: serde::Serialize + ?Sized>(file: P, value: &T) -> Result<()> {
    let file = file.as_ref();
    let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, value).context("failed to serialize JSON")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Agent, Group, Point, Population};

    fn split_population() -> Snapshot {
        let agents = (0..8)
            .map(|i| {
                let group = if i < 4 { Group::A } else { Group::B };
                let x = if i < 4 { 0.1 } else { 0.9 };
                Agent::new(Point::new(x, 0.1 + 0.1 * (i % 4) as f64), group)
            })
            .collect();
        Snapshot::capture(&Population::new(agents))
    }

    #[test]
    fn segregated_population_measures_extremes() {
        let cfg = Config::new(8, 3, 0.9, 0);
        let mut analyzer = Analyzer::new(&cfg);
        let snapshot = split_population();

        let run_report = analyzer.add_run(&[snapshot.clone(), snapshot]).unwrap();
        assert_eq!(run_report["unsatisfied_fraction"], serde_json::json!([0.0, 0.0]));
        assert_eq!(run_report["segregation_index"], serde_json::json!([1.0, 1.0]));

        let report = analyzer.report();
        assert_eq!(report["n_runs"], 1);
        assert_eq!(report["segregation_index"][1]["mean"], 1.0);
    }
}
