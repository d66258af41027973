use anyhow::{Context, Result};
use glob::glob;
use rmp_serde::encode;
use segregate::{
    Config, Engine, Snapshot,
    analysis::{self, Analyzer},
};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

/// Seed a run was started with, stored next to its trajectory.
#[derive(Debug, Serialize, Deserialize)]
struct RunInfo {
    seed: u64,
}

pub struct Manager {
    sim_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { sim_dir, cfg })
    }

    /// Run a new simulation into the next free run directory.
    ///
    /// `seed` takes precedence over the seed in the config file. The run
    /// directory is only created once the simulation has succeeded, and is
    /// removed again if writing its files fails.
    pub fn create_run(&self, seed: Option<u64>) -> Result<()> {
        let run_idx = self.count_run_dirs().context("failed to count run dirs")?;

        let mut cfg = self.cfg.clone();
        if seed.is_some() {
            cfg.run.seed = seed;
        }
        let engine = Engine::new(cfg).context("failed to construct engine")?;
        let seed = engine.seed();

        let snapshots = engine
            .perform_simulation()
            .with_context(|| format!("failed to perform simulation with seed {seed}"))?;

        let run_dir = self.run_dir(run_idx);
        if let Err(error) = self.save_run(run_idx, seed, &snapshots) {
            if let Err(rm_error) = fs::remove_dir_all(&run_dir) {
                log::warn!("failed to remove {run_dir:?}: {rm_error}");
            }
            return Err(error);
        }

        Ok(())
    }

    fn save_run(&self, run_idx: usize, seed: u64, snapshots: &[Snapshot]) -> Result<()> {
        let run_dir = self.run_dir(run_idx);
        fs::create_dir_all(&run_dir).with_context(|| format!("failed to create {run_dir:?}"))?;
        log::info!("created {run_dir:?}");

        let info_file = self.info_file(run_idx);
        let info = toml::to_string(&RunInfo { seed }).context("failed to serialize run info")?;
        fs::write(&info_file, info).with_context(|| format!("failed to write {info_file:?}"))?;

        let trajectory_file = self.trajectory_file(run_idx);
        let file = File::create(&trajectory_file)
            .with_context(|| format!("failed to create {trajectory_file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, snapshots).context("failed to serialize snapshots")?;
        writer.flush().context("failed to flush writer stream")?;
        log::info!("saved {} snapshots to {trajectory_file:?}", snapshots.len());

        Ok(())
    }

    /// Convert a stored trajectory into the JSON shape consumed by renderers.
    pub fn export_run(&self, run_idx: usize) -> Result<()> {
        let snapshots = analysis::read_trajectory(self.trajectory_file(run_idx))
            .with_context(|| format!("failed to read trajectory of run {run_idx}"))?;

        let export_file = self.export_file(run_idx);
        analysis::save_json(&export_file, &snapshots)?;
        log::info!("exported {export_file:?}");

        Ok(())
    }

    pub fn analyze_sim(&self) -> Result<()> {
        let mut analyzer = Analyzer::new(&self.cfg);

        let n_runs = self.count_run_dirs().context("failed to count run dirs")?;
        for run_idx in 0..n_runs {
            let run_report = analyzer
                .add_file(self.trajectory_file(run_idx))
                .with_context(|| format!("failed to analyze run {run_idx}"))?;
            analysis::save_json(self.results_file(run_idx), &run_report)
                .context("failed to save run results")?;
        }

        analyzer
            .save_results(self.sim_dir.join("results.json"))
            .context("failed to save results")?;
        log::info!("analyzed {n_runs} runs");

        Ok(())
    }

    /// Remove analysis results and JSON exports, keeping trajectories.
    pub fn clean_sim(&self) -> Result<()> {
        let patterns = [
            self.sim_dir.join("results.json"),
            self.sim_dir.join("run-*").join("results.json"),
            self.sim_dir.join("run-*").join("snapshots.json"),
        ];
        for pattern in patterns {
            let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
            for file in glob(pattern).context("failed to glob output files")? {
                let file = file.context("failed to read glob entry")?;
                fs::remove_file(&file).with_context(|| format!("failed to remove {file:?}"))?;
                log::info!("removed {file:?}");
            }
        }
        Ok(())
    }

    fn count_run_dirs(&self) -> Result<usize> {
        let pattern = self.sim_dir.join("run-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let count = glob(pattern)
            .context("failed to glob run dirs")?
            .filter_map(Result::ok)
            .filter(|p| p.is_dir())
            .count();
        Ok(count)
    }

    fn run_dir(&self, run_idx: usize) -> PathBuf {
        self.sim_dir.join(format!("run-{run_idx:04}"))
    }

    fn info_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("seed.toml")
    }

    fn trajectory_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("trajectory.msgpack")
    }

    fn export_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("snapshots.json")
    }

    fn results_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("results.json")
    }
}
