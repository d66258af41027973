use crate::error::{SimError, SimResult};
use crate::relocation::Relocation;
use crate::space::IndexKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub run: RunConfig,
}

/// Parameters of the segregation model itself.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of agents.
    pub n_agents: usize,
    /// Number of nearest neighbors considered by each agent.
    pub n_neighbors: usize,
    /// Minimum same-type fraction for an agent to be satisfied.
    pub threshold: f64,

    /// Fraction of agents in group `A`.
    #[serde(default = "default_share_a")]
    pub share_a: f64,

    /// Relocation policy for unsatisfied agents.
    #[serde(default)]
    pub relocation: Relocation,
    /// Random draws allowed per placement before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Side length of the position lattice (continuous positions if absent).
    #[serde(default)]
    pub lattice: Option<u32>,
}

/// Parameters of a single run.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Number of iterations after the initial placement.
    pub n_iterations: usize,
    /// Random seed (drawn from the OS if absent).
    #[serde(default)]
    pub seed: Option<u64>,
    /// Neighbor index implementation.
    #[serde(default)]
    pub index: IndexKind,
}

fn default_share_a() -> f64 {
    0.5
}

fn default_max_attempts() -> usize {
    10_000
}

impl Config {
    /// Build a [`Config`] from the four boundary parameters, with defaults for the rest.
    pub fn new(
        agent_count: usize,
        neighborhood_size: usize,
        satisfaction_threshold: f64,
        iteration_count: usize,
    ) -> Self {
        Self {
            model: ModelConfig {
                n_agents: agent_count,
                n_neighbors: neighborhood_size,
                threshold: satisfaction_threshold,
                share_a: default_share_a(),
                relocation: Relocation::default(),
                max_attempts: default_max_attempts(),
                lattice: None,
            },
            run: RunConfig {
                n_iterations: iteration_count,
                seed: None,
                index: IndexKind::default(),
            },
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.run.seed = Some(seed);
        self
    }

    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    /// Check every parameter, naming the first offending field.
    pub fn validate(&self) -> SimResult<()> {
        let model = &self.model;

        check_num("agent_count", model.n_agents, 2..)?;
        check_num("neighborhood_size", model.n_neighbors, 1..model.n_agents)?;
        check_num("satisfaction_threshold", model.threshold, 0.0..=1.0)?;
        check_num("share_a", model.share_a, 0.0..=1.0)?;
        check_num("max_attempts", model.max_attempts, 1..)?;

        if let Some(size) = model.lattice {
            check_num("lattice", size, 1..)?;
            let n_cells = size as usize * size as usize;
            if model.n_agents > n_cells {
                return Err(SimError::config(
                    "lattice",
                    format!("{n_cells} cells cannot hold {} agents", model.n_agents),
                ));
            }
        }

        Ok(())
    }
}

/// Fails for NaN as well as for out-of-range values.
fn check_num<T, R>(field: &'static str, num: T, range: R) -> SimResult<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        return Err(SimError::config(
            field,
            format!("number must be in the range {range:?}, but is {num:?}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected_field(cfg: &Config) -> &'static str {
        match cfg.validate() {
            Err(SimError::Configuration { field, .. }) => field,
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn boundary_parameters_are_validated() {
        assert!(Config::new(4, 3, 0.5, 0).validate().is_ok());
        assert!(Config::new(2, 1, 0.0, 0).validate().is_ok());
        assert!(Config::new(2, 1, 1.0, 0).validate().is_ok());

        assert_eq!(rejected_field(&Config::new(1, 1, 0.5, 1)), "agent_count");
        assert_eq!(rejected_field(&Config::new(4, 4, 0.5, 1)), "neighborhood_size");
        assert_eq!(rejected_field(&Config::new(4, 0, 0.5, 1)), "neighborhood_size");
        assert_eq!(rejected_field(&Config::new(4, 1, 1.5, 1)), "satisfaction_threshold");
        assert_eq!(rejected_field(&Config::new(4, 1, f64::NAN, 1)), "satisfaction_threshold");
    }

    #[test]
    fn lattice_must_fit_population() {
        let mut cfg = Config::new(10, 3, 0.5, 1);
        cfg.model.lattice = Some(3);
        assert_eq!(rejected_field(&cfg), "lattice");
        cfg.model.lattice = Some(4);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parses_toml_with_defaults() {
        let cfg: Config = toml::from_str(
            "[model]\n\
             n_agents = 100\n\
             n_neighbors = 5\n\
             threshold = 0.8\n\
             relocation = \"seeking\"\n\
             \n\
             [run]\n\
             n_iterations = 10\n\
             index = \"tree\"\n",
        )
        .unwrap();

        assert_eq!(cfg.model.share_a, 0.5);
        assert_eq!(cfg.model.relocation, Relocation::Seeking);
        assert_eq!(cfg.model.max_attempts, 10_000);
        assert_eq!(cfg.model.lattice, None);
        assert_eq!(cfg.run.seed, None);
        assert_eq!(cfg.run.index, IndexKind::Tree);
        assert!(cfg.validate().is_ok());
    }
}
