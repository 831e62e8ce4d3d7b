//! Typed configuration: `PlannerParams`, `ExperimentParams`, optionally
//! loaded from a JSON file — the Rust analogue of the original's
//! `MCTS::PARAMS(filename)` / `EXPERIMENT::PARAMS(filename)` constructors,
//! which read the same fields out of a boost property_tree JSON document.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Verbosity level: `0` silent, `1` tree ops, `2` per-simulation,
/// `3` per-step, `4` per-rollout-step.
pub type Verbosity = u8;

pub const SILENT: Verbosity = 0;
pub const TREE: Verbosity = 1;
pub const SIMULATION: Verbosity = 2;
pub const STEP: Verbosity = 3;
pub const ROLLOUT: Verbosity = 4;

/// Search configuration (`MCTS::PARAMS` in the original).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlannerParams {
    pub verbose: Verbosity,
    pub max_depth: u32,
    pub num_simulations: u32,
    pub num_start_states: u32,
    pub use_transforms: bool,
    pub num_transforms: u32,
    pub max_attempts: u32,
    pub expand_count: u32,
    /// Retained for config round-trip parity with the original
    /// (`MCTS::PARAMS::EnsembleSize // NEVER USED`); the core never reads it.
    pub ensemble_size: u32,
    pub exploration_constant: f64,
    pub use_rave: bool,
    pub rave_discount: f64,
    pub rave_constant: f64,
    pub disable_tree: bool,
}

impl Default for PlannerParams {
    fn default() -> Self {
        Self {
            verbose: SILENT,
            max_depth: 100,
            num_simulations: 1_000,
            num_start_states: 1_000,
            use_transforms: true,
            num_transforms: 10,
            max_attempts: 1_000,
            expand_count: 1,
            ensemble_size: 1,
            exploration_constant: 1.0,
            use_rave: false,
            rave_discount: 1.0,
            rave_constant: 0.01,
            disable_tree: false,
        }
    }
}

impl PlannerParams {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load_json(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Sweep/episode-driver configuration (`EXPERIMENT::PARAMS` in the
/// original).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExperimentParams {
    pub num_runs: u32,
    pub num_steps: u32,
    /// Retained for parity with the original (`EXPERIMENT::PARAMS::SimSteps
    /// // NEVER USED` by the main loop); `discounted_return`/
    /// `average_reward` compute and store it but never read it back.
    pub sim_steps: u32,
    pub time_out_secs: f64,
    pub min_doubles: i32,
    pub max_doubles: i32,
    pub transform_doubles: i32,
    pub transform_attempts: u32,
    pub accuracy: f64,
    pub undiscounted_horizon: u32,
    pub auto_exploration: bool,
}

impl Default for ExperimentParams {
    fn default() -> Self {
        Self {
            num_runs: 100,
            num_steps: 100_000,
            sim_steps: 1_000,
            time_out_secs: 12.0 * 3600.0,
            min_doubles: 1,
            max_doubles: 14,
            transform_doubles: -4,
            transform_attempts: 1_000,
            accuracy: 0.01,
            undiscounted_horizon: 1_000,
            auto_exploration: true,
        }
    }
}

impl ExperimentParams {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load_json(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_runs == 0 {
            return Err(ConfigError::NegativeCount { field: "num_runs", value: 0 });
        }
        if self.accuracy <= 0.0 || self.accuracy >= 1.0 {
            return Err(ConfigError::InvalidDiscount(self.accuracy));
        }
        Ok(())
    }
}

/// Validate the pair of discount/reward-range values every `Simulator`
/// must expose — the fatal "configuration error" class in §7.
pub fn validate_simulator_shape(discount: f64, reward_range: f64) -> Result<(), ConfigError> {
    if discount <= 0.0 || discount > 1.0 {
        return Err(ConfigError::InvalidDiscount(discount));
    }
    if reward_range < 0.0 {
        return Err(ConfigError::InvalidRewardRange(reward_range));
    }
    Ok(())
}

fn load_json<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path_ref = path.as_ref();
    let text = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
        path: path_ref.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path_ref.display().to_string(),
        source,
    })
}

/// Apply `ExperimentParams::auto_exploration` to a `PlannerParams`,
/// matching the original's `EXPERIMENT` constructor: when enabled, the
/// exploration constant becomes `0` under RAVE, else the simulator's
/// reward range.
pub fn apply_auto_exploration(
    planner: &mut PlannerParams,
    experiment: &ExperimentParams,
    reward_range: f64,
) {
    if experiment.auto_exploration {
        planner.exploration_constant = if planner.use_rave { 0.0 } else { reward_range };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_exploration_uses_reward_range_without_rave() {
        let mut p = PlannerParams { use_rave: false, ..Default::default() };
        let e = ExperimentParams { auto_exploration: true, ..Default::default() };
        apply_auto_exploration(&mut p, &e, 10.0);
        assert_eq!(p.exploration_constant, 10.0);
    }

    #[test]
    fn auto_exploration_is_zero_under_rave() {
        let mut p = PlannerParams { use_rave: true, ..Default::default() };
        let e = ExperimentParams { auto_exploration: true, ..Default::default() };
        apply_auto_exploration(&mut p, &e, 10.0);
        assert_eq!(p.exploration_constant, 0.0);
    }

    #[test]
    fn validate_rejects_out_of_range_discount() {
        assert!(validate_simulator_shape(0.0, 1.0).is_err());
        assert!(validate_simulator_shape(1.5, 1.0).is_err());
        assert!(validate_simulator_shape(0.9, 1.0).is_ok());
    }

    #[test]
    fn validate_rejects_negative_reward_range() {
        assert!(validate_simulator_shape(0.9, -1.0).is_err());
    }

    #[test]
    fn json_round_trip() {
        let params = PlannerParams::default();
        let json = serde_json::to_string(&params).unwrap();
        let back: PlannerParams = serde_json::from_str(&json).unwrap();
        assert_eq!(params, back);
    }
}
