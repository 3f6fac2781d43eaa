use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use study_core::errors::{ErrorInfo, StudyError};
use study_core::{Model, ModificationSet, OutputMode, SolverConfig, VariantId, VariationSpec};
use study_model::{from_yaml_slice, read_file};

fn config_error(code: &str, message: &str) -> StudyError {
    StudyError::Config(ErrorInfo::new(code, message))
}

/// How the per-variant loop is distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// In-process loop over the variants.
    #[default]
    Sequential,
    /// Local worker pool, one variant per worker task.
    Parallel,
    /// Batch job files handed to a scheduler; nothing runs locally.
    Cluster,
}

/// Result persistence switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CacheOptions {
    /// Persist results and the study descriptor.
    #[serde(default)]
    pub save: bool,
    /// Re-run variants even when an output already exists.
    #[serde(default)]
    pub overwrite: bool,
}

/// When the solver artifact is regenerated along the variant sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RegenerationPolicy {
    /// Regenerate for every variant as soon as any variant is structural.
    #[default]
    Eager,
    /// Reuse until the first structural variant, then regenerate for it and
    /// every later variant.
    FromFirstStructural,
}

/// Options recognized by the study entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyConfig {
    /// Dispatch strategy.
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Worker threads in parallel mode.
    #[serde(default = "StudyConfig::default_workers")]
    pub workers: usize,
    /// Result persistence.
    #[serde(default)]
    pub cache: CacheOptions,
    /// Solver selection and numeric options.
    #[serde(default)]
    pub solver: SolverConfig,
    /// Memory or disk channel storage.
    #[serde(default)]
    pub output: OutputMode,
    /// Directory holding the descriptor, outputs and work directories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_dir: Option<PathBuf>,
    /// Directory holding generated solver artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_root: Option<PathBuf>,
    /// Base modifications applied before every variant's own set.
    #[serde(default, skip_serializing_if = "ModificationSet::is_empty")]
    pub modifications: ModificationSet,
    /// Attach the effective model to every result.
    #[serde(default)]
    pub include_model: bool,
    /// Artifact regeneration policy.
    #[serde(default)]
    pub regeneration: RegenerationPolicy,
    /// Restricts the run to one variant (parallel workers and batch jobs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only_variant: Option<VariantId>,
    /// Pre-resolved artifact shared with workers and batch jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
}

impl StudyConfig {
    const fn default_workers() -> usize {
        1
    }

    /// Checks option combinations before anything runs.
    pub fn validate(&self, has_experiment: bool) -> Result<(), StudyError> {
        let solver = &self.solver;
        if !(solver.dt.is_finite() && solver.dt > 0.0) {
            return Err(config_error("config_dt", "dt must be a positive finite number"));
        }
        let [t0, t1] = solver.tspan;
        if !(t0.is_finite() && t1.is_finite() && t1 > t0) {
            return Err(StudyError::Config(
                ErrorInfo::new("config_tspan", "tspan must be finite and increasing")
                    .with_context("tspan", format!("[{t0}, {t1}]")),
            ));
        }
        let ratio = solver.step_ratio();
        if !ratio.is_finite() || ratio > SolverConfig::MAX_STEPS as f64 {
            return Err(StudyError::Config(
                ErrorInfo::new("config_steps", "tspan and dt give too many integration steps")
                    .with_context("steps", format!("{ratio}"))
                    .with_context("max_steps", SolverConfig::MAX_STEPS.to_string())
                    .with_hint("increase dt or shorten tspan"),
            ));
        }
        if solver.downsample == 0 {
            return Err(config_error("config_downsample", "downsample must be at least 1"));
        }
        if self.workers == 0 {
            return Err(config_error("config_workers", "workers must be at least 1"));
        }
        if self.cache.save && self.study_dir.is_none() {
            return Err(config_error(
                "config_save_without_dir",
                "saving results requires a study directory",
            ));
        }
        if self.output == OutputMode::Disk && self.study_dir.is_none() {
            return Err(config_error(
                "config_disk_without_dir",
                "disk output requires a study directory",
            ));
        }
        if self.mode == ExecutionMode::Cluster {
            if self.study_dir.is_none() || !self.cache.save {
                return Err(StudyError::Config(
                    ErrorInfo::new(
                        "config_cluster_persistence",
                        "cluster mode requires a study directory with saving enabled",
                    )
                    .with_hint("set study_dir and cache.save"),
                ));
            }
            if has_experiment {
                return Err(config_error(
                    "config_cluster_experiment",
                    "experiment delegates cannot be submitted to a cluster",
                ));
            }
        }
        if !self.modifications.iter().all(|m| m.value.is_finite()) {
            return Err(config_error(
                "config_non_finite",
                "base modifications must carry finite values",
            ));
        }
        Ok(())
    }

    /// True when the descriptor is persisted by this invocation. Workers
    /// and batch jobs pinned to one variant only persist their output.
    pub fn persists_descriptor(&self) -> bool {
        self.cache.save && self.only_variant.is_none()
    }
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            workers: Self::default_workers(),
            cache: CacheOptions::default(),
            solver: SolverConfig::default(),
            output: OutputMode::default(),
            study_dir: None,
            artifact_root: None,
            modifications: ModificationSet::empty(),
            include_model: false,
            regeneration: RegenerationPolicy::default(),
            only_variant: None,
            artifact_path: None,
        }
    }
}

/// YAML study file: the model, its variation table and the run options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyFile {
    /// Base model.
    pub model: Model,
    /// Variation rows.
    #[serde(default, skip_serializing_if = "VariationSpec::is_empty")]
    pub vary: VariationSpec,
    /// Run options.
    #[serde(default)]
    pub config: StudyConfig,
}

/// Loads a study file from disk.
pub fn load_study_file(path: &Path) -> Result<StudyFile, StudyError> {
    let bytes = read_file(path)?;
    from_yaml_slice(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        StudyConfig::default().validate(false).expect("defaults are valid");
    }

    #[test]
    fn cluster_requires_persistence() {
        let config = StudyConfig {
            mode: ExecutionMode::Cluster,
            ..StudyConfig::default()
        };
        let err = config.validate(false).expect_err("cluster without dir");
        assert_eq!(err.info().code, "config_cluster_persistence");
    }

    #[test]
    fn cluster_rejects_experiments() {
        let config = StudyConfig {
            mode: ExecutionMode::Cluster,
            study_dir: Some(PathBuf::from("study")),
            cache: CacheOptions {
                save: true,
                overwrite: false,
            },
            ..StudyConfig::default()
        };
        config.validate(false).expect("valid cluster");
        let err = config.validate(true).expect_err("experiment");
        assert_eq!(err.info().code, "config_cluster_experiment");
    }

    #[test]
    fn rejects_step_counts_beyond_the_ceiling() {
        let mut config = StudyConfig::default();
        config.solver.dt = f64::MIN_POSITIVE;
        let err = config.validate(false).expect_err("tiny dt");
        assert!(matches!(err, StudyError::Config(_)));
        assert_eq!(err.info().code, "config_steps");

        config.solver.tspan = [0.0, 1.0];
        config.solver.dt = 1.0 / SolverConfig::MAX_STEPS as f64;
        config.validate(false).expect("exactly at the ceiling");
    }

    #[test]
    fn rejects_bad_numerics() {
        let mut config = StudyConfig::default();
        config.solver.dt = 0.0;
        assert!(config.validate(false).is_err());
        let mut config = StudyConfig::default();
        config.solver.tspan = [5.0, 1.0];
        assert_eq!(
            config.validate(false).expect_err("tspan").info().code,
            "config_tspan"
        );
    }
}
