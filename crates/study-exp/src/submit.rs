use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use study_core::errors::{ErrorInfo, StudyError};
use study_core::{Model, StudyDescriptor, Submission, VariantId, VariationSpec};
use study_model::{to_yaml_string, write_atomic};
use tracing::info;

use crate::config::{ExecutionMode, StudyConfig, StudyFile};

/// Subdirectory of the study directory receiving job files.
pub const JOBS_DIR: &str = "jobs";
/// Batch script name.
pub const SUBMIT_SCRIPT: &str = "submit.sh";

/// Everything a submitter needs to produce self-contained jobs.
#[derive(Debug, Clone, Copy)]
pub struct ClusterJob<'a> {
    /// Descriptor of the study being submitted.
    pub descriptor: &'a StudyDescriptor,
    /// Normalized base model.
    pub model: &'a Model,
    /// Variation table; jobs re-expand it to reproduce identifiers.
    pub vary: &'a VariationSpec,
    /// Options of the submitting invocation.
    pub config: &'a StudyConfig,
    /// Variants still to run.
    pub outstanding: &'a [VariantId],
}

/// Hands per-variant jobs to a batch system without executing them.
pub trait BatchSubmitter: Send + Sync {
    /// Produces job artifacts and returns the submission handle.
    fn submit(&self, job: &ClusterJob<'_>) -> Result<Submission, StudyError>;
}

/// Writes one study file per variant and a SLURM array script running them.
#[derive(Debug, Clone)]
pub struct ScriptSubmitter {
    /// Command the script invokes for every job.
    pub program: String,
    /// Extra `#SBATCH` directives.
    pub directives: Vec<String>,
}

impl Default for ScriptSubmitter {
    fn default() -> Self {
        Self {
            program: "study-sim".to_string(),
            directives: Vec::new(),
        }
    }
}

fn submit_error(code: &str, message: &str) -> StudyError {
    StudyError::Submission(ErrorInfo::new(code, message))
}

/// Job file path for a variant.
pub fn job_path(study_dir: &Path, id: VariantId) -> PathBuf {
    study_dir.join(JOBS_DIR).join(format!("job_{id:04}.yaml"))
}

impl ScriptSubmitter {
    fn job_config(config: &StudyConfig, id: VariantId) -> StudyConfig {
        StudyConfig {
            mode: ExecutionMode::Sequential,
            workers: 1,
            only_variant: Some(id),
            ..config.clone()
        }
    }

    fn script(&self, jobs: &[PathBuf]) -> Result<String, StudyError> {
        let mut script = String::new();
        let fmt_err = |_| submit_error("submit_script_format", "could not render batch script");
        writeln!(script, "#!/bin/bash").map_err(fmt_err)?;
        writeln!(script, "#SBATCH --job-name=study").map_err(fmt_err)?;
        writeln!(script, "#SBATCH --array=0-{}", jobs.len().saturating_sub(1)).map_err(fmt_err)?;
        for directive in &self.directives {
            writeln!(script, "#SBATCH {directive}").map_err(fmt_err)?;
        }
        writeln!(script, "set -euo pipefail").map_err(fmt_err)?;
        writeln!(script, "JOBS=(").map_err(fmt_err)?;
        for job in jobs {
            writeln!(script, "  \"{}\"", job.display()).map_err(fmt_err)?;
        }
        writeln!(script, ")").map_err(fmt_err)?;
        writeln!(
            script,
            "exec {} run --study \"${{JOBS[$SLURM_ARRAY_TASK_ID]}}\"",
            self.program
        )
        .map_err(fmt_err)?;
        Ok(script)
    }
}

impl BatchSubmitter for ScriptSubmitter {
    fn submit(&self, job: &ClusterJob<'_>) -> Result<Submission, StudyError> {
        let study_dir = job.descriptor.study_dir.as_ref().ok_or_else(|| {
            submit_error("submit_no_study_dir", "cluster submission needs a study directory")
        })?;
        let mut jobs = Vec::with_capacity(job.outstanding.len());
        for &id in job.outstanding {
            let file = StudyFile {
                model: job.model.clone(),
                vary: job.vary.clone(),
                config: Self::job_config(job.config, id),
            };
            let path = job_path(study_dir, id);
            write_atomic(&path, to_yaml_string(&file)?.as_bytes())?;
            jobs.push(path);
        }
        let script = study_dir.join(JOBS_DIR).join(SUBMIT_SCRIPT);
        write_atomic(&script, self.script(&jobs)?.as_bytes())?;
        info!(jobs = jobs.len(), script = %script.display(), "batch jobs written");
        Ok(Submission { script, jobs })
    }
}
