use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use study_core::errors::{ErrorInfo, StudyError};
use study_core::{
    derive_substream_seed, Invocation, Model, ModificationSet, RawOutput, ResultRecord,
    RunProvenance, SchemaVersion, SeriesData, SolverBackend, VariantId, TIME_LABEL,
};
use tracing::debug;

use crate::artifacts::ResolvedArtifact;
use crate::config::StudyConfig;
use crate::tags::varied_tags;

/// Work directory of a variant under `work_root`.
pub fn variant_work_dir(work_root: &Path, id: VariantId) -> PathBuf {
    work_root.join(format!("variant_{id:04}"))
}

/// Seed a variant integrates with; independent of dispatch strategy.
pub fn variant_seed(master: u64, id: VariantId) -> u64 {
    derive_substream_seed(master, u64::from(id))
}

/// Versions recorded in result provenance.
pub fn tool_versions() -> BTreeMap<String, String> {
    BTreeMap::from([("study-exp".to_string(), env!("CARGO_PKG_VERSION").to_string())])
}

/// Study-level inputs shared by every variant run.
#[derive(Debug, Clone, Copy)]
pub struct RunSettings<'a> {
    /// Effective options.
    pub config: &'a StudyConfig,
    /// Hash of the study plan.
    pub plan_hash: &'a str,
    /// Parent of the per-variant work directories.
    pub work_root: &'a Path,
}

/// Executes one variant against a resolved artifact.
pub struct VariantRunner<'a> {
    backend: &'a dyn SolverBackend,
}

impl<'a> VariantRunner<'a> {
    /// Creates a runner over `backend`.
    pub fn new(backend: &'a dyn SolverBackend) -> Self {
        Self { backend }
    }

    /// Writes the parameter file into the variant's own work directory,
    /// invokes the artifact there and tags the labeled result.
    pub fn run(
        &self,
        id: VariantId,
        model: &Model,
        artifact: &ResolvedArtifact,
        modifications: &ModificationSet,
        settings: RunSettings<'_>,
    ) -> Result<ResultRecord, StudyError> {
        let config = settings.config;
        let work_dir = variant_work_dir(settings.work_root, id);
        self.backend.write_parameters(&artifact.params, &work_dir)?;
        let seed = variant_seed(config.solver.seed, id);
        let raw = self.backend.invoke(
            &artifact.handle,
            &Invocation {
                work_dir: &work_dir,
                solver: &config.solver,
                output: config.output,
                seed,
            },
        )?;
        let samples = raw.samples;
        let (labels, series) = expose_time_first(raw)?;
        debug!(variant = id, labels = labels.len(), "variant output captured");
        Ok(ResultRecord {
            schema_version: SchemaVersion::default(),
            variant_id: id,
            samples,
            labels,
            series,
            solver: config.solver.clone(),
            model: config.include_model.then(|| model.clone()),
            varied: varied_tags(&config.modifications, modifications),
            provenance: RunProvenance {
                plan_hash: settings.plan_hash.to_string(),
                artifact_key: artifact.handle.key.clone(),
                seed,
                created_at: Utc::now().to_rfc3339(),
                tool_versions: tool_versions(),
            },
        })
    }
}

/// Moves the time channel from its internal position to the front.
///
/// Disk outputs keep their file layout; readers address columns by label.
pub fn expose_time_first(raw: RawOutput) -> Result<(Vec<String>, SeriesData), StudyError> {
    let RawOutput {
        mut labels,
        samples,
        series,
    } = raw;
    let idx = labels.iter().position(|l| l == TIME_LABEL).ok_or_else(|| {
        StudyError::Execution(ErrorInfo::new(
            "output_missing_time",
            "artifact output has no time channel",
        ))
    })?;
    let time = labels.remove(idx);
    labels.insert(0, time);
    let series = match series {
        SeriesData::Memory { mut channels } => {
            if channels.len() != labels.len() || channels.iter().any(|c| c.len() != samples) {
                return Err(StudyError::Execution(
                    ErrorInfo::new("output_shape", "channels do not match the declared labels")
                        .with_context("labels", labels.len().to_string())
                        .with_context("channels", channels.len().to_string()),
                ));
            }
            let time = channels.remove(idx);
            channels.insert(0, time);
            SeriesData::Memory { channels }
        }
        disk => disk,
    };
    Ok((labels, series))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_moves_to_the_front() {
        let raw = RawOutput {
            labels: vec!["v".into(), "i".into(), "time".into()],
            samples: 2,
            series: SeriesData::Memory {
                channels: vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![0.0, 0.1]],
            },
        };
        let (labels, series) = expose_time_first(raw).expect("reorder");
        assert_eq!(labels, vec!["time", "v", "i"]);
        match series {
            SeriesData::Memory { channels } => assert_eq!(channels[0], vec![0.0, 0.1]),
            SeriesData::Disk { .. } => panic!("expected memory"),
        }
    }

    #[test]
    fn missing_time_channel_is_an_execution_error() {
        let raw = RawOutput {
            labels: vec!["v".into()],
            samples: 0,
            series: SeriesData::Memory {
                channels: vec![vec![]],
            },
        };
        let err = expose_time_first(raw).expect_err("no time");
        assert!(matches!(err, StudyError::Execution(_)));
    }
}
