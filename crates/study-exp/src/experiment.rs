use std::path::Path;

use study_core::{Model, ModificationSet, ResultRecord, StudyError};

use crate::config::{CacheOptions, ExecutionMode, StudyConfig};
use crate::dispatch::Orchestrator;

/// Protocol run in place of a single simulation for every variant.
///
/// The delegate receives the variant's effective model, the filtered run
/// options and an orchestrator without a delegate attached, so it may run
/// nested studies of its own. Every returned record becomes part of the
/// variant's output.
pub trait Experiment: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        "experiment"
    }

    /// Runs the protocol for one variant.
    fn run(
        &self,
        model: &Model,
        config: &StudyConfig,
        orchestrator: &Orchestrator,
    ) -> Result<Vec<ResultRecord>, StudyError>;
}

/// Options handed to a delegate.
///
/// Dispatch mode, base modifications and variant pinning are stripped, and
/// nested studies write into the variant's work directory rather than into
/// the outer study's descriptor.
pub fn delegate_config(config: &StudyConfig, work_dir: &Path) -> StudyConfig {
    StudyConfig {
        mode: ExecutionMode::Sequential,
        workers: 1,
        cache: CacheOptions::default(),
        modifications: ModificationSet::empty(),
        only_variant: None,
        artifact_path: None,
        study_dir: config
            .study_dir
            .as_ref()
            .map(|_| work_dir.join("experiment")),
        ..config.clone()
    }
}
