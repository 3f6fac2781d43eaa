#![deny(missing_docs)]
#![doc = "Variant study orchestration: expansion, caching, solver artifact reuse, dispatch and recovery."]

/// Result aggregation across variants.
pub mod aggregate;
/// Solver artifact reuse policy.
pub mod artifacts;
/// Per-variant cache gate.
pub mod cache;
/// Study options and study files.
pub mod config;
/// Orchestrator entry point and dispatch strategies.
pub mod dispatch;
/// Variation table expansion.
pub mod expand;
/// Experiment delegates.
pub mod experiment;
/// Failure recovery guard.
pub mod recovery;
/// Study registry backed by CSV or SQLite.
pub mod registry;
/// Single-variant execution.
pub mod runner;
/// File-system study store.
pub mod store;
/// Batch submission.
pub mod submit;
/// Varied tag naming.
pub mod tags;

pub use aggregate::ResultAggregator;
pub use artifacts::{ResolvedArtifact, SolverArtifactManager};
pub use cache::CacheGate;
pub use config::{
    load_study_file, CacheOptions, ExecutionMode, RegenerationPolicy, StudyConfig, StudyFile,
};
pub use dispatch::{Orchestrator, StudyOutcome};
pub use expand::{expand_variants, ExpandedVariant};
pub use experiment::{delegate_config, Experiment};
pub use recovery::{FailureRecoveryManager, StudyFailure};
pub use registry::{registry_append, registry_query, registry_rows, Query, Registry, RegistryRow, Table};
pub use runner::{expose_time_first, variant_seed, variant_work_dir, RunSettings, VariantRunner};
pub use store::{reconcile, variant_output_path, FsStudyStore, DESCRIPTOR_FILE};
pub use submit::{job_path, BatchSubmitter, ClusterJob, ScriptSubmitter};
pub use tags::{tag_name, varied_tags};
