#![deny(missing_docs)]
#![doc = "Core traits and data types for variant simulation studies."]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub mod errors;
pub mod model;
pub mod modification;
pub mod provenance;
pub mod rng;
pub mod study;
mod types;

pub use errors::{ErrorInfo, StudyError};
pub use model::{Component, Equation, Expr, Mechanism, Model, Monitor, StateVariable, TIME_LABEL};
pub use modification::{
    is_structural_property, Combine, ModValue, Modification, ModificationSet, VariationRow,
    VariationSpec,
};
pub use provenance::{RunProvenance, SchemaVersion};
pub use rng::{derive_substream_seed, NoiseSource};
pub use study::{StudyDescriptor, StudyState, Submission, VariantRecord, VariantStatus};
pub use types::{Method, OutputMode, ResultRecord, SeriesData, SolverConfig, VariantId};

/// Concrete numeric values consumed by a solver artifact, keyed by slot name.
pub type ParameterSet = BTreeMap<String, f64>;

/// Addressable solver artifact produced by a [`SolverBackend`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHandle {
    /// Structural shape key the artifact was generated for.
    pub key: String,
    /// Directory holding the generated artifact.
    pub path: PathBuf,
}

/// Per-invocation options handed to an artifact.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    /// Directory holding the parameter file and receiving disk outputs.
    pub work_dir: &'a Path,
    /// Numeric run options.
    pub solver: &'a SolverConfig,
    /// Memory or disk output.
    pub output: OutputMode,
    /// Seed for stochastic states.
    pub seed: u64,
}

/// Raw channels emitted by an artifact.
///
/// Labels follow the artifact's internal order: state variables, monitors and
/// the time channel last.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
    /// Internal channel labels.
    pub labels: Vec<String>,
    /// Number of samples per channel.
    pub samples: usize,
    /// Channel storage.
    pub series: SeriesData,
}

/// Validates and normalizes a raw model description.
pub trait ModelNormalizer: Send + Sync {
    /// Returns the normalized model or a structural error.
    fn normalize(&self, raw: &Model) -> Result<Model, StudyError>;
}

/// Pure application of modification sets.
pub trait ModelModifier: Send + Sync {
    /// Applies `set` to `model`, returning a new model. The input is never mutated.
    fn apply(&self, model: &Model, set: &ModificationSet) -> Result<Model, StudyError>;

    /// Checks that a `(target, property)` pair addresses something in `model`.
    fn check_target(&self, model: &Model, target: &str, property: &str) -> Result<(), StudyError>;
}

/// Code generation and invocation of solver artifacts.
pub trait SolverBackend: Send + Sync {
    /// Generates (or locates) the artifact for the model's structural shape under `root`.
    fn resolve_artifact(
        &self,
        model: &Model,
        solver: &SolverConfig,
        root: &Path,
    ) -> Result<ArtifactHandle, StudyError>;

    /// Opens a previously generated artifact.
    fn open_artifact(&self, path: &Path) -> Result<ArtifactHandle, StudyError>;

    /// Numeric parameter set the artifact reads for `model`.
    fn parameter_set(&self, model: &Model) -> Result<ParameterSet, StudyError>;

    /// Writes the parameter file the artifact reads and returns its path.
    fn write_parameters(&self, params: &ParameterSet, work_dir: &Path)
        -> Result<PathBuf, StudyError>;

    /// Runs the artifact against the parameter file in `invocation.work_dir`.
    fn invoke(
        &self,
        artifact: &ArtifactHandle,
        invocation: &Invocation<'_>,
    ) -> Result<RawOutput, StudyError>;
}

/// Persistence of results and study metadata.
pub trait StudyStore: Send + Sync {
    /// True when an output exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Loads every result record persisted at `path`.
    fn load(&self, path: &Path) -> Result<Vec<ResultRecord>, StudyError>;

    /// Persists the records of a variant at `path`.
    fn save(&self, records: &[ResultRecord], path: &Path) -> Result<(), StudyError>;

    /// Loads the descriptor stored in `study_dir`, if any.
    fn load_descriptor(&self, study_dir: &Path) -> Result<Option<StudyDescriptor>, StudyError>;

    /// Persists the descriptor into its study directory.
    fn save_descriptor(&self, descriptor: &StudyDescriptor) -> Result<(), StudyError>;

    /// Updates one variant's status and persists the descriptor.
    fn update_status(
        &self,
        descriptor: &mut StudyDescriptor,
        id: VariantId,
        status: VariantStatus,
    ) -> Result<(), StudyError> {
        descriptor.mark(id, status);
        self.save_descriptor(descriptor)
    }
}
