//! Persisted study descriptor and per-variant records.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::Model;
use crate::modification::ModificationSet;
use crate::provenance::SchemaVersion;
use crate::types::{SolverConfig, VariantId};

/// Execution status of a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VariantStatus {
    /// Not started yet.
    #[default]
    Pending,
    /// Execution in progress (or interrupted).
    Started,
    /// Completed and, when saving is enabled, persisted.
    Finished,
    /// Failed; the error is recorded on the variant.
    Failed,
}

/// Lifecycle of a study invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StudyState {
    /// Variant loop in progress.
    #[default]
    Running,
    /// All variants finished.
    Success,
    /// A variant failed.
    Error,
    /// Jobs handed to a batch system; completion is external.
    Submitted,
}

/// Per-variant metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantRecord {
    /// Stable identifier assigned at expansion time.
    pub id: VariantId,
    /// Modifications defining the variant.
    pub modifications: ModificationSet,
    /// Expected location of the persisted output.
    pub output_path: PathBuf,
    /// Resolved solver artifact directory.
    #[serde(default)]
    pub artifact_path: Option<PathBuf>,
    /// Execution status.
    #[serde(default)]
    pub status: VariantStatus,
    /// Wall-clock duration of the last execution.
    #[serde(default)]
    pub duration_secs: Option<f64>,
    /// Error captured when the variant failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VariantRecord {
    /// Creates a pending record.
    pub fn pending(id: VariantId, modifications: ModificationSet, output_path: PathBuf) -> Self {
        Self {
            id,
            modifications,
            output_path,
            artifact_path: None,
            status: VariantStatus::Pending,
            duration_secs: None,
            error: None,
        }
    }

    /// True when the variant's modifications change the model's shape.
    pub fn is_structural(&self) -> bool {
        self.modifications.is_structural()
    }
}

/// Remote submission handle produced in cluster mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Batch script to hand to the scheduler.
    pub script: PathBuf,
    /// Per-variant job files.
    pub jobs: Vec<PathBuf>,
}

/// Persisted unit of record for a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyDescriptor {
    /// Schema version of the descriptor payload.
    #[serde(default)]
    pub schema_version: SchemaVersion,
    /// Study directory, when persistence is enabled.
    #[serde(default)]
    pub study_dir: Option<PathBuf>,
    /// Hash binding the descriptor to its model, variation rows and solver settings.
    pub plan_hash: String,
    /// Base model.
    pub base_model: Model,
    /// Base solver configuration.
    pub solver: SolverConfig,
    /// Variant records in expansion order.
    pub variants: Vec<VariantRecord>,
    /// Study lifecycle state.
    #[serde(default)]
    pub state: StudyState,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp of the last update.
    #[serde(default)]
    pub updated_at: String,
    /// Submission handle for cluster mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission: Option<Submission>,
}

impl StudyDescriptor {
    /// Looks up a variant record.
    pub fn variant(&self, id: VariantId) -> Option<&VariantRecord> {
        self.variants.iter().find(|v| v.id == id)
    }

    /// Mutable lookup of a variant record.
    pub fn variant_mut(&mut self, id: VariantId) -> Option<&mut VariantRecord> {
        self.variants.iter_mut().find(|v| v.id == id)
    }

    /// Sets a variant's status; returns false for unknown identifiers.
    pub fn mark(&mut self, id: VariantId, status: VariantStatus) -> bool {
        match self.variant_mut(id) {
            Some(record) => {
                record.status = status;
                if status != VariantStatus::Failed {
                    record.error = None;
                }
                true
            }
            None => false,
        }
    }

    /// Records a failure with its error message.
    pub fn mark_failed(&mut self, id: VariantId, error: impl Into<String>) -> bool {
        match self.variant_mut(id) {
            Some(record) => {
                record.status = VariantStatus::Failed;
                record.error = Some(error.into());
                true
            }
            None => false,
        }
    }

    /// Records a completed execution's duration.
    pub fn record_duration(&mut self, id: VariantId, elapsed: Duration) {
        if let Some(record) = self.variant_mut(id) {
            record.duration_secs = Some(elapsed.as_secs_f64());
        }
    }

    /// True when any variant is structure-changing.
    pub fn any_structural(&self) -> bool {
        self.variants.iter().any(VariantRecord::is_structural)
    }

    /// Identifiers of variants in a given status.
    pub fn ids_with_status(&self, status: VariantStatus) -> Vec<VariantId> {
        self.variants
            .iter()
            .filter(|v| v.status == status)
            .map(|v| v.id)
            .collect()
    }
}
