//! Schema versions and run provenance carried by persisted study files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::{ErrorInfo, StudyError};

/// Version of the persisted descriptor and result payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Incremented when older readers can no longer load a payload.
    pub major: u32,
    /// Incremented for additive fields.
    pub minor: u32,
}

impl SchemaVersion {
    /// Version written by this build.
    pub const CURRENT: SchemaVersion = SchemaVersion { major: 1, minor: 0 };

    /// Fails for payloads written by a newer, incompatible build.
    pub fn ensure_readable(self, what: &str) -> Result<(), StudyError> {
        if self.major > Self::CURRENT.major {
            return Err(StudyError::Serde(
                ErrorInfo::new("schema_unsupported", "payload uses a newer schema")
                    .with_context("payload", what.to_string())
                    .with_context("found", format!("{}.{}", self.major, self.minor))
                    .with_context(
                        "supported",
                        format!("{}.{}", Self::CURRENT.major, Self::CURRENT.minor),
                    ),
            ));
        }
        Ok(())
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Where a result record came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunProvenance {
    /// Hash of the study plan (base model, variation rows, solver settings).
    pub plan_hash: String,
    /// Shape key of the solver artifact that produced the data.
    #[serde(default)]
    pub artifact_key: String,
    /// Seed actually used for the variant's integration.
    pub seed: u64,
    /// RFC 3339 timestamp of the run.
    pub created_at: String,
    /// Crate versions involved in the run.
    #[serde(default)]
    pub tool_versions: BTreeMap<String, String>,
}
