#![deny(missing_docs)]
#![doc = "Model normalization, pure modification and canonical serialization helpers."]

/// Canonical JSON, stable hashing and YAML helpers.
pub mod canonical;
/// Atomic file writes shared by artifact and study persistence.
pub mod io;
/// Pure application of modification sets.
pub mod modify;
/// Structural validation of model descriptions.
pub mod normalize;

use study_core::{Model, ModelModifier, ModelNormalizer, ModificationSet, StudyError};

pub use canonical::{
    from_json_slice, from_yaml_slice, stable_hash_string, to_canonical_json_bytes, to_yaml_string,
};
pub use io::{read_file, write_atomic};
pub use modify::{apply_modifications, check_target};
pub use normalize::normalize_model;

/// Default normalizer and modifier for structured equation models.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardModeler;

impl ModelNormalizer for StandardModeler {
    fn normalize(&self, raw: &Model) -> Result<Model, StudyError> {
        normalize_model(raw)
    }
}

impl ModelModifier for StandardModeler {
    fn apply(&self, model: &Model, set: &ModificationSet) -> Result<Model, StudyError> {
        if set.is_empty() {
            return Ok(model.clone());
        }
        tracing::trace!(edits = set.len(), "applying modifications");
        apply_modifications(model, set)
    }

    fn check_target(&self, model: &Model, target: &str, property: &str) -> Result<(), StudyError> {
        check_target(model, target, property)
    }
}
