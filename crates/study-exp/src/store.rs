use std::path::{Path, PathBuf};

use study_core::errors::ErrorInfo;
use study_core::{
    ResultRecord, StudyDescriptor, StudyError, StudyStore, VariantId, VariantStatus,
};
use study_model::{from_json_slice, read_file, to_canonical_json_bytes, write_atomic};
use tracing::debug;

/// Descriptor file inside a study directory.
pub const DESCRIPTOR_FILE: &str = "study.json";
/// Subdirectory holding per-variant outputs.
pub const DATA_DIR: &str = "data";

/// Output location of a variant inside `study_dir`.
pub fn variant_output_path(study_dir: &Path, id: VariantId) -> PathBuf {
    study_dir.join(DATA_DIR).join(format!("variant_{id:04}.json"))
}

/// File-system store writing canonical JSON with atomic renames.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStudyStore;

impl StudyStore for FsStudyStore {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn load(&self, path: &Path) -> Result<Vec<ResultRecord>, StudyError> {
        let records: Vec<ResultRecord> = from_json_slice(&read_file(path)?)?;
        for record in &records {
            record.schema_version.ensure_readable("result record")?;
        }
        Ok(records)
    }

    fn save(&self, records: &[ResultRecord], path: &Path) -> Result<(), StudyError> {
        write_atomic(path, &to_canonical_json_bytes(&records)?)?;
        debug!(path = %path.display(), records = records.len(), "results persisted");
        Ok(())
    }

    fn load_descriptor(&self, study_dir: &Path) -> Result<Option<StudyDescriptor>, StudyError> {
        let path = study_dir.join(DESCRIPTOR_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let descriptor: StudyDescriptor = from_json_slice(&read_file(&path)?)?;
        descriptor.schema_version.ensure_readable("study descriptor")?;
        Ok(Some(descriptor))
    }

    fn save_descriptor(&self, descriptor: &StudyDescriptor) -> Result<(), StudyError> {
        let study_dir = descriptor.study_dir.as_ref().ok_or_else(|| {
            StudyError::Storage(ErrorInfo::new(
                "store_no_study_dir",
                "descriptor has no study directory",
            ))
        })?;
        let path = study_dir.join(DESCRIPTOR_FILE);
        write_atomic(&path, &to_canonical_json_bytes(descriptor)?)
    }
}

/// Marks variants whose output exists as finished.
///
/// Jobs pinned to one variant only persist their output, so the descriptor
/// catches up here. Returns the identifiers that changed.
pub fn reconcile(store: &dyn StudyStore, descriptor: &mut StudyDescriptor) -> Vec<VariantId> {
    let mut changed = Vec::new();
    for record in descriptor.variants.iter_mut() {
        if record.status != VariantStatus::Finished && store.exists(&record.output_path) {
            record.status = VariantStatus::Finished;
            record.error = None;
            changed.push(record.id);
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use study_core::{Model, ModificationSet, SolverConfig, StudyState, VariantRecord};
    use tempfile::tempdir;

    fn descriptor(dir: &Path) -> StudyDescriptor {
        StudyDescriptor {
            schema_version: Default::default(),
            study_dir: Some(dir.to_path_buf()),
            plan_hash: "abc".into(),
            base_model: Model::new("m"),
            solver: SolverConfig::default(),
            variants: vec![
                VariantRecord::pending(1, ModificationSet::empty(), variant_output_path(dir, 1)),
                VariantRecord::pending(2, ModificationSet::empty(), variant_output_path(dir, 2)),
            ],
            state: StudyState::Running,
            created_at: "2024-01-01T00:00:00Z".into(),
            updated_at: String::new(),
            submission: None,
        }
    }

    #[test]
    fn descriptor_round_trips_through_the_study_dir() {
        let dir = tempdir().expect("tempdir");
        let store = FsStudyStore;
        assert!(store.load_descriptor(dir.path()).expect("load").is_none());
        let mut desc = descriptor(dir.path());
        store
            .update_status(&mut desc, 2, VariantStatus::Started)
            .expect("update");
        let loaded = store
            .load_descriptor(dir.path())
            .expect("load")
            .expect("present");
        assert_eq!(loaded.variant(2).map(|v| v.status), Some(VariantStatus::Started));
    }

    #[test]
    fn reconcile_picks_up_outputs_written_by_jobs() {
        let dir = tempdir().expect("tempdir");
        let store = FsStudyStore;
        let mut desc = descriptor(dir.path());
        store.save(&[], &variant_output_path(dir.path(), 2)).expect("save");
        assert_eq!(reconcile(&store, &mut desc), vec![2]);
        assert_eq!(desc.ids_with_status(VariantStatus::Finished), vec![2]);
    }

    #[test]
    fn descriptors_from_newer_schemas_are_refused() {
        let dir = tempdir().expect("tempdir");
        let store = FsStudyStore;
        let mut desc = descriptor(dir.path());
        desc.schema_version.major += 1;
        store.save_descriptor(&desc).expect("save");
        let err = store.load_descriptor(dir.path()).expect_err("newer schema");
        assert_eq!(err.info().code, "schema_unsupported");
    }
}
