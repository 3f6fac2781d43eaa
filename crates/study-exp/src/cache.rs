use study_core::{ResultRecord, StudyError, StudyStore, VariantRecord};
use tracing::debug;

use crate::config::CacheOptions;

/// Decides whether a variant's persisted output replaces its execution.
pub struct CacheGate<'a> {
    store: &'a dyn StudyStore,
    options: CacheOptions,
}

impl<'a> CacheGate<'a> {
    /// Creates a gate over `store`.
    pub fn new(store: &'a dyn StudyStore, options: CacheOptions) -> Self {
        Self { store, options }
    }

    /// Returns the stored records of `record` when they may be reused.
    ///
    /// Nothing is reused when persistence is disabled or overwrite is set.
    pub fn lookup(&self, record: &VariantRecord) -> Result<Option<Vec<ResultRecord>>, StudyError> {
        if !self.options.save || self.options.overwrite {
            return Ok(None);
        }
        if !self.store.exists(&record.output_path) {
            return Ok(None);
        }
        let records = self.store.load(&record.output_path)?;
        debug!(variant = record.id, path = %record.output_path.display(), "cache hit");
        Ok(Some(records))
    }
}
