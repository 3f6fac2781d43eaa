use std::path::PathBuf;

use chrono::Utc;
use study_core::{
    ResultRecord, StudyDescriptor, StudyError, StudyState, StudyStore, VariantId, VariantStatus,
};
use tracing::{error, warn};

/// Inspectable failure returned instead of a raw error.
#[derive(Debug, Clone, PartialEq)]
pub struct StudyFailure {
    /// Descriptor with the failing variant marked.
    pub descriptor: StudyDescriptor,
    /// Failing variant, when the failure belongs to one.
    pub variant_id: Option<VariantId>,
    /// Error that ended the study.
    pub error: StudyError,
    /// Results aggregated before the failure.
    pub results: Vec<ResultRecord>,
}

/// Guard around one study invocation: `running -> {success, error}`.
///
/// The working directory observed on entry is restored on every exit path,
/// including unwinding, in case a delegate changed it.
pub struct FailureRecoveryManager<'a> {
    store: &'a dyn StudyStore,
    persist: bool,
    entry_dir: Option<PathBuf>,
    finished: bool,
}

impl<'a> FailureRecoveryManager<'a> {
    /// Records the entry state. `persist` enables descriptor writes.
    pub fn enter(store: &'a dyn StudyStore, persist: bool) -> Self {
        Self {
            store,
            persist,
            entry_dir: std::env::current_dir().ok(),
            finished: false,
        }
    }

    /// Moves the descriptor into `running` and persists it.
    pub fn begin(&self, descriptor: &mut StudyDescriptor) -> Result<(), StudyError> {
        descriptor.state = StudyState::Running;
        self.checkpoint(descriptor)
    }

    /// Persists the descriptor when persistence is enabled.
    pub fn checkpoint(&self, descriptor: &mut StudyDescriptor) -> Result<(), StudyError> {
        if !self.persist {
            return Ok(());
        }
        descriptor.updated_at = Utc::now().to_rfc3339();
        self.store.save_descriptor(descriptor)
    }

    /// Updates one variant's status and persists the descriptor.
    pub fn transition(
        &self,
        descriptor: &mut StudyDescriptor,
        id: VariantId,
        status: VariantStatus,
    ) -> Result<(), StudyError> {
        if self.persist {
            descriptor.updated_at = Utc::now().to_rfc3339();
            self.store.update_status(descriptor, id, status)
        } else {
            descriptor.mark(id, status);
            Ok(())
        }
    }

    /// Success transition.
    pub fn succeed(mut self, descriptor: &mut StudyDescriptor) -> Result<(), StudyError> {
        descriptor.state = StudyState::Success;
        let saved = self.checkpoint(descriptor);
        self.close();
        saved
    }

    /// Terminal transition for a descriptor handed to a batch system.
    pub fn submitted(mut self, descriptor: &mut StudyDescriptor) -> Result<(), StudyError> {
        descriptor.state = StudyState::Submitted;
        let saved = self.checkpoint(descriptor);
        self.close();
        saved
    }

    /// Error transition: marks the failing variant, persists the partial
    /// descriptor and packages everything into a [`StudyFailure`].
    pub fn fail(
        mut self,
        mut descriptor: StudyDescriptor,
        variant_id: Option<VariantId>,
        err: StudyError,
        results: Vec<ResultRecord>,
    ) -> StudyFailure {
        if let Some(id) = variant_id {
            descriptor.mark_failed(id, err.to_string());
        }
        descriptor.state = StudyState::Error;
        error!(variant = ?variant_id, error = %err, "study failed");
        if let Err(save_err) = self.checkpoint(&mut descriptor) {
            error!(error = %save_err, "could not persist failed descriptor");
        }
        self.close();
        StudyFailure {
            descriptor,
            variant_id,
            error: err,
            results,
        }
    }

    fn close(&mut self) {
        self.finished = true;
        self.restore_dir();
    }

    fn restore_dir(&self) {
        let Some(dir) = &self.entry_dir else {
            return;
        };
        if std::env::current_dir().ok().as_ref() == Some(dir) {
            return;
        }
        if let Err(err) = std::env::set_current_dir(dir) {
            warn!(dir = %dir.display(), error = %err, "could not restore working directory");
        }
    }
}

impl Drop for FailureRecoveryManager<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("study exited without a terminal transition");
            self.restore_dir();
        }
    }
}
