mod common;

use std::path::PathBuf;
use std::sync::Arc;

use common::{cell, config};
use study_core::errors::ErrorInfo;
use study_core::{Model, ResultRecord, StudyError, VariationRow, VariationSpec};
use study_exp::{Experiment, Orchestrator, StudyConfig, StudyOutcome};
use tempfile::tempdir;

/// Delegate that wanders off into another directory before finishing.
struct Wanderer {
    elsewhere: PathBuf,
    fail: bool,
}

impl Experiment for Wanderer {
    fn run(
        &self,
        model: &Model,
        config: &StudyConfig,
        orchestrator: &Orchestrator,
    ) -> Result<Vec<ResultRecord>, StudyError> {
        std::env::set_current_dir(&self.elsewhere).map_err(|err| {
            StudyError::Execution(ErrorInfo::new("chdir", err.to_string()))
        })?;
        if self.fail {
            return Err(StudyError::Execution(ErrorInfo::new(
                "forced_failure",
                "delegate failed on purpose",
            )));
        }
        Ok(orchestrator
            .run(model, &VariationSpec::default(), config)?
            .results()
            .to_vec())
    }
}

#[test]
fn working_directory_survives_success_and_failure() {
    let before = std::env::current_dir().expect("cwd");
    let elsewhere = tempdir().expect("tempdir");
    let vary = VariationSpec::cross(vec![VariationRow::numeric("", "gNa", [50.0, 100.0])]);

    let plain = Orchestrator::new()
        .run(&cell(), &vary, &config())
        .expect("plain run");
    assert!(plain.is_success());
    assert_eq!(std::env::current_dir().expect("cwd"), before);

    let wandering = Orchestrator::new().with_experiment(Arc::new(Wanderer {
        elsewhere: elsewhere.path().to_path_buf(),
        fail: false,
    }));
    let outcome = wandering.run(&cell(), &vary, &config()).expect("wandering run");
    assert_eq!(outcome.results().len(), 2);
    assert_eq!(std::env::current_dir().expect("cwd"), before);

    let failing = Orchestrator::new().with_experiment(Arc::new(Wanderer {
        elsewhere: elsewhere.path().to_path_buf(),
        fail: true,
    }));
    let outcome = failing.run(&cell(), &vary, &config()).expect("setup");
    match outcome {
        StudyOutcome::Failed(failure) => {
            assert_eq!(failure.variant_id, Some(1));
            assert_eq!(failure.error.info().code, "forced_failure");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(std::env::current_dir().expect("cwd"), before);
}
