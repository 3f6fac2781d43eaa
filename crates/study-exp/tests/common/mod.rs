#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use study_core::errors::ErrorInfo;
use study_core::{
    ArtifactHandle, Component, Equation, Expr, Invocation, Mechanism, Model, ParameterSet,
    RawOutput, ResultRecord, SolverBackend, SolverConfig, StateVariable, StudyError,
};
use study_exp::{CacheOptions, Orchestrator, StudyConfig};
use study_solver::ProgramGenerator;

/// Leaky membrane with a sodium-like drive on component `E`.
pub fn cell() -> Model {
    Model::new("cell")
        .with_state(StateVariable::new(
            "v",
            -65.0,
            Expr::add(
                Expr::mul(Expr::param("gL"), Expr::sub(Expr::param("EL"), Expr::state("v"))),
                Expr::param("I"),
            ),
        ))
        .with_parameter("gL", 0.1)
        .with_parameter("EL", -65.0)
        .with_parameter("I", 1.0)
        .with_parameter("gNa", 120.0)
        .with_mechanism(
            "iNa",
            Mechanism {
                equations: vec![Equation::new(
                    "v",
                    Expr::mul(Expr::constant(0.001), Expr::param("gNa")),
                )],
            },
        )
        .with_component(
            "E",
            Component {
                parameters: [("gNa".to_string(), 120.0)].into_iter().collect(),
                mechanisms: vec!["iNa".into()],
                equations: vec![],
            },
        )
        .with_monitor("drive", Expr::mul(Expr::param("gL"), Expr::state("v")))
}

pub fn quick_solver() -> SolverConfig {
    SolverConfig {
        tspan: [0.0, 5.0],
        dt: 0.05,
        downsample: 2,
        ..SolverConfig::default()
    }
}

pub fn config() -> StudyConfig {
    StudyConfig {
        solver: quick_solver(),
        ..StudyConfig::default()
    }
}

pub fn saved_config(study_dir: &Path) -> StudyConfig {
    StudyConfig {
        study_dir: Some(study_dir.to_path_buf()),
        cache: CacheOptions {
            save: true,
            overwrite: false,
        },
        ..config()
    }
}

/// Wraps the default backend, counting calls and optionally failing the
/// variant whose model-level `gNa` equals `fail_on`, or the n-th artifact
/// resolution (1-based) when `fail_resolution` is set.
#[derive(Default)]
pub struct CountingBackend {
    inner: ProgramGenerator,
    pub fail_on: Option<f64>,
    pub fail_resolution: Option<usize>,
    pub resolutions: AtomicUsize,
    pub invocations: AtomicUsize,
}

impl CountingBackend {
    pub fn failing_on(value: f64) -> Self {
        Self {
            fail_on: Some(value),
            ..Self::default()
        }
    }

    pub fn failing_resolution(nth: usize) -> Self {
        Self {
            fail_resolution: Some(nth),
            ..Self::default()
        }
    }

    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

impl SolverBackend for CountingBackend {
    fn resolve_artifact(
        &self,
        model: &Model,
        solver: &SolverConfig,
        root: &Path,
    ) -> Result<ArtifactHandle, StudyError> {
        let nth = self.resolutions.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_resolution == Some(nth) {
            return Err(StudyError::Artifact(ErrorInfo::new(
                "forced_codegen_failure",
                "code generation fault injected by the test backend",
            )));
        }
        self.inner.resolve_artifact(model, solver, root)
    }

    fn open_artifact(&self, path: &Path) -> Result<ArtifactHandle, StudyError> {
        self.inner.open_artifact(path)
    }

    fn parameter_set(&self, model: &Model) -> Result<ParameterSet, StudyError> {
        if let Some(value) = self.fail_on {
            if model.parameters.get("gNa") == Some(&value) {
                return Err(StudyError::Execution(ErrorInfo::new(
                    "forced_failure",
                    "integration fault injected by the test backend",
                )));
            }
        }
        self.inner.parameter_set(model)
    }

    fn write_parameters(
        &self,
        params: &ParameterSet,
        work_dir: &Path,
    ) -> Result<std::path::PathBuf, StudyError> {
        self.inner.write_parameters(params, work_dir)
    }

    fn invoke(
        &self,
        artifact: &ArtifactHandle,
        invocation: &Invocation<'_>,
    ) -> Result<RawOutput, StudyError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.inner.invoke(artifact, invocation)
    }
}

pub fn orchestrator_with(backend: &Arc<CountingBackend>) -> Orchestrator {
    Orchestrator::new().with_backend(backend.clone())
}

/// Comparable part of a record: everything except timestamps.
pub fn essence(record: &ResultRecord) -> (u32, Vec<String>, String, String) {
    (
        record.variant_id,
        record.labels.clone(),
        format!("{:?}", record.series),
        format!("{:?}", record.varied),
    )
}
