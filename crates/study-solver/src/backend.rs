use std::path::{Path, PathBuf};

use study_core::errors::{ErrorInfo, StudyError};
use study_core::{
    ArtifactHandle, Invocation, Model, OutputMode, ParameterSet, RawOutput, SeriesData,
    SolverBackend, SolverConfig,
};
use study_model::{from_json_slice, read_file, stable_hash_string, to_canonical_json_bytes, write_atomic};
use tracing::{debug, info};

use crate::integrate::integrate;
use crate::output::write_csv;
use crate::program::{compile, parameter_values, Program};

/// File holding the compiled program inside an artifact directory.
pub const PROGRAM_FILE: &str = "program.json";
/// Parameter file read from the invocation's work directory.
pub const PARAMS_FILE: &str = "params.json";
/// CSV written in disk output mode.
pub const OUTPUT_FILE: &str = "output.csv";

/// Default backend: compiles models into `program.json` artifacts keyed by
/// structural shape and integrates them with the built-in fixed-step solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgramGenerator;

impl ProgramGenerator {
    /// Shape key of `model`: the stable hash of its compiled program.
    pub fn shape_key(model: &Model) -> Result<String, StudyError> {
        let program = compile(model)?;
        stable_hash_string(&program)
    }

    /// Loads the program stored in an artifact directory.
    pub fn load_program(artifact: &ArtifactHandle) -> Result<Program, StudyError> {
        let path = artifact.path.join(PROGRAM_FILE);
        let bytes = read_file(&path).map_err(|err| artifact_error("artifact_read", &path, err))?;
        from_json_slice(&bytes).map_err(|err| artifact_error("artifact_decode", &path, err))
    }
}

fn artifact_error(code: &str, path: &Path, err: StudyError) -> StudyError {
    StudyError::Artifact(
        ErrorInfo::new(code, err.info().message.clone())
            .with_context("path", path.display().to_string()),
    )
}

impl SolverBackend for ProgramGenerator {
    fn resolve_artifact(
        &self,
        model: &Model,
        solver: &SolverConfig,
        root: &Path,
    ) -> Result<ArtifactHandle, StudyError> {
        let program = compile(model)?;
        let key = stable_hash_string(&program)?;
        let dir = root.join(&key);
        let file = dir.join(PROGRAM_FILE);
        if file.exists() {
            debug!(artifact = %key, "reusing generated program");
        } else {
            let bytes = to_canonical_json_bytes(&program)?;
            write_atomic(&file, &bytes).map_err(|err| artifact_error("artifact_write", &file, err))?;
            info!(
                artifact = %key,
                states = program.states.len(),
                method = ?solver.method,
                "generated solver program"
            );
        }
        Ok(ArtifactHandle { key, path: dir })
    }

    fn open_artifact(&self, path: &Path) -> Result<ArtifactHandle, StudyError> {
        let handle = ArtifactHandle {
            key: path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string(),
            path: path.to_path_buf(),
        };
        Self::load_program(&handle)?;
        Ok(handle)
    }

    fn parameter_set(&self, model: &Model) -> Result<ParameterSet, StudyError> {
        let program = compile(model)?;
        parameter_values(model, &program)
    }

    fn write_parameters(
        &self,
        params: &ParameterSet,
        work_dir: &Path,
    ) -> Result<PathBuf, StudyError> {
        let path = work_dir.join(PARAMS_FILE);
        write_atomic(&path, &to_canonical_json_bytes(params)?)?;
        Ok(path)
    }

    fn invoke(
        &self,
        artifact: &ArtifactHandle,
        invocation: &Invocation<'_>,
    ) -> Result<RawOutput, StudyError> {
        let program = Self::load_program(artifact)?;
        let params_path = invocation.work_dir.join(PARAMS_FILE);
        let params: ParameterSet = from_json_slice(&read_file(&params_path)?)?;
        let slots = program.bind(&params)?;
        let trace = integrate(&program, &slots, invocation.solver, invocation.seed)?;
        let labels = program.internal_labels();
        let series = match invocation.output {
            OutputMode::Memory => SeriesData::Memory {
                channels: trace.channels,
            },
            OutputMode::Disk => {
                let path = invocation.work_dir.join(OUTPUT_FILE);
                write_csv(&path, &labels, &trace.channels)?;
                SeriesData::Disk { path }
            }
        };
        debug!(artifact = %artifact.key, samples = trace.samples, "integration finished");
        Ok(RawOutput {
            labels,
            samples: trace.samples,
            series,
        })
    }
}
