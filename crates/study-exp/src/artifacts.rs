use std::path::{Path, PathBuf};

use study_core::{ArtifactHandle, Model, ParameterSet, SolverBackend, SolverConfig, StudyError};
use tracing::{debug, info};

use crate::config::RegenerationPolicy;

/// Artifact plus the numeric values it should read for one variant.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedArtifact {
    /// Artifact handle.
    pub handle: ArtifactHandle,
    /// Parameter values of the effective model.
    pub params: ParameterSet,
    /// True when this call generated (or re-located) the artifact.
    pub regenerated: bool,
}

/// Minimizes artifact regeneration along a variant sequence.
///
/// The artifact is regenerated when none has been resolved yet or when the
/// regeneration policy says structural edits are in play; otherwise the
/// previous variant's artifact is reused. Generation failures propagate and
/// never fall back to the previous artifact.
pub struct SolverArtifactManager<'a> {
    backend: &'a dyn SolverBackend,
    policy: RegenerationPolicy,
    root: PathBuf,
    any_structural: bool,
    seen_structural: bool,
    preset: Option<PathBuf>,
    current: Option<ArtifactHandle>,
}

impl<'a> SolverArtifactManager<'a> {
    /// Creates a manager generating artifacts under `root`.
    ///
    /// `any_structural` is true when any variant of the study edits mechanism
    /// composition or equations.
    pub fn new(
        backend: &'a dyn SolverBackend,
        policy: RegenerationPolicy,
        root: impl Into<PathBuf>,
        any_structural: bool,
    ) -> Self {
        Self {
            backend,
            policy,
            root: root.into(),
            any_structural,
            seen_structural: false,
            preset: None,
            current: None,
        }
    }

    /// Starts from an artifact resolved elsewhere (a parallel parent or a
    /// batch submission).
    pub fn with_preset(mut self, path: Option<PathBuf>) -> Self {
        self.preset = path;
        self
    }

    /// Directory artifacts are generated under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn must_regenerate(&mut self, structural: bool) -> bool {
        self.seen_structural |= structural;
        if self.current.is_none() {
            return true;
        }
        match self.policy {
            RegenerationPolicy::Eager => self.any_structural,
            RegenerationPolicy::FromFirstStructural => self.seen_structural,
        }
    }

    /// Resolves the artifact for one variant's effective model.
    pub fn prepare(
        &mut self,
        model: &Model,
        solver: &SolverConfig,
        structural: bool,
    ) -> Result<ResolvedArtifact, StudyError> {
        if self.current.is_none() {
            if let Some(path) = self.preset.take() {
                let handle = self.backend.open_artifact(&path)?;
                debug!(artifact = %handle.key, "using shared artifact");
                self.current = Some(handle);
            }
        }
        let regenerate = self.must_regenerate(structural);
        let handle = match (&self.current, regenerate) {
            (Some(handle), false) => handle.clone(),
            _ => {
                let handle = self.backend.resolve_artifact(model, solver, &self.root)?;
                info!(artifact = %handle.key, structural, "resolved solver artifact");
                self.current = Some(handle.clone());
                handle
            }
        };
        let params = self.backend.parameter_set(model)?;
        Ok(ResolvedArtifact {
            handle,
            params,
            regenerated: regenerate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use study_core::{Invocation, RawOutput};

    #[derive(Default)]
    struct Stub {
        resolved: AtomicUsize,
    }

    impl SolverBackend for Stub {
        fn resolve_artifact(
            &self,
            _model: &Model,
            _solver: &SolverConfig,
            root: &Path,
        ) -> Result<ArtifactHandle, StudyError> {
            let n = self.resolved.fetch_add(1, Ordering::SeqCst);
            Ok(ArtifactHandle {
                key: format!("k{n}"),
                path: root.join(format!("k{n}")),
            })
        }

        fn open_artifact(&self, path: &Path) -> Result<ArtifactHandle, StudyError> {
            Ok(ArtifactHandle {
                key: "shared".into(),
                path: path.to_path_buf(),
            })
        }

        fn parameter_set(&self, _model: &Model) -> Result<ParameterSet, StudyError> {
            Ok(ParameterSet::new())
        }

        fn write_parameters(&self, _: &ParameterSet, work_dir: &Path) -> Result<PathBuf, StudyError> {
            Ok(work_dir.to_path_buf())
        }

        fn invoke(&self, _: &ArtifactHandle, _: &Invocation<'_>) -> Result<RawOutput, StudyError> {
            unreachable!("artifact policy tests never invoke")
        }
    }

    fn run(policy: RegenerationPolicy, flags: &[bool], preset: Option<PathBuf>) -> Vec<bool> {
        let stub = Stub::default();
        let any = flags.iter().any(|f| *f);
        let mut manager = SolverArtifactManager::new(&stub, policy, "root", any).with_preset(preset);
        let model = Model::new("m");
        flags
            .iter()
            .map(|structural| {
                manager
                    .prepare(&model, &SolverConfig::default(), *structural)
                    .expect("prepare")
                    .regenerated
            })
            .collect()
    }

    #[test]
    fn parameter_only_sequences_resolve_once() {
        let flags = [false, false, false];
        assert_eq!(run(RegenerationPolicy::Eager, &flags, None), vec![true, false, false]);
    }

    #[test]
    fn eager_policy_regenerates_everywhere_once_structural() {
        let flags = [false, false, true, false];
        assert_eq!(run(RegenerationPolicy::Eager, &flags, None), vec![true; 4]);
    }

    #[test]
    fn lazy_policy_regenerates_from_the_first_structural_variant() {
        let flags = [false, false, true, false];
        assert_eq!(
            run(RegenerationPolicy::FromFirstStructural, &flags, None),
            vec![true, false, true, true]
        );
    }

    #[test]
    fn preset_artifact_counts_as_resolved() {
        let flags = [false, false];
        assert_eq!(
            run(RegenerationPolicy::Eager, &flags, Some(PathBuf::from("shared"))),
            vec![false, false]
        );
    }
}
