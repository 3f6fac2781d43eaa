use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rayon::prelude::*;
use serde::Serialize;
use study_core::errors::{ErrorInfo, StudyError};
use study_core::{
    Model, ModelModifier, ModelNormalizer, ModificationSet, ResultRecord, SchemaVersion,
    SolverBackend, SolverConfig, StudyDescriptor, StudyState, StudyStore, VariantId,
    VariantRecord, VariantStatus, VariationSpec,
};
use study_model::{stable_hash_string, StandardModeler};
use study_solver::ProgramGenerator;
use tracing::{debug, info, info_span, instrument, warn};

use crate::aggregate::ResultAggregator;
use crate::artifacts::SolverArtifactManager;
use crate::cache::CacheGate;
use crate::config::{ExecutionMode, StudyConfig, StudyFile};
use crate::expand::{expand_variants, ExpandedVariant};
use crate::experiment::{delegate_config, Experiment};
use crate::recovery::{FailureRecoveryManager, StudyFailure};
use crate::runner::{variant_work_dir, RunSettings, VariantRunner};
use crate::store::{reconcile, variant_output_path, FsStudyStore};
use crate::submit::{BatchSubmitter, ClusterJob, ScriptSubmitter};
use crate::tags::varied_tags;

/// Result of a study invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum StudyOutcome {
    /// Every selected variant finished; results are ordered by variant id.
    Completed(Vec<ResultRecord>),
    /// Jobs were handed to a batch system; completion is external.
    Submitted(StudyDescriptor),
    /// A variant failed; the partial descriptor and results are preserved.
    Failed(StudyFailure),
}

impl StudyOutcome {
    /// Results available in-process, if any.
    pub fn results(&self) -> &[ResultRecord] {
        match self {
            StudyOutcome::Completed(results) => results,
            StudyOutcome::Failed(failure) => &failure.results,
            StudyOutcome::Submitted(_) => &[],
        }
    }

    /// True unless the study failed.
    pub fn is_success(&self) -> bool {
        !matches!(self, StudyOutcome::Failed(_))
    }
}

#[derive(Serialize)]
struct PlanKey<'a> {
    model: &'a Model,
    vary: &'a VariationSpec,
    solver: &'a SolverConfig,
    modifications: &'a ModificationSet,
}

/// Normalized inputs and locations shared by every variant of a study.
struct StudyPlan {
    base: Model,
    vary: VariationSpec,
    variants: Vec<ExpandedVariant>,
    plan_hash: String,
    root: PathBuf,
    work_root: PathBuf,
    artifact_root: PathBuf,
}

type LoopResult = Result<(StudyDescriptor, Vec<ResultRecord>), StudyFailure>;

/// Entry point coordinating expansion, caching, artifact reuse, execution
/// and recovery for a study.
#[derive(Clone)]
pub struct Orchestrator {
    normalizer: Arc<dyn ModelNormalizer>,
    modifier: Arc<dyn ModelModifier>,
    backend: Arc<dyn SolverBackend>,
    store: Arc<dyn StudyStore>,
    submitter: Arc<dyn BatchSubmitter>,
    experiment: Option<Arc<dyn Experiment>>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    /// Orchestrator wired to the default collaborators.
    pub fn new() -> Self {
        Self {
            normalizer: Arc::new(StandardModeler),
            modifier: Arc::new(StandardModeler),
            backend: Arc::new(ProgramGenerator),
            store: Arc::new(FsStudyStore),
            submitter: Arc::new(ScriptSubmitter::default()),
            experiment: None,
        }
    }

    /// Replaces the model normalizer.
    pub fn with_normalizer(mut self, normalizer: Arc<dyn ModelNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Replaces the model modifier.
    pub fn with_modifier(mut self, modifier: Arc<dyn ModelModifier>) -> Self {
        self.modifier = modifier;
        self
    }

    /// Replaces the solver backend.
    pub fn with_backend(mut self, backend: Arc<dyn SolverBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Replaces the result store.
    pub fn with_store(mut self, store: Arc<dyn StudyStore>) -> Self {
        self.store = store;
        self
    }

    /// Replaces the batch submitter.
    pub fn with_submitter(mut self, submitter: Arc<dyn BatchSubmitter>) -> Self {
        self.submitter = submitter;
        self
    }

    /// Runs `experiment` in place of a plain simulation for every variant.
    pub fn with_experiment(mut self, experiment: Arc<dyn Experiment>) -> Self {
        self.experiment = Some(experiment);
        self
    }

    /// Store used for results and descriptors.
    pub fn store(&self) -> &dyn StudyStore {
        self.store.as_ref()
    }

    fn without_experiment(&self) -> Self {
        Self {
            experiment: None,
            ..self.clone()
        }
    }

    /// Runs a study file.
    pub fn run_study(&self, file: &StudyFile) -> Result<StudyOutcome, StudyError> {
        self.run(&file.model, &file.vary, &file.config)
    }

    /// Runs a study.
    ///
    /// `Err` is returned only for problems found before any variant starts:
    /// invalid options, a malformed model or variation table, or a study
    /// directory holding a different plan. Failures of individual variants
    /// are reported as [`StudyOutcome::Failed`].
    #[instrument(skip_all, name = "study", fields(mode = ?config.mode))]
    pub fn run(
        &self,
        model: &Model,
        vary: &VariationSpec,
        config: &StudyConfig,
    ) -> Result<StudyOutcome, StudyError> {
        let plan = self.plan(model, vary, config)?;
        let descriptor = self.prepare_descriptor(&plan, config)?;
        info!(
            variants = plan.variants.len(),
            plan = %plan.plan_hash,
            structural = descriptor.any_structural(),
            "study prepared"
        );

        if config.mode == ExecutionMode::Cluster {
            return Ok(self.submit(&plan, descriptor, config));
        }
        let outcome = if config.mode == ExecutionMode::Parallel && config.only_variant.is_none() {
            self.run_parallel(&plan, descriptor, config)
        } else {
            self.run_sequential(&plan, descriptor, config)
        };
        Ok(match outcome {
            Ok((_, results)) => StudyOutcome::Completed(results),
            Err(failure) => StudyOutcome::Failed(failure),
        })
    }

    /// Expands a study without running it, reusing a stored descriptor when
    /// one exists.
    pub fn describe(
        &self,
        model: &Model,
        vary: &VariationSpec,
        config: &StudyConfig,
    ) -> Result<StudyDescriptor, StudyError> {
        let plan = self.plan(model, vary, config)?;
        self.prepare_descriptor(&plan, config)
    }

    fn plan(
        &self,
        model: &Model,
        vary: &VariationSpec,
        config: &StudyConfig,
    ) -> Result<StudyPlan, StudyError> {
        config.validate(self.experiment.is_some())?;
        let base = self.normalizer.normalize(model)?;
        let variants = expand_variants(&base, vary, self.modifier.as_ref())?;
        let plan_hash = stable_hash_string(&PlanKey {
            model: &base,
            vary,
            solver: &config.solver,
            modifications: &config.modifications,
        })?;
        let root = match &config.study_dir {
            Some(dir) => dir.clone(),
            None => {
                let short = plan_hash.get(..16).unwrap_or(&plan_hash);
                std::env::temp_dir().join("study-scratch").join(short)
            }
        };
        let artifact_root = config
            .artifact_root
            .clone()
            .unwrap_or_else(|| root.join("artifacts"));
        Ok(StudyPlan {
            base,
            vary: vary.clone(),
            variants,
            plan_hash,
            work_root: root.join("work"),
            artifact_root,
            root,
        })
    }

    fn prepare_descriptor(
        &self,
        plan: &StudyPlan,
        config: &StudyConfig,
    ) -> Result<StudyDescriptor, StudyError> {
        if let (Some(dir), true) = (&config.study_dir, config.cache.save) {
            if let Some(mut existing) = self.store.load_descriptor(dir)? {
                if existing.plan_hash != plan.plan_hash {
                    return Err(StudyError::Config(
                        ErrorInfo::new(
                            "study_plan_mismatch",
                            "study directory holds a different study",
                        )
                        .with_context("study_dir", dir.display().to_string())
                        .with_context("stored", existing.plan_hash.clone())
                        .with_context("requested", plan.plan_hash.clone())
                        .with_hint("use a fresh study directory to change the plan"),
                    ));
                }
                let caught_up = reconcile(self.store.as_ref(), &mut existing);
                debug!(resumed = existing.variants.len(), caught_up = caught_up.len(), "resuming study");
                return Ok(existing);
            }
        }
        let now = Utc::now().to_rfc3339();
        Ok(StudyDescriptor {
            schema_version: SchemaVersion::default(),
            study_dir: config.study_dir.clone(),
            plan_hash: plan.plan_hash.clone(),
            base_model: plan.base.clone(),
            solver: config.solver.clone(),
            variants: plan
                .variants
                .iter()
                .map(|v| {
                    VariantRecord::pending(
                        v.id,
                        v.modifications.clone(),
                        variant_output_path(&plan.root, v.id),
                    )
                })
                .collect(),
            state: StudyState::Running,
            created_at: now.clone(),
            updated_at: now,
            submission: None,
        })
    }

    fn run_sequential(
        &self,
        plan: &StudyPlan,
        mut descriptor: StudyDescriptor,
        config: &StudyConfig,
    ) -> LoopResult {
        let guard = FailureRecoveryManager::enter(self.store.as_ref(), config.persists_descriptor());
        if let Err(err) = guard.begin(&mut descriptor) {
            return Err(guard.fail(descriptor, None, err, Vec::new()));
        }
        let selected: Vec<VariantRecord> = descriptor
            .variants
            .iter()
            .filter(|v| config.only_variant.map_or(true, |id| v.id == id))
            .cloned()
            .collect();
        if selected.is_empty() {
            let err = StudyError::Config(
                ErrorInfo::new("study_unknown_variant", "no variant matches the selection")
                    .with_context("variant", format!("{:?}", config.only_variant)),
            );
            return Err(guard.fail(descriptor, None, err, Vec::new()));
        }

        let mut aggregator = ResultAggregator::new(selected.len());
        if let Err((variant_id, err)) =
            self.run_variants(plan, &selected, config, &guard, &mut descriptor, &mut aggregator)
        {
            return Err(guard.fail(descriptor, variant_id, err, aggregator.finish()));
        }
        let results = aggregator.finish();
        match guard.succeed(&mut descriptor) {
            Ok(()) => {
                info!(results = results.len(), "study finished");
                Ok((descriptor, results))
            }
            Err(error) => Err(StudyFailure {
                descriptor,
                variant_id: None,
                error,
                results,
            }),
        }
    }

    fn run_variants(
        &self,
        plan: &StudyPlan,
        selected: &[VariantRecord],
        config: &StudyConfig,
        guard: &FailureRecoveryManager<'_>,
        descriptor: &mut StudyDescriptor,
        aggregator: &mut ResultAggregator,
    ) -> Result<(), (Option<VariantId>, StudyError)> {
        let cache = CacheGate::new(self.store.as_ref(), config.cache);
        let mut artifacts = SolverArtifactManager::new(
            self.backend.as_ref(),
            config.regeneration,
            plan.artifact_root.clone(),
            descriptor.any_structural(),
        )
        .with_preset(config.artifact_path.clone());
        let runner = VariantRunner::new(self.backend.as_ref());

        for record in selected {
            let id = record.id;
            let _span = info_span!("variant", id).entered();
            let fail = |err: StudyError| (Some(id), err);

            if let Some(records) = cache.lookup(record).map_err(fail)? {
                if record.status != VariantStatus::Finished {
                    guard
                        .transition(descriptor, id, VariantStatus::Finished)
                        .map_err(fail)?;
                }
                aggregator.push(records);
                continue;
            }

            guard
                .transition(descriptor, id, VariantStatus::Started)
                .map_err(fail)?;
            let started = Instant::now();
            let executed = self.execute_variant(plan, record, config, &mut artifacts, &runner);
            descriptor.record_duration(id, started.elapsed());
            let (records, artifact_path) = executed.map_err(fail)?;
            if config.cache.save {
                self.store
                    .save(&records, &record.output_path)
                    .map_err(fail)?;
            }
            if let Some(entry) = descriptor.variant_mut(id) {
                entry.artifact_path = artifact_path;
            }
            guard
                .transition(descriptor, id, VariantStatus::Finished)
                .map_err(fail)?;
            info!(elapsed = started.elapsed().as_secs_f64(), "variant finished");
            aggregator.push(records);
        }
        Ok(())
    }

    fn execute_variant(
        &self,
        plan: &StudyPlan,
        record: &VariantRecord,
        config: &StudyConfig,
        artifacts: &mut SolverArtifactManager<'_>,
        runner: &VariantRunner<'_>,
    ) -> Result<(Vec<ResultRecord>, Option<PathBuf>), StudyError> {
        let modifications = config.modifications.chain(&record.modifications);
        let model = self.modifier.apply(&plan.base, &modifications)?;

        if let Some(experiment) = &self.experiment {
            let work_dir = variant_work_dir(&plan.work_root, record.id);
            let nested = delegate_config(config, &work_dir);
            debug!(experiment = experiment.name(), "delegating variant");
            let mut records = experiment.run(&model, &nested, &self.without_experiment())?;
            let varied = varied_tags(&config.modifications, &record.modifications);
            for result in &mut records {
                result.variant_id = record.id;
                result
                    .varied
                    .extend(varied.iter().map(|(k, v)| (k.clone(), v.clone())));
                if config.include_model && result.model.is_none() {
                    result.model = Some(model.clone());
                }
            }
            return Ok((records, None));
        }

        let resolved = artifacts.prepare(&model, &config.solver, record.is_structural())?;
        let result = runner.run(
            record.id,
            &model,
            &resolved,
            &record.modifications,
            RunSettings {
                config,
                plan_hash: &plan.plan_hash,
                work_root: &plan.work_root,
            },
        )?;
        Ok((vec![result], Some(resolved.handle.path)))
    }

    /// Best-effort artifact for the base model, shared with workers and jobs.
    fn shared_artifact(
        &self,
        plan: &StudyPlan,
        descriptor: &StudyDescriptor,
        config: &StudyConfig,
    ) -> Option<PathBuf> {
        if config.artifact_path.is_some() {
            return config.artifact_path.clone();
        }
        if self.experiment.is_some() || descriptor.any_structural() {
            return None;
        }
        let resolved = self
            .modifier
            .apply(&plan.base, &config.modifications)
            .and_then(|model| {
                self.backend
                    .resolve_artifact(&model, &config.solver, &plan.artifact_root)
            });
        match resolved {
            Ok(handle) => Some(handle.path),
            Err(err) => {
                warn!(error = %err, "no shared artifact; workers resolve their own");
                None
            }
        }
    }

    fn run_parallel(
        &self,
        plan: &StudyPlan,
        mut descriptor: StudyDescriptor,
        config: &StudyConfig,
    ) -> LoopResult {
        let guard = FailureRecoveryManager::enter(self.store.as_ref(), config.persists_descriptor());
        if let Err(err) = guard.begin(&mut descriptor) {
            return Err(guard.fail(descriptor, None, err, Vec::new()));
        }
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .build()
        {
            Ok(pool) => pool,
            Err(err) => {
                let err = StudyError::Execution(ErrorInfo::new("thread_pool", err.to_string()));
                return Err(guard.fail(descriptor, None, err, Vec::new()));
            }
        };
        let shared = self.shared_artifact(plan, &descriptor, config);
        let ids: Vec<VariantId> = descriptor.variants.iter().map(|v| v.id).collect();
        info!(workers = config.workers, variants = ids.len(), "dispatching to workers");

        let template = descriptor.clone();
        let outcomes: Vec<(VariantId, LoopResult)> = pool.install(|| {
            ids.par_iter()
                .map(|&id| {
                    let worker = StudyConfig {
                        mode: ExecutionMode::Sequential,
                        only_variant: Some(id),
                        artifact_path: shared.clone(),
                        ..config.clone()
                    };
                    (id, self.run_sequential(plan, template.clone(), &worker))
                })
                .collect()
        });

        let mut results = Vec::new();
        let mut first_failure: Option<(Option<VariantId>, StudyError)> = None;
        for (id, outcome) in outcomes {
            let (worker_descriptor, worker_results) = match outcome {
                Ok(done) => done,
                Err(failure) => {
                    first_failure.get_or_insert((Some(id), failure.error));
                    (failure.descriptor, failure.results)
                }
            };
            if let (Some(entry), Some(source)) =
                (descriptor.variant_mut(id), worker_descriptor.variant(id))
            {
                *entry = source.clone();
            }
            results.extend(worker_results);
        }
        results.sort_by_key(|r| r.variant_id);

        if let Some((variant_id, err)) = first_failure {
            return Err(guard.fail(descriptor, variant_id, err, results));
        }
        match guard.succeed(&mut descriptor) {
            Ok(()) => Ok((descriptor, results)),
            Err(error) => Err(StudyFailure {
                descriptor,
                variant_id: None,
                error,
                results,
            }),
        }
    }

    fn submit(
        &self,
        plan: &StudyPlan,
        mut descriptor: StudyDescriptor,
        config: &StudyConfig,
    ) -> StudyOutcome {
        let guard = FailureRecoveryManager::enter(self.store.as_ref(), config.persists_descriptor());
        let outstanding: Vec<VariantId> = descriptor
            .variants
            .iter()
            .filter(|v| config.cache.overwrite || v.status != VariantStatus::Finished)
            .map(|v| v.id)
            .collect();
        if outstanding.is_empty() {
            info!("every variant already finished; nothing to submit");
            return match guard.succeed(&mut descriptor) {
                Ok(()) => StudyOutcome::Submitted(descriptor),
                Err(error) => StudyOutcome::Failed(StudyFailure {
                    descriptor,
                    variant_id: None,
                    error,
                    results: Vec::new(),
                }),
            };
        }
        let job_config = StudyConfig {
            artifact_path: self.shared_artifact(plan, &descriptor, config),
            ..config.clone()
        };
        let submitted = self.submitter.submit(&ClusterJob {
            descriptor: &descriptor,
            model: &plan.base,
            vary: &plan.vary,
            config: &job_config,
            outstanding: &outstanding,
        });
        match submitted {
            Ok(submission) => {
                info!(jobs = submission.jobs.len(), "study submitted");
                descriptor.submission = Some(submission);
                match guard.submitted(&mut descriptor) {
                    Ok(()) => StudyOutcome::Submitted(descriptor),
                    Err(error) => StudyOutcome::Failed(StudyFailure {
                        descriptor,
                        variant_id: None,
                        error,
                        results: Vec::new(),
                    }),
                }
            }
            Err(err) => StudyOutcome::Failed(guard.fail(descriptor, None, err, Vec::new())),
        }
    }
}
