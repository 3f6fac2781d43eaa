use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use serde_json::{json, Value};
use study_core::{ResultRecord, StudyStore};
use study_exp::{load_study_file, registry_append, registry_rows, Orchestrator, Registry, StudyOutcome};
use study_model::{to_canonical_json_bytes, write_atomic};
use tracing::info;

use crate::print_json;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// YAML study file.
    #[arg(long)]
    pub study: PathBuf,
    /// Re-run variants even when their output exists.
    #[arg(long)]
    pub overwrite: bool,
    /// Write all result records as canonical JSON to this file.
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Append the study's variants to this registry afterwards.
    #[arg(long)]
    pub registry: Option<PathBuf>,
}

fn record_summary(record: &ResultRecord) -> Value {
    json!({
        "variant_id": record.variant_id,
        "samples": record.samples,
        "labels": record.labels,
        "varied": record.varied,
    })
}

pub fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let mut file = load_study_file(&args.study)?;
    if args.overwrite {
        file.config.cache.overwrite = true;
    }
    let orchestrator = Orchestrator::new();
    let outcome = orchestrator.run_study(&file)?;

    if let Some(out) = &args.out {
        write_atomic(out, &to_canonical_json_bytes(&outcome.results())?)?;
        info!(path = %out.display(), "results written");
    }
    if let (Some(path), Some(study_dir)) = (&args.registry, &file.config.study_dir) {
        if let Some(descriptor) = orchestrator.store().load_descriptor(study_dir)? {
            let rows = registry_rows(&descriptor, orchestrator.store(), &chrono::Utc::now().to_rfc3339())?;
            registry_append(&Registry::from_path(path), &rows)?;
        }
    }

    match outcome {
        StudyOutcome::Completed(results) => print_json(&json!({
            "status": "completed",
            "results": results.len(),
            "records": results.iter().map(record_summary).collect::<Vec<_>>(),
        })),
        StudyOutcome::Submitted(descriptor) => print_json(&json!({
            "status": "submitted",
            "study_dir": descriptor.study_dir,
            "submission": descriptor.submission,
        })),
        StudyOutcome::Failed(failure) => {
            print_json(&json!({
                "status": "failed",
                "variant_id": failure.variant_id,
                "error": failure.error,
                "results": failure.results.len(),
            }))?;
            Err(format!("study failed: {}", failure.error).into())
        }
    }
}
