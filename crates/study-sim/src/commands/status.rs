use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use serde_json::json;
use study_core::StudyStore;
use study_exp::{reconcile, FsStudyStore};

use crate::print_json;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Study directory holding `study.json`.
    #[arg(long)]
    pub dir: PathBuf,
}

pub fn run(args: &StatusArgs) -> Result<(), Box<dyn Error>> {
    let store = FsStudyStore;
    let mut descriptor = store
        .load_descriptor(&args.dir)?
        .ok_or_else(|| format!("no study descriptor in {}", args.dir.display()))?;
    reconcile(&store, &mut descriptor);
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for variant in &descriptor.variants {
        *counts.entry(format!("{:?}", variant.status).to_lowercase()).or_default() += 1;
    }
    let variants: Vec<_> = descriptor
        .variants
        .iter()
        .map(|v| {
            json!({
                "id": v.id,
                "status": v.status,
                "duration_secs": v.duration_secs,
                "error": v.error,
            })
        })
        .collect();
    print_json(&json!({
        "state": descriptor.state,
        "plan_hash": descriptor.plan_hash,
        "counts": counts,
        "variants": variants,
    }))
}
