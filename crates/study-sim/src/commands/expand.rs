use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use serde_json::json;
use study_exp::{load_study_file, varied_tags, Orchestrator};

use crate::print_json;

#[derive(Args, Debug)]
pub struct ExpandArgs {
    /// YAML study file.
    #[arg(long)]
    pub study: PathBuf,
}

pub fn run(args: &ExpandArgs) -> Result<(), Box<dyn Error>> {
    let file = load_study_file(&args.study)?;
    let descriptor = Orchestrator::new().describe(&file.model, &file.vary, &file.config)?;
    let variants: Vec<_> = descriptor
        .variants
        .iter()
        .map(|variant| {
            json!({
                "id": variant.id,
                "structural": variant.is_structural(),
                "status": variant.status,
                "tags": varied_tags(&file.config.modifications, &variant.modifications),
                "output_path": variant.output_path,
            })
        })
        .collect();
    print_json(&json!({
        "plan_hash": descriptor.plan_hash,
        "variants": variants,
    }))
}
