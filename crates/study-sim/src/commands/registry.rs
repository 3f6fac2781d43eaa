use std::error::Error;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use study_core::StudyStore;
use study_exp::{reconcile, registry_append, registry_query, registry_rows, FsStudyStore, Query, Registry};

use crate::print_json;

#[derive(Args, Debug)]
pub struct RegistryArgs {
    #[command(subcommand)]
    pub command: RegistryCommand,
}

#[derive(Subcommand, Debug)]
pub enum RegistryCommand {
    /// Append one row per variant of a study directory.
    Append {
        /// Study directory holding `study.json`.
        #[arg(long)]
        dir: PathBuf,
        /// Registry file (`.csv`, `.sqlite` or `.db`).
        #[arg(long)]
        registry: PathBuf,
    },
    /// Query registry rows.
    Query {
        /// Registry file (`.csv`, `.sqlite` or `.db`).
        #[arg(long)]
        registry: PathBuf,
        /// Only rows of this plan hash.
        #[arg(long)]
        plan: Option<String>,
        /// Maximum number of rows.
        #[arg(long)]
        limit: Option<usize>,
    },
}

pub fn run(args: &RegistryArgs) -> Result<(), Box<dyn Error>> {
    match &args.command {
        RegistryCommand::Append { dir, registry } => {
            let store = FsStudyStore;
            let mut descriptor = store
                .load_descriptor(dir)?
                .ok_or_else(|| format!("no study descriptor in {}", dir.display()))?;
            reconcile(&store, &mut descriptor);
            let rows = registry_rows(&descriptor, &store, &chrono::Utc::now().to_rfc3339())?;
            registry_append(&Registry::from_path(registry), &rows)?;
            print_json(&serde_json::json!({ "appended": rows.len() }))
        }
        RegistryCommand::Query {
            registry,
            plan,
            limit,
        } => {
            let table = registry_query(
                &Registry::from_path(registry),
                &Query {
                    plan_hash: plan.clone(),
                    limit: *limit,
                },
            )?;
            print_json(&table)
        }
    }
}
