use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use study_core::{Expr, Model, SolverConfig, StateVariable, VariationRow, VariationSpec};
use study_exp::{CacheOptions, StudyConfig, StudyFile};
use tempfile::tempdir;

fn study_file(dir: &Path) -> StudyFile {
    let model = Model::new("decay")
        .with_state(StateVariable::new(
            "x",
            1.0,
            Expr::neg(Expr::mul(Expr::param("k"), Expr::state("x"))),
        ))
        .with_parameter("k", 1.0);
    let solver = SolverConfig {
        tspan: [0.0, 1.0],
        dt: 0.01,
        downsample: 10,
        ..SolverConfig::default()
    };
    StudyFile {
        model,
        vary: VariationSpec::cross(vec![VariationRow::numeric("", "k", vec![0.5, 1.0, 2.0])]),
        config: StudyConfig {
            solver,
            study_dir: Some(dir.join("study")),
            cache: CacheOptions {
                save: true,
                overwrite: false,
            },
            ..StudyConfig::default()
        },
    }
}

fn write_study(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("study.yaml");
    let text = serde_yaml::to_string(&study_file(dir)).expect("yaml");
    std::fs::write(&path, text).expect("write study file");
    path
}

fn study_sim(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_study-sim"))
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("spawn study-sim")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn expand_lists_variants_without_running() {
    let dir = tempdir().expect("tempdir");
    let study = write_study(dir.path());
    let output = study_sim(&["expand", "--study", study.to_str().expect("utf8")]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    let variants = json["variants"].as_array().expect("variants");
    assert_eq!(variants.len(), 3);
    assert_eq!(variants[0]["id"], 1);
    assert_eq!(variants[2]["tags"]["k"], 2.0);
    assert_eq!(variants[0]["structural"], false);
    assert!(!dir.path().join("study").join("study.json").exists());
}

#[test]
fn run_then_status_and_registry() {
    let dir = tempdir().expect("tempdir");
    let study = write_study(dir.path());
    let results = dir.path().join("results.json");
    let registry = dir.path().join("registry.csv");
    let output = study_sim(&[
        "run",
        "--study",
        study.to_str().expect("utf8"),
        "--out",
        results.to_str().expect("utf8"),
        "--registry",
        registry.to_str().expect("utf8"),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let summary = stdout_json(&output);
    assert_eq!(summary["status"], "completed");
    assert_eq!(summary["results"], 3);
    assert_eq!(summary["records"][0]["labels"][0], "time");

    let written: Value =
        serde_json::from_slice(&std::fs::read(&results).expect("results file")).expect("json");
    assert_eq!(written.as_array().map(Vec::len), Some(3));

    let study_dir = dir.path().join("study");
    let status = study_sim(&["status", "--dir", study_dir.to_str().expect("utf8")]);
    assert!(status.status.success());
    let status = stdout_json(&status);
    assert_eq!(status["state"], "success");
    assert_eq!(status["counts"]["finished"], 3);

    let query = study_sim(&["registry", "query", "--registry", registry.to_str().expect("utf8")]);
    assert!(query.status.success());
    let table = stdout_json(&query);
    assert_eq!(table["rows"].as_array().map(Vec::len), Some(3));
}

#[test]
fn failed_study_exits_non_zero() {
    let dir = tempdir().expect("tempdir");
    let mut file = study_file(dir.path());
    file.vary = VariationSpec::cross(vec![VariationRow::numeric("", "k", vec![1.0, 1e6])]);
    let path = dir.path().join("diverging.yaml");
    std::fs::write(&path, serde_yaml::to_string(&file).expect("yaml")).expect("write");
    let output = study_sim(&["run", "--study", path.to_str().expect("utf8")]);
    assert!(!output.status.success());
    let summary = stdout_json(&output);
    assert_eq!(summary["status"], "failed");
    assert_eq!(summary["variant_id"], 2);
}
