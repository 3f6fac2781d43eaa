use criterion::{criterion_group, criterion_main, Criterion};
use study_core::{Expr, Model, SolverConfig, StateVariable, VariationRow, VariationSpec};
use study_exp::{CacheOptions, Orchestrator, StudyConfig};
use tempfile::tempdir;

fn oscillator() -> Model {
    Model::new("oscillator")
        .with_state(StateVariable::new("x", 1.0, Expr::state("y")))
        .with_state(StateVariable::new(
            "y",
            0.0,
            Expr::neg(Expr::mul(Expr::param("k"), Expr::state("x"))),
        ))
        .with_parameter("k", 1.0)
}

fn bench_study(c: &mut Criterion) {
    let model = oscillator();
    let vary = VariationSpec::cross(vec![VariationRow::numeric(
        "",
        "k",
        (1..=16).map(f64::from),
    )]);
    let solver = SolverConfig {
        tspan: [0.0, 10.0],
        dt: 0.01,
        downsample: 10,
        ..SolverConfig::default()
    };
    let orchestrator = Orchestrator::new();

    c.bench_function("study_sequential_memory", |b| {
        let config = StudyConfig {
            solver: solver.clone(),
            ..StudyConfig::default()
        };
        b.iter(|| orchestrator.run(&model, &vary, &config).expect("bench run"));
    });

    c.bench_function("study_sequential_saved", |b| {
        b.iter(|| {
            let dir = tempdir().expect("bench dir");
            let config = StudyConfig {
                solver: solver.clone(),
                study_dir: Some(dir.path().to_path_buf()),
                cache: CacheOptions {
                    save: true,
                    overwrite: false,
                },
                ..StudyConfig::default()
            };
            orchestrator.run(&model, &vary, &config).expect("bench run")
        });
    });
}

criterion_group!(benches, bench_study);
criterion_main!(benches);
