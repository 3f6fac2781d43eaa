use study_core::errors::{ErrorInfo, StudyError};
use study_core::{Method, NoiseSource, SolverConfig};

use crate::program::Program;

// Longer runs grow their channels as they go.
const MAX_RESERVED_SAMPLES: usize = 1 << 20;

/// Channels produced by an integration, in the program's internal order.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    /// `states..., monitors..., time`.
    pub channels: Vec<Vec<f64>>,
    /// Samples per channel.
    pub samples: usize,
}

/// Integrates `program` with bound slot values over the configured span.
pub fn integrate(
    program: &Program,
    slots: &[f64],
    solver: &SolverConfig,
    seed: u64,
) -> Result<Trace, StudyError> {
    let n = program.states.len();
    let mut state = Vec::with_capacity(n);
    let mut noise = Vec::with_capacity(n);
    for name in &program.states {
        state.push(slots[slot_index(program, &Program::initial_slot(name))?]);
        noise.push(slots[slot_index(program, &Program::noise_slot(name))?]);
    }
    let stochastic = noise.iter().any(|amp| *amp != 0.0);
    let mut noise_source = NoiseSource::from_seed(seed);

    let steps = checked_steps(solver)?;
    let stride = solver.downsample.max(1);
    let samples = (steps / stride).checked_add(1).ok_or_else(|| too_many_steps(solver))?;
    let width = n + program.monitors.len() + 1;
    let reserve = samples.min(MAX_RESERVED_SAMPLES);
    let mut channels: Vec<Vec<f64>> = (0..width).map(|_| Vec::with_capacity(reserve)).collect();

    let dt = solver.dt;
    let mut t = solver.tspan[0];
    record(program, slots, t, &state, &mut channels);

    let mut scratch = Scratch::new(n);
    for step in 1..=steps {
        match solver.method {
            Method::Euler => euler(program, slots, t, dt, &mut state, &mut scratch),
            Method::Rk2 => heun(program, slots, t, dt, &mut state, &mut scratch),
            Method::Rk4 => rk4(program, slots, t, dt, &mut state, &mut scratch),
        }
        if stochastic {
            for (value, amp) in state.iter_mut().zip(&noise) {
                if *amp != 0.0 {
                    *value += amp * noise_source.wiener_increment(dt);
                }
            }
        }
        t = solver.tspan[0] + step as f64 * dt;
        if let Some(idx) = state.iter().position(|v| !v.is_finite()) {
            return Err(StudyError::Execution(
                ErrorInfo::new("integrate_diverged", "state became non-finite")
                    .with_context("state", program.states[idx].clone())
                    .with_context("time", format!("{t}"))
                    .with_hint("reduce dt or check the model's parameters"),
            ));
        }
        if step % stride == 0 {
            record(program, slots, t, &state, &mut channels);
        }
    }

    let samples = channels.last().map(Vec::len).unwrap_or(0);
    Ok(Trace { channels, samples })
}

fn too_many_steps(solver: &SolverConfig) -> StudyError {
    StudyError::Execution(
        ErrorInfo::new("integrate_steps", "time span needs too many integration steps")
            .with_context("tspan", format!("[{}, {}]", solver.tspan[0], solver.tspan[1]))
            .with_context("dt", format!("{}", solver.dt))
            .with_context("max_steps", SolverConfig::MAX_STEPS.to_string()),
    )
}

fn checked_steps(solver: &SolverConfig) -> Result<usize, StudyError> {
    let ratio = solver.step_ratio();
    if !ratio.is_finite() || ratio > SolverConfig::MAX_STEPS as f64 {
        return Err(too_many_steps(solver));
    }
    Ok(solver.steps())
}

fn slot_index(program: &Program, slot: &str) -> Result<usize, StudyError> {
    program.slots.iter().position(|s| s == slot).ok_or_else(|| {
        StudyError::Execution(
            ErrorInfo::new("integrate_slot_missing", "program lacks a state slot")
                .with_context("slot", slot.to_string()),
        )
    })
}

fn record(program: &Program, slots: &[f64], t: f64, state: &[f64], channels: &mut [Vec<f64>]) {
    let n = state.len();
    for (idx, value) in state.iter().enumerate() {
        channels[idx].push(*value);
    }
    for (offset, expr) in program.monitor_exprs.iter().enumerate() {
        channels[n + offset].push(expr.eval(t, state, slots));
    }
    if let Some(time) = channels.last_mut() {
        time.push(t);
    }
}

struct Scratch {
    k: [Vec<f64>; 4],
    probe: Vec<f64>,
}

impl Scratch {
    fn new(n: usize) -> Self {
        Self {
            k: [vec![0.0; n], vec![0.0; n], vec![0.0; n], vec![0.0; n]],
            probe: vec![0.0; n],
        }
    }
}

fn derivatives(program: &Program, slots: &[f64], t: f64, state: &[f64], out: &mut [f64]) {
    for (slot, expr) in out.iter_mut().zip(&program.derivatives) {
        *slot = expr.eval(t, state, slots);
    }
}

fn euler(program: &Program, slots: &[f64], t: f64, dt: f64, state: &mut [f64], s: &mut Scratch) {
    derivatives(program, slots, t, state, &mut s.k[0]);
    for (value, d) in state.iter_mut().zip(&s.k[0]) {
        *value += dt * d;
    }
}

fn heun(program: &Program, slots: &[f64], t: f64, dt: f64, state: &mut [f64], s: &mut Scratch) {
    derivatives(program, slots, t, state, &mut s.k[0]);
    for i in 0..state.len() {
        s.probe[i] = state[i] + dt * s.k[0][i];
    }
    derivatives(program, slots, t + dt, &s.probe, &mut s.k[1]);
    for i in 0..state.len() {
        state[i] += 0.5 * dt * (s.k[0][i] + s.k[1][i]);
    }
}

fn rk4(program: &Program, slots: &[f64], t: f64, dt: f64, state: &mut [f64], s: &mut Scratch) {
    let half = 0.5 * dt;
    derivatives(program, slots, t, state, &mut s.k[0]);
    for i in 0..state.len() {
        s.probe[i] = state[i] + half * s.k[0][i];
    }
    derivatives(program, slots, t + half, &s.probe, &mut s.k[1]);
    for i in 0..state.len() {
        s.probe[i] = state[i] + half * s.k[1][i];
    }
    derivatives(program, slots, t + half, &s.probe, &mut s.k[2]);
    for i in 0..state.len() {
        s.probe[i] = state[i] + dt * s.k[2][i];
    }
    derivatives(program, slots, t + dt, &s.probe, &mut s.k[3]);
    for i in 0..state.len() {
        state[i] += dt / 6.0 * (s.k[0][i] + 2.0 * s.k[1][i] + 2.0 * s.k[2][i] + s.k[3][i]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::compile;
    use study_core::{Expr, Model, StateVariable};

    fn decay() -> Program {
        let model = Model::new("decay")
            .with_state(StateVariable::new(
                "x",
                1.0,
                Expr::neg(Expr::mul(Expr::param("k"), Expr::state("x"))),
            ))
            .with_parameter("k", 1.0);
        compile(&model).expect("compile")
    }

    fn solver(method: Method) -> SolverConfig {
        SolverConfig {
            method,
            tspan: [0.0, 1.0],
            dt: 0.01,
            downsample: 10,
            seed: 0,
        }
    }

    #[test]
    fn rk4_tracks_exponential_decay() {
        let program = decay();
        let trace = integrate(&program, &[1.0, 0.0, 1.0], &solver(Method::Rk4), 0).expect("run");
        assert_eq!(trace.samples, 11);
        let last = *trace.channels[0].last().expect("sample");
        assert!((last - (-1.0f64).exp()).abs() < 1e-8);
        let time = trace.channels.last().expect("time");
        assert!((time[10] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn lower_order_methods_are_less_accurate() {
        let program = decay();
        let exact = (-1.0f64).exp();
        let err = |method| {
            let trace = integrate(&program, &[1.0, 0.0, 1.0], &solver(method), 0).expect("run");
            (trace.channels[0].last().copied().unwrap_or_default() - exact).abs()
        };
        assert!(err(Method::Euler) > err(Method::Rk2));
        assert!(err(Method::Rk2) > err(Method::Rk4));
    }

    #[test]
    fn oversized_step_counts_are_execution_errors() {
        let program = decay();
        let huge = SolverConfig {
            dt: f64::MIN_POSITIVE,
            ..solver(Method::Euler)
        };
        let err = integrate(&program, &[1.0, 0.0, 1.0], &huge, 0).expect_err("too many steps");
        assert!(matches!(err, StudyError::Execution(_)));
        assert_eq!(err.info().code, "integrate_steps");
    }

    #[test]
    fn noise_is_seeded() {
        let program = decay();
        let run = |seed| {
            integrate(&program, &[1.0, 0.2, 1.0], &solver(Method::Euler), seed)
                .expect("run")
                .channels
        };
        assert_eq!(run(5), run(5));
        assert_ne!(run(5), run(6));
    }
}
