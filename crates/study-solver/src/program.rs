use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use study_core::errors::{ErrorInfo, StudyError};
use study_core::{Expr, Model, ParameterSet};

/// Expression with state and parameter references resolved to indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompiledExpr {
    /// Literal constant.
    Const(f64),
    /// Index into the state vector.
    State(usize),
    /// Index into the parameter slot vector.
    Slot(usize),
    /// Integration time.
    Time,
    /// Sum of operands.
    Sum(Vec<CompiledExpr>),
    /// Product of operands.
    Product(Vec<CompiledExpr>),
    /// Difference.
    Sub(Box<CompiledExpr>, Box<CompiledExpr>),
    /// Quotient.
    Div(Box<CompiledExpr>, Box<CompiledExpr>),
    /// Negation.
    Neg(Box<CompiledExpr>),
    /// Natural exponential.
    Exp(Box<CompiledExpr>),
    /// Power.
    Pow(Box<CompiledExpr>, Box<CompiledExpr>),
}

impl CompiledExpr {
    /// Evaluates the expression.
    pub fn eval(&self, t: f64, states: &[f64], slots: &[f64]) -> f64 {
        match self {
            CompiledExpr::Const(value) => *value,
            CompiledExpr::State(idx) => states[*idx],
            CompiledExpr::Slot(idx) => slots[*idx],
            CompiledExpr::Time => t,
            CompiledExpr::Sum(items) => items.iter().map(|e| e.eval(t, states, slots)).sum(),
            CompiledExpr::Product(items) => {
                items.iter().map(|e| e.eval(t, states, slots)).product()
            }
            CompiledExpr::Sub(lhs, rhs) => lhs.eval(t, states, slots) - rhs.eval(t, states, slots),
            CompiledExpr::Div(lhs, rhs) => lhs.eval(t, states, slots) / rhs.eval(t, states, slots),
            CompiledExpr::Neg(inner) => -inner.eval(t, states, slots),
            CompiledExpr::Exp(inner) => inner.eval(t, states, slots).exp(),
            CompiledExpr::Pow(base, exponent) => base
                .eval(t, states, slots)
                .powf(exponent.eval(t, states, slots)),
        }
    }
}

/// Generated program: everything about a model that shapes the code, and
/// nothing about its numeric values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// State variable names in integration order.
    pub states: Vec<String>,
    /// Monitor names in output order.
    pub monitors: Vec<String>,
    /// Parameter slot names; the parameter file supplies one value per slot.
    pub slots: Vec<String>,
    /// One derivative expression per state.
    pub derivatives: Vec<CompiledExpr>,
    /// One expression per monitor.
    pub monitor_exprs: Vec<CompiledExpr>,
}

impl Program {
    /// Internal channel labels: states, monitors, then time.
    pub fn internal_labels(&self) -> Vec<String> {
        self.states
            .iter()
            .chain(self.monitors.iter())
            .cloned()
            .chain(std::iter::once(study_core::TIME_LABEL.to_string()))
            .collect()
    }

    /// Slot holding a state's initial condition.
    pub fn initial_slot(state: &str) -> String {
        format!("{state}.initial")
    }

    /// Slot holding a state's noise amplitude.
    pub fn noise_slot(state: &str) -> String {
        format!("{state}.noise")
    }

    /// Orders a parameter set by slot, failing on missing or non-finite values.
    pub fn bind(&self, params: &ParameterSet) -> Result<Vec<f64>, StudyError> {
        self.slots
            .iter()
            .map(|slot| match params.get(slot) {
                Some(value) if value.is_finite() => Ok(*value),
                Some(_) => Err(StudyError::Execution(
                    ErrorInfo::new("program_slot_non_finite", "parameter value is not finite")
                        .with_context("slot", slot.clone()),
                )),
                None => Err(StudyError::Execution(
                    ErrorInfo::new("program_slot_missing", "parameter file lacks a slot")
                        .with_context("slot", slot.clone()),
                )),
            })
            .collect()
    }
}

/// Compiles a normalized model into a [`Program`].
pub fn compile(model: &Model) -> Result<Program, StudyError> {
    let states: Vec<String> = model.state_variables.iter().map(|s| s.name.clone()).collect();
    let mut builder = SlotTable::default();
    for state in &states {
        builder.slot(Program::initial_slot(state));
        builder.slot(Program::noise_slot(state));
    }

    let mut terms: Vec<Vec<CompiledExpr>> = Vec::with_capacity(states.len());
    for state in &model.state_variables {
        let scope = ScopeRef { component: None };
        terms.push(vec![lower(&state.equation, &states, model, scope, &mut builder)?]);
    }

    for (name, component) in &model.components {
        let scope = ScopeRef {
            component: Some(name.as_str()),
        };
        let attached = component.mechanisms.iter().filter_map(|m| model.mechanisms.get(m));
        let equations = component
            .equations
            .iter()
            .chain(attached.flat_map(|mechanism| mechanism.equations.iter()));
        for equation in equations {
            let idx = state_index(&states, &equation.variable)?;
            let lowered = lower(&equation.rhs, &states, model, scope, &mut builder)?;
            terms[idx].push(lowered);
        }
    }

    let derivatives = terms
        .into_iter()
        .map(|mut parts| {
            if parts.len() == 1 {
                parts.remove(0)
            } else {
                CompiledExpr::Sum(parts)
            }
        })
        .collect();

    let mut monitor_exprs = Vec::with_capacity(model.monitors.len());
    for monitor in &model.monitors {
        let scope = ScopeRef { component: None };
        monitor_exprs.push(lower(&monitor.expr, &states, model, scope, &mut builder)?);
    }

    Ok(Program {
        states,
        monitors: model.monitors.iter().map(|m| m.name.clone()).collect(),
        slots: builder.names,
        derivatives,
        monitor_exprs,
    })
}

/// Extracts the concrete slot values of `model` for `program`.
pub fn parameter_values(model: &Model, program: &Program) -> Result<ParameterSet, StudyError> {
    let mut values = BTreeMap::new();
    for slot in &program.slots {
        let value = slot_value(model, slot).ok_or_else(|| {
            StudyError::Artifact(
                ErrorInfo::new("program_slot_unbound", "model provides no value for slot")
                    .with_context("slot", slot.clone()),
            )
        })?;
        values.insert(slot.clone(), value);
    }
    Ok(values)
}

fn slot_value(model: &Model, slot: &str) -> Option<f64> {
    if let Some(state) = slot.strip_suffix(".initial") {
        if let Some(variable) = model.state(state) {
            return Some(variable.initial);
        }
    }
    if let Some(state) = slot.strip_suffix(".noise") {
        if let Some(variable) = model.state(state) {
            return Some(variable.noise);
        }
    }
    if let Some((component, param)) = slot.split_once("::") {
        return model
            .components
            .get(component)
            .and_then(|c| c.parameters.get(param))
            .copied();
    }
    model.parameters.get(slot).copied()
}

#[derive(Clone, Copy)]
struct ScopeRef<'a> {
    component: Option<&'a str>,
}

#[derive(Default)]
struct SlotTable {
    names: Vec<String>,
    index: BTreeMap<String, usize>,
}

impl SlotTable {
    fn slot(&mut self, name: String) -> usize {
        if let Some(idx) = self.index.get(&name) {
            return *idx;
        }
        let idx = self.names.len();
        self.index.insert(name.clone(), idx);
        self.names.push(name);
        idx
    }
}

fn state_index(states: &[String], name: &str) -> Result<usize, StudyError> {
    states.iter().position(|s| s == name).ok_or_else(|| {
        StudyError::Artifact(
            ErrorInfo::new("program_unknown_state", "state is not declared")
                .with_context("state", name.to_string()),
        )
    })
}

fn resolve_slot(model: &Model, scope: ScopeRef<'_>, param: &str) -> Result<String, StudyError> {
    if let Some(component) = scope.component {
        let local = model
            .components
            .get(component)
            .is_some_and(|c| c.parameters.contains_key(param));
        if local {
            return Ok(format!("{component}::{param}"));
        }
    }
    if model.parameters.contains_key(param) {
        return Ok(param.to_string());
    }
    Err(StudyError::Artifact(
        ErrorInfo::new("program_unknown_parameter", "parameter does not resolve")
            .with_context("parameter", param.to_string())
            .with_context("scope", scope.component.unwrap_or("").to_string()),
    ))
}

fn lower(
    expr: &Expr,
    states: &[String],
    model: &Model,
    scope: ScopeRef<'_>,
    slots: &mut SlotTable,
) -> Result<CompiledExpr, StudyError> {
    let rec = |e: &Expr, slots: &mut SlotTable| lower(e, states, model, scope, slots);
    Ok(match expr {
        Expr::Const(value) => CompiledExpr::Const(*value),
        Expr::State(name) => CompiledExpr::State(state_index(states, name)?),
        Expr::Param(name) => CompiledExpr::Slot(slots.slot(resolve_slot(model, scope, name)?)),
        Expr::Time => CompiledExpr::Time,
        Expr::Sum(items) => CompiledExpr::Sum(
            items
                .iter()
                .map(|item| rec(item, slots))
                .collect::<Result<_, _>>()?,
        ),
        Expr::Product(items) => CompiledExpr::Product(
            items
                .iter()
                .map(|item| rec(item, slots))
                .collect::<Result<_, _>>()?,
        ),
        Expr::Sub(lhs, rhs) => {
            CompiledExpr::Sub(Box::new(rec(lhs, slots)?), Box::new(rec(rhs, slots)?))
        }
        Expr::Div(lhs, rhs) => {
            CompiledExpr::Div(Box::new(rec(lhs, slots)?), Box::new(rec(rhs, slots)?))
        }
        Expr::Neg(inner) => CompiledExpr::Neg(Box::new(rec(inner, slots)?)),
        Expr::Exp(inner) => CompiledExpr::Exp(Box::new(rec(inner, slots)?)),
        Expr::Pow(base, exponent) => {
            CompiledExpr::Pow(Box::new(rec(base, slots)?), Box::new(rec(exponent, slots)?))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use study_core::{Component, Equation, Mechanism, StateVariable};

    fn model(g: f64) -> Model {
        Model::new("decay")
            .with_state(StateVariable::new(
                "v",
                1.0,
                Expr::neg(Expr::mul(Expr::param("k"), Expr::state("v"))),
            ))
            .with_parameter("k", 0.5)
            .with_mechanism(
                "leak",
                Mechanism {
                    equations: vec![Equation::new("v", Expr::neg(Expr::param("g")))],
                },
            )
            .with_component(
                "E",
                Component {
                    parameters: [("g".to_string(), g)].into_iter().collect(),
                    mechanisms: vec!["leak".into()],
                    equations: vec![],
                },
            )
    }

    #[test]
    fn program_ignores_parameter_values() {
        assert_eq!(compile(&model(1.0)).expect("a"), compile(&model(2.0)).expect("b"));
    }

    #[test]
    fn component_parameters_get_scoped_slots() {
        let program = compile(&model(1.0)).expect("compile");
        assert!(program.slots.contains(&"E::g".to_string()));
        let values = parameter_values(&model(3.0), &program).expect("values");
        assert_eq!(values["E::g"], 3.0);
        assert_eq!(values["v.initial"], 1.0);
        let bound = program.bind(&values).expect("bind");
        let dv = program.derivatives[0].eval(0.0, &[1.0], &bound);
        assert!((dv - (-0.5 - 3.0)).abs() < 1e-12);
    }

    #[test]
    fn bind_reports_missing_slots() {
        let program = compile(&model(1.0)).expect("compile");
        let err = program.bind(&ParameterSet::new()).expect_err("missing");
        assert_eq!(err.info().code, "program_slot_missing");
    }
}
