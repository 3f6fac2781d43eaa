use std::collections::{BTreeMap, BTreeSet};

use study_core::errors::{ErrorInfo, StudyError};
use study_core::{Component, Equation, Expr, Model, TIME_LABEL};

fn model_error(code: &str, message: impl Into<String>) -> ErrorInfo {
    ErrorInfo::new(code, message)
}

/// Validates a raw model and returns its normalized form.
///
/// State order is preserved because it defines channel order. Duplicate
/// mechanism attachments are collapsed keeping the first occurrence.
pub fn normalize_model(raw: &Model) -> Result<Model, StudyError> {
    let mut model = raw.clone();
    if model.state_variables.is_empty() {
        return Err(StudyError::Model(model_error(
            "model_no_states",
            "model declares no state variables",
        )));
    }

    let mut states = BTreeSet::new();
    for state in &model.state_variables {
        if state.name.trim().is_empty() || state.name == TIME_LABEL {
            return Err(StudyError::Model(
                model_error("model_state_name", "invalid state variable name")
                    .with_context("state", state.name.clone()),
            ));
        }
        if !states.insert(state.name.as_str()) {
            return Err(StudyError::Model(
                model_error("model_state_duplicate", "duplicate state variable")
                    .with_context("state", state.name.clone()),
            ));
        }
        check_finite("initial", &state.name, state.initial)?;
        if !state.noise.is_finite() || state.noise < 0.0 {
            return Err(StudyError::Model(
                model_error("model_noise", "noise amplitude must be finite and non-negative")
                    .with_context("state", state.name.clone()),
            ));
        }
    }

    let mut monitors = BTreeSet::new();
    for monitor in &model.monitors {
        if monitor.name == TIME_LABEL
            || states.contains(monitor.name.as_str())
            || !monitors.insert(monitor.name.as_str())
        {
            return Err(StudyError::Model(
                model_error("model_monitor_name", "monitor name collides with another channel")
                    .with_context("monitor", monitor.name.clone()),
            ));
        }
    }

    for (name, value) in &model.parameters {
        check_finite("parameter", name, *value)?;
    }

    let global = Scope {
        states: &states,
        local: None,
        global: &model.parameters,
    };
    for state in &model.state_variables {
        global.check_expr(&state.equation, &format!("state {}", state.name))?;
    }
    for monitor in &model.monitors {
        global.check_expr(&monitor.expr, &format!("monitor {}", monitor.name))?;
    }

    for (name, mechanism) in &model.mechanisms {
        for equation in &mechanism.equations {
            check_variable(&states, equation, &format!("mechanism {name}"))?;
        }
    }

    for (name, component) in model.components.iter_mut() {
        dedup_mechanisms(component);
        check_component(name, component, &states, &model.parameters, &model.mechanisms)?;
    }

    Ok(model)
}

fn dedup_mechanisms(component: &mut Component) {
    let mut seen = BTreeSet::new();
    component
        .mechanisms
        .retain(|mechanism| seen.insert(mechanism.clone()));
}

fn check_component(
    name: &str,
    component: &Component,
    states: &BTreeSet<&str>,
    globals: &BTreeMap<String, f64>,
    library: &BTreeMap<String, study_core::Mechanism>,
) -> Result<(), StudyError> {
    if name.trim().is_empty() {
        return Err(StudyError::Model(model_error(
            "model_component_name",
            "component names must be non-empty",
        )));
    }
    for (param, value) in &component.parameters {
        check_finite("parameter", &format!("{name}.{param}"), *value)?;
    }
    let scope = Scope {
        states,
        local: Some(&component.parameters),
        global: globals,
    };
    for equation in &component.equations {
        let owner = format!("component {name}");
        check_variable(states, equation, &owner)?;
        scope.check_expr(&equation.rhs, &owner)?;
    }
    for mechanism_name in &component.mechanisms {
        let mechanism = library.get(mechanism_name).ok_or_else(|| {
            StudyError::Model(
                model_error("model_mechanism_missing", "attached mechanism is not defined")
                    .with_context("component", name.to_string())
                    .with_context("mechanism", mechanism_name.clone()),
            )
        })?;
        for equation in &mechanism.equations {
            scope.check_expr(&equation.rhs, &format!("mechanism {mechanism_name} on {name}"))?;
        }
    }
    Ok(())
}

fn check_variable(
    states: &BTreeSet<&str>,
    equation: &Equation,
    owner: &str,
) -> Result<(), StudyError> {
    if states.contains(equation.variable.as_str()) {
        Ok(())
    } else {
        Err(StudyError::Model(
            model_error("model_unknown_variable", "equation targets an unknown state")
                .with_context("owner", owner.to_string())
                .with_context("variable", equation.variable.clone()),
        ))
    }
}

fn check_finite(kind: &str, name: &str, value: f64) -> Result<(), StudyError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(StudyError::Model(
            model_error("model_non_finite", format!("{kind} value must be finite"))
                .with_context("name", name.to_string()),
        ))
    }
}

struct Scope<'a> {
    states: &'a BTreeSet<&'a str>,
    local: Option<&'a BTreeMap<String, f64>>,
    global: &'a BTreeMap<String, f64>,
}

impl Scope<'_> {
    fn resolves(&self, param: &str) -> bool {
        self.local.is_some_and(|local| local.contains_key(param)) || self.global.contains_key(param)
    }

    fn check_expr(&self, expr: &Expr, owner: &str) -> Result<(), StudyError> {
        for state in expr.state_refs() {
            if !self.states.contains(state) {
                return Err(StudyError::Model(
                    model_error("model_unknown_state", "expression references an unknown state")
                        .with_context("owner", owner.to_string())
                        .with_context("state", state.to_string()),
                ));
            }
        }
        for param in expr.parameter_refs() {
            if !self.resolves(param) {
                return Err(StudyError::Model(
                    model_error(
                        "model_unknown_parameter",
                        "expression references an unknown parameter",
                    )
                    .with_context("owner", owner.to_string())
                    .with_context("parameter", param.to_string()),
                ));
            }
        }
        if expr.constants().iter().any(|c| !c.is_finite()) {
            return Err(StudyError::Model(
                model_error("model_non_finite", "expression constant must be finite")
                    .with_context("owner", owner.to_string()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use study_core::{Mechanism, StateVariable};

    fn base() -> Model {
        Model::new("cell")
            .with_state(StateVariable::new("v", -65.0, Expr::neg(Expr::param("gL"))))
            .with_parameter("gL", 0.1)
    }

    #[test]
    fn accepts_component_scoped_parameters() {
        let model = base()
            .with_mechanism(
                "iNa",
                Mechanism {
                    equations: vec![Equation::new("v", Expr::param("gNa"))],
                },
            )
            .with_component(
                "E",
                Component {
                    parameters: [("gNa".to_string(), 120.0)].into_iter().collect(),
                    mechanisms: vec!["iNa".into(), "iNa".into()],
                    equations: vec![],
                },
            );
        let normalized = normalize_model(&model).expect("valid");
        assert_eq!(normalized.components["E"].mechanisms, vec!["iNa"]);
    }

    #[test]
    fn rejects_unresolved_parameter() {
        let model = base().with_monitor("i", Expr::param("missing"));
        let err = normalize_model(&model).expect_err("missing parameter");
        assert_eq!(err.info().code, "model_unknown_parameter");
    }

    #[test]
    fn rejects_monitor_named_time() {
        let model = base().with_monitor("time", Expr::state("v"));
        assert!(normalize_model(&model).is_err());
    }
}
