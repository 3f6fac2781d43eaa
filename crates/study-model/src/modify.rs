use study_core::errors::{ErrorInfo, StudyError};
use study_core::modification::{EQUATIONS_PROPERTY, MECHANISM_PROPERTIES};
use study_core::{Equation, ModValue, Model, Modification, ModificationSet};

use crate::normalize::normalize_model;

const INITIAL_SUFFIX: &str = ".initial";
const NOISE_SUFFIX: &str = ".noise";

fn modification_error(code: &str, message: &str, modification: &Modification) -> StudyError {
    StudyError::Modification(
        ErrorInfo::new(code, message)
            .with_context("target", modification.target.clone())
            .with_context("property", modification.property.clone()),
    )
}

/// Applies a modification set to a copy of `model` and re-normalizes the result.
pub fn apply_modifications(model: &Model, set: &ModificationSet) -> Result<Model, StudyError> {
    let mut next = model.clone();
    for modification in set.iter() {
        apply_one(&mut next, modification)?;
    }
    normalize_model(&next).map_err(|err| match err {
        StudyError::Model(info) => StudyError::Modification(info),
        other => other,
    })
}

/// Checks that a `(target, property)` pair addresses an existing field.
pub fn check_target(model: &Model, target: &str, property: &str) -> Result<(), StudyError> {
    let probe = Modification {
        target: target.to_string(),
        property: property.to_string(),
        value: ModValue::Number(0.0),
    };
    if target.is_empty() {
        if is_mechanism_property(property) {
            return Err(modification_error(
                "modify_model_mechanisms",
                "mechanisms attach to components, not to the model level",
                &probe,
            ));
        }
        if property == EQUATIONS_PROPERTY
            || model.parameters.contains_key(property)
            || state_field(model, property).is_some()
        {
            return Ok(());
        }
        return Err(modification_error(
            "modify_unknown_property",
            "model has no such parameter",
            &probe,
        ));
    }
    let component = model.components.get(target).ok_or_else(|| {
        modification_error("modify_unknown_target", "target component not found", &probe)
    })?;
    if is_mechanism_property(property)
        || property == EQUATIONS_PROPERTY
        || component.parameters.contains_key(property)
    {
        Ok(())
    } else {
        Err(modification_error(
            "modify_unknown_property",
            "component has no such parameter",
            &probe,
        ))
    }
}

fn is_mechanism_property(property: &str) -> bool {
    MECHANISM_PROPERTIES.contains(&property)
}

fn state_field<'a>(model: &Model, property: &'a str) -> Option<(&'a str, &'static str)> {
    for suffix in [INITIAL_SUFFIX, NOISE_SUFFIX] {
        if let Some(state) = property.strip_suffix(suffix) {
            if model.state(state).is_some() {
                return Some((state, suffix));
            }
        }
    }
    None
}

fn apply_one(model: &mut Model, modification: &Modification) -> Result<(), StudyError> {
    check_target(model, &modification.target, &modification.property)?;
    let property = modification.property.as_str();

    if is_mechanism_property(property) {
        let names = match &modification.value {
            ModValue::Names(names) => names.clone(),
            _ => {
                return Err(modification_error(
                    "modify_value_kind",
                    "mechanism lists take a list of names",
                    modification,
                ))
            }
        };
        if let Some(component) = model.components.get_mut(&modification.target) {
            component.mechanisms = names;
        }
        return Ok(());
    }

    if property == EQUATIONS_PROPERTY {
        let equations = equations_value(modification)?;
        if modification.target.is_empty() {
            replace_state_equations(model, equations, modification)?;
        } else if let Some(component) = model.components.get_mut(&modification.target) {
            component.equations = equations;
        }
        return Ok(());
    }

    let value = modification.value.as_f64().ok_or_else(|| {
        modification_error(
            "modify_value_kind",
            "parameters take a numeric value",
            modification,
        )
    })?;
    if !value.is_finite() {
        return Err(modification_error(
            "modify_non_finite",
            "parameter values must be finite",
            modification,
        ));
    }

    if modification.target.is_empty() {
        if let Some(slot) = model.parameters.get_mut(property) {
            *slot = value;
            return Ok(());
        }
        if let Some((state, suffix)) = state_field(model, property) {
            let state = state.to_string();
            if let Some(variable) = model.state_mut(&state) {
                if suffix == INITIAL_SUFFIX {
                    variable.initial = value;
                } else {
                    variable.noise = value;
                }
            }
        }
    } else if let Some(component) = model.components.get_mut(&modification.target) {
        component.parameters.insert(property.to_string(), value);
    }
    Ok(())
}

fn equations_value(modification: &Modification) -> Result<Vec<Equation>, StudyError> {
    match &modification.value {
        ModValue::Equations(equations) => Ok(equations.clone()),
        ModValue::Names(names) if names.is_empty() => Ok(Vec::new()),
        _ => Err(modification_error(
            "modify_value_kind",
            "equation edits take a list of equations",
            modification,
        )),
    }
}

fn replace_state_equations(
    model: &mut Model,
    equations: Vec<Equation>,
    modification: &Modification,
) -> Result<(), StudyError> {
    for equation in equations {
        let state = model.state_mut(&equation.variable).ok_or_else(|| {
            modification_error(
                "modify_unknown_variable",
                "equation targets an unknown state",
                modification,
            )
        })?;
        state.equation = equation.rhs;
    }
    Ok(())
}
