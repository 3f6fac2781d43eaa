//! Modification sets and variation specifications.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::Equation;

/// Property names that replace a component's mechanism list.
pub const MECHANISM_PROPERTIES: [&str; 2] = ["mechanisms", "mechanism_list"];
/// Property name that replaces a component's equation block.
pub const EQUATIONS_PROPERTY: &str = "equations";

/// Value carried by a single modification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModValue {
    /// Numeric parameter value.
    Number(f64),
    /// Mechanism names.
    Names(Vec<String>),
    /// Replacement equation block.
    Equations(Vec<Equation>),
}

impl ModValue {
    /// Returns the numeric payload when present.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ModValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// True when every number carried by the value is finite.
    pub fn is_finite(&self) -> bool {
        match self {
            ModValue::Number(value) => value.is_finite(),
            ModValue::Names(_) => true,
            ModValue::Equations(equations) => equations
                .iter()
                .all(|eq| eq.rhs.constants().iter().all(|c| c.is_finite())),
        }
    }
}

impl From<f64> for ModValue {
    fn from(value: f64) -> Self {
        ModValue::Number(value)
    }
}

impl fmt::Display for ModValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModValue::Number(value) => write!(f, "{value}"),
            ModValue::Names(names) => write!(f, "[{}]", names.join(",")),
            ModValue::Equations(equations) => write!(f, "<{} equations>", equations.len()),
        }
    }
}

/// Single `(target, property, value)` edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    /// Component name, or empty for the model level.
    #[serde(default)]
    pub target: String,
    /// Property to overwrite.
    pub property: String,
    /// New value.
    pub value: ModValue,
}

impl Modification {
    /// Creates a new modification.
    pub fn new(
        target: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<ModValue>,
    ) -> Self {
        Self {
            target: target.into(),
            property: property.into(),
            value: value.into(),
        }
    }

    /// True when the edit changes the generated code's shape.
    pub fn is_structural(&self) -> bool {
        is_structural_property(&self.property)
    }
}

/// True for properties that alter mechanism composition or equations.
pub fn is_structural_property(property: &str) -> bool {
    MECHANISM_PROPERTIES.contains(&property) || property == EQUATIONS_PROPERTY
}

/// Ordered sequence of modifications applied to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ModificationSet(pub Vec<Modification>);

impl ModificationSet {
    /// Creates an empty set.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Appends a modification.
    pub fn push(&mut self, modification: Modification) {
        self.0.push(modification);
    }

    /// Borrowed iterator over the modifications.
    pub fn iter(&self) -> std::slice::Iter<'_, Modification> {
        self.0.iter()
    }

    /// True when no modification is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of modifications.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when any modification changes the model's structural shape.
    pub fn is_structural(&self) -> bool {
        self.0.iter().any(Modification::is_structural)
    }

    /// Concatenates two sets, `self` first.
    pub fn chain(&self, later: &ModificationSet) -> ModificationSet {
        let mut merged = self.0.clone();
        merged.extend(later.0.iter().cloned());
        ModificationSet(merged)
    }
}

impl FromIterator<Modification> for ModificationSet {
    fn from_iter<I: IntoIterator<Item = Modification>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Single row of a variation specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationRow {
    /// Component name, or empty for the model level.
    #[serde(default)]
    pub target: String,
    /// Property to vary.
    pub property: String,
    /// Candidate values, in order.
    pub values: Vec<ModValue>,
}

impl VariationRow {
    /// Creates a numeric row.
    pub fn numeric(
        target: impl Into<String>,
        property: impl Into<String>,
        values: impl IntoIterator<Item = f64>,
    ) -> Self {
        Self {
            target: target.into(),
            property: property.into(),
            values: values.into_iter().map(ModValue::Number).collect(),
        }
    }

    /// True for rows that edit mechanism composition or equations.
    pub fn is_structural(&self) -> bool {
        is_structural_property(&self.property)
    }
}

/// How rows combine into variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Combine {
    /// Cross product; the first row varies slowest.
    #[default]
    Cross,
    /// Rows advance in lockstep and must have equal lengths.
    Zip,
}

/// Table of variation rows expanding into one modification set per variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VariationSpec {
    /// Rows in declaration order.
    #[serde(default)]
    pub rows: Vec<VariationRow>,
    /// Combination rule.
    #[serde(default)]
    pub combine: Combine,
}

impl VariationSpec {
    /// Cross-product specification over the given rows.
    pub fn cross(rows: Vec<VariationRow>) -> Self {
        Self {
            rows,
            combine: Combine::Cross,
        }
    }

    /// Lockstep specification over the given rows.
    pub fn zip(rows: Vec<VariationRow>) -> Self {
        Self {
            rows,
            combine: Combine::Zip,
        }
    }

    /// True when no variation is requested.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
