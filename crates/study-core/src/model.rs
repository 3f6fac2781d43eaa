//! Normalized model description consumed by the solver and the orchestrator.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Reserved channel name for the shared time axis.
pub const TIME_LABEL: &str = "time";

/// Structured right-hand-side expression.
///
/// Parameter references resolve in the scope of the block that owns the
/// expression: component parameters first, then model level parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Literal constant.
    Const(f64),
    /// Current value of a state variable.
    State(String),
    /// Parameter lookup.
    Param(String),
    /// Integration time.
    Time,
    /// Sum of all operands (empty sum is zero).
    Sum(Vec<Expr>),
    /// Product of all operands (empty product is one).
    Product(Vec<Expr>),
    /// Difference `lhs - rhs`.
    Sub(Box<Expr>, Box<Expr>),
    /// Quotient `lhs / rhs`.
    Div(Box<Expr>, Box<Expr>),
    /// Negation.
    Neg(Box<Expr>),
    /// Natural exponential.
    Exp(Box<Expr>),
    /// Power `base ^ exponent`.
    Pow(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Literal constant.
    pub fn constant(value: f64) -> Self {
        Expr::Const(value)
    }

    /// State variable reference.
    pub fn state(name: impl Into<String>) -> Self {
        Expr::State(name.into())
    }

    /// Parameter reference.
    pub fn param(name: impl Into<String>) -> Self {
        Expr::Param(name.into())
    }

    /// Product of two operands.
    pub fn mul(lhs: Expr, rhs: Expr) -> Self {
        Expr::Product(vec![lhs, rhs])
    }

    /// Sum of two operands.
    pub fn add(lhs: Expr, rhs: Expr) -> Self {
        Expr::Sum(vec![lhs, rhs])
    }

    /// Difference of two operands.
    pub fn sub(lhs: Expr, rhs: Expr) -> Self {
        Expr::Sub(Box::new(lhs), Box::new(rhs))
    }

    /// Negation of an operand.
    pub fn neg(inner: Expr) -> Self {
        Expr::Neg(Box::new(inner))
    }

    /// Visits every node of the expression tree in pre-order.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Const(_) | Expr::State(_) | Expr::Param(_) | Expr::Time => {}
            Expr::Sum(items) | Expr::Product(items) => {
                for item in items {
                    item.walk(visit);
                }
            }
            Expr::Sub(lhs, rhs) | Expr::Div(lhs, rhs) | Expr::Pow(lhs, rhs) => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            Expr::Neg(inner) | Expr::Exp(inner) => inner.walk(visit),
        }
    }

    /// Names of all parameters referenced by the expression.
    pub fn parameter_refs(&self) -> BTreeSet<&str> {
        let mut refs = BTreeSet::new();
        self.walk(&mut |node| {
            if let Expr::Param(name) = node {
                refs.insert(name.as_str());
            }
        });
        refs
    }

    /// Names of all state variables referenced by the expression.
    pub fn state_refs(&self) -> BTreeSet<&str> {
        let mut refs = BTreeSet::new();
        self.walk(&mut |node| {
            if let Expr::State(name) = node {
                refs.insert(name.as_str());
            }
        });
        refs
    }

    /// Literal constants appearing in the expression.
    pub fn constants(&self) -> Vec<f64> {
        let mut values = Vec::new();
        self.walk(&mut |node| {
            if let Expr::Const(value) = node {
                values.push(*value);
            }
        });
        values
    }
}

/// Contribution `d(variable)/dt += rhs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equation {
    /// State variable receiving the contribution.
    pub variable: String,
    /// Right-hand side expression.
    pub rhs: Expr,
}

impl Equation {
    /// Creates a new derivative contribution.
    pub fn new(variable: impl Into<String>, rhs: Expr) -> Self {
        Self {
            variable: variable.into(),
            rhs,
        }
    }
}

/// Integrated state variable with its base equation and initial condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateVariable {
    /// Unique state name.
    pub name: String,
    /// Initial condition.
    #[serde(default)]
    pub initial: f64,
    /// Additive noise amplitude (Euler-Maruyama); zero keeps the run deterministic.
    #[serde(default)]
    pub noise: f64,
    /// Base derivative expression evaluated at model scope.
    pub equation: Expr,
}

impl StateVariable {
    /// Creates a deterministic state variable.
    pub fn new(name: impl Into<String>, initial: f64, equation: Expr) -> Self {
        Self {
            name: name.into(),
            initial,
            noise: 0.0,
            equation,
        }
    }
}

/// Named reusable equation block that components attach by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Mechanism {
    /// Contributions added to the derivatives of the model's state variables.
    #[serde(default)]
    pub equations: Vec<Equation>,
}

/// Sub-component of a model such as a population or a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Component {
    /// Parameters local to the component.
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
    /// Attached mechanisms, evaluated in the component's scope.
    #[serde(default)]
    pub mechanisms: Vec<String>,
    /// Additional derivative contributions owned by the component.
    #[serde(default)]
    pub equations: Vec<Equation>,
}

/// Derived quantity recorded alongside the state variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    /// Output channel name.
    pub name: String,
    /// Expression evaluated at model scope on every recorded sample.
    pub expr: Expr,
}

/// Normalized description of the system to integrate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Model {
    /// Human readable model name.
    #[serde(default)]
    pub name: String,
    /// Ordered, uniquely named state variables.
    pub state_variables: Vec<StateVariable>,
    /// Model level parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
    /// Named sub-components.
    #[serde(default)]
    pub components: BTreeMap<String, Component>,
    /// Mechanism library available to components.
    #[serde(default)]
    pub mechanisms: BTreeMap<String, Mechanism>,
    /// Monitors recorded as extra output channels.
    #[serde(default)]
    pub monitors: Vec<Monitor>,
}

impl Model {
    /// Creates an empty model with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a state variable.
    pub fn with_state(mut self, state: StateVariable) -> Self {
        self.state_variables.push(state);
        self
    }

    /// Sets a model level parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: f64) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    /// Adds or replaces a component.
    pub fn with_component(mut self, name: impl Into<String>, component: Component) -> Self {
        self.components.insert(name.into(), component);
        self
    }

    /// Adds or replaces a mechanism definition.
    pub fn with_mechanism(mut self, name: impl Into<String>, mechanism: Mechanism) -> Self {
        self.mechanisms.insert(name.into(), mechanism);
        self
    }

    /// Adds a monitor.
    pub fn with_monitor(mut self, name: impl Into<String>, expr: Expr) -> Self {
        self.monitors.push(Monitor {
            name: name.into(),
            expr,
        });
        self
    }

    /// Ordered state variable names.
    pub fn state_names(&self) -> Vec<&str> {
        self.state_variables.iter().map(|s| s.name.as_str()).collect()
    }

    /// Looks up a state variable by name.
    pub fn state(&self, name: &str) -> Option<&StateVariable> {
        self.state_variables.iter().find(|s| s.name == name)
    }

    /// Mutable lookup of a state variable by name.
    pub fn state_mut(&mut self, name: &str) -> Option<&mut StateVariable> {
        self.state_variables.iter_mut().find(|s| s.name == name)
    }

    /// Output labels in exposed order: time first, then states, then monitors.
    pub fn output_labels(&self) -> Vec<String> {
        std::iter::once(TIME_LABEL.to_string())
            .chain(self.state_variables.iter().map(|s| s.name.clone()))
            .chain(self.monitors.iter().map(|m| m.name.clone()))
            .collect()
    }
}
