#![deny(missing_docs)]
#![doc = "Program generation and fixed-step integration backend for variant studies."]

/// Artifact generation and invocation.
pub mod backend;
/// Fixed-step integrators.
pub mod integrate;
/// CSV channel storage for disk output mode.
pub mod output;
/// Model compilation into slot-indexed programs.
pub mod program;

pub use backend::{ProgramGenerator, OUTPUT_FILE, PARAMS_FILE, PROGRAM_FILE};
pub use integrate::{integrate, Trace};
pub use output::{load_channels, read_csv, write_csv};
pub use program::{compile, parameter_values, CompiledExpr, Program};
