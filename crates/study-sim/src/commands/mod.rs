pub mod expand;
pub mod registry;
pub mod run;
pub mod status;
