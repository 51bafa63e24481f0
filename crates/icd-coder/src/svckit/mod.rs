//! Coding Tools
//!
//! Tools the medical coding agent can call.

mod code_lookup;
mod code_validator;

pub use code_lookup::CodeLookupTool;
pub use code_validator::CodeValidatorTool;
