#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Policy compilation, condition evaluation, risk assessment, and
//! deny-wins aggregation over a compiled policy index.

pub mod builtins;
pub mod compiler;
pub mod condition;
pub mod error;
pub mod evaluator;
pub mod regex_cache;
pub mod risk;

pub use builtins::BuiltinToggles;
pub use compiler::PolicyIndex;
pub use error::PolicyError;
pub use regex_cache::RegexCache;
