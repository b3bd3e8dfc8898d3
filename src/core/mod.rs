//! Core composition engine — types, parsing, references, graph, scheduling,
//! execution and state.

pub mod error;
pub mod executor;
pub mod graph;
pub mod parser;
pub mod planner;
pub mod resolver;
pub mod stack;
pub mod state;
pub mod types;

pub use error::{RollbackOutcome, StackError};
pub use executor::ApplyConfig;
pub use stack::{ResourceHandle, Stack};
