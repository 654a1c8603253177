//! Core logic: inputs, descriptors, composition, synthesis, planning, execution.

pub mod compose;
pub mod descriptors;
pub mod error;
pub mod executor;
pub mod inputs;
pub mod parser;
pub mod planner;
pub mod resolver;
pub mod state;
pub mod synth;
pub mod types;
