//! Core types: values, description trees, tracing

pub mod tracing;
pub mod tree;
pub mod value;

pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
pub use tree::{TreeDisplay, write_tree};
pub use value::{Value, ValueType};
