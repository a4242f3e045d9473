// ABOUTME: Core data models for pipeline step log viewing: parameter tuples and log lines

pub mod line;
pub mod tuple;

pub use line::{DisplayLine, LogLine};
pub use tuple::{ParameterTuple, StepTarget};
