// ABOUTME: Parameter tuple identifying one log stream (step, container, filter, backlog)
//
// Two tuples are equal iff every field is equal; the tuple is the identity key
// for session lifecycle and multicast sharing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The pipeline step a viewer is mounted on. Fixed for the lifetime of a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepTarget {
    pub namespace: String,
    pub pipeline_name: String,
    pub step_name: String,
}

impl StepTarget {
    pub fn new(
        namespace: impl Into<String>,
        pipeline_name: impl Into<String>,
        step_name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pipeline_name: pipeline_name.into(),
            step_name: step_name.into(),
        }
    }
}

impl fmt::Display for StepTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.pipeline_name, self.step_name)
    }
}

/// Fully resolved stream parameters.
///
/// Immutable once built: changing any field means building a new tuple with one of
/// the `with_*` helpers, which is what drives session replacement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterTuple {
    namespace: String,
    pipeline_name: String,
    step_name: String,
    container: String,
    filter_term: String,
    tail_lines: u32,
}

impl ParameterTuple {
    pub fn new(
        target: &StepTarget,
        container: impl Into<String>,
        filter_term: impl Into<String>,
        tail_lines: u32,
    ) -> Self {
        Self {
            namespace: target.namespace.clone(),
            pipeline_name: target.pipeline_name.clone(),
            step_name: target.step_name.clone(),
            container: container.into(),
            filter_term: filter_term.into(),
            tail_lines,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Regular expression the source applies server-side
    pub fn filter_term(&self) -> &str {
        &self.filter_term
    }

    /// Initial backlog size requested from the source
    pub const fn tail_lines(&self) -> u32 {
        self.tail_lines
    }

    #[must_use]
    pub fn with_container(&self, container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_filter_term(&self, filter_term: impl Into<String>) -> Self {
        Self {
            filter_term: filter_term.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for ParameterTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}[{}] grep={:?} tail={}",
            self.namespace,
            self.pipeline_name,
            self.step_name,
            self.container,
            self.filter_term,
            self.tail_lines
        )
    }
}
