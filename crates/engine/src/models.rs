//! Workflow definition models.
//!
//! A [`WorkflowDefinition`] is what an author declares: named stages and the
//! transitions between them. It is read-only to this crate and is turned into
//! an executable [`ProcessGraph`](crate::graph::ProcessGraph) by the graph
//! builder. Definitions (de)serialise from JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use stages::builtin::NOOP;

// ---------------------------------------------------------------------------
// StageDefinition
// ---------------------------------------------------------------------------

/// A single named node in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Unique within the workflow; referenced by transitions.
    pub name: String,
    /// Registered `StageTask` that runs while the stage is active.
    #[serde(default = "default_task")]
    pub task: String,
    /// Passed to the task at execution time.
    #[serde(default)]
    pub config: Value,
}

fn default_task() -> String {
    NOOP.to_owned()
}

impl StageDefinition {
    /// A stage running the `noop` task.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task: default_task(),
            config: Value::Null,
        }
    }

    pub fn with_task(mut self, task: impl Into<String>, config: Value) -> Self {
        self.task = task.into();
        self.config = config;
        self
    }
}

// ---------------------------------------------------------------------------
// EdgeDefinition
// ---------------------------------------------------------------------------

/// A declared transition. `condition` is tri-state: absent means always
/// eligible, `Some(b)` means eligible iff the decision variable equals `b`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<bool>,
}

impl EdgeDefinition {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
        }
    }

    pub fn when(from: impl Into<String>, to: impl Into<String>, condition: bool) -> Self {
        Self {
            condition: Some(condition),
            ..Self::new(from, to)
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

/// A named, versioned workflow. The first declared stage is the entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default = "first_version")]
    pub version: u32,
    pub stages: Vec<StageDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

fn first_version() -> u32 {
    1
}

impl WorkflowDefinition {
    pub fn new(
        name: impl Into<String>,
        stages: Vec<StageDefinition>,
        edges: Vec<EdgeDefinition>,
    ) -> Self {
        Self {
            name: name.into(),
            version: first_version(),
            stages,
            edges,
        }
    }
}
