//! Edge routing and graph construction — run this before a workflow can be
//! scheduled.
//!
//! Each declared transition becomes an [`Edge`] carrying a [`Guard`]. A stage
//! that routes on its outcome writes the boolean [`RESULT_VARIABLE`] and has
//! exactly two outgoing edges, one guarded on `true` and one on `false`, so
//! every outcome has one path. Building a graph only registers edges; guards
//! are evaluated by whichever engine runs the graph.
//!
//! Rules enforced by [`ProcessGraph::build`]:
//! 1. The definition has a name and at least one stage.
//! 2. Stage names are non-empty and unique.
//! 3. Every edge has both endpoints and both refer to declared stages.
//! 4. A stage with conditional edges has exactly one `true` edge, exactly
//!    one `false` edge, and no unconditional edge.
//!
//! Cycles are allowed: a stage may be visited more than once per run.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use uuid::Uuid;

use stages::{Variables, RESULT_VARIABLE};

use crate::models::{EdgeDefinition, StageDefinition, WorkflowDefinition};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Guard
// ---------------------------------------------------------------------------

/// Condition under which an edge may be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Unconditional (default) transition.
    Always,
    /// Eligible iff the decision variable equals the given value.
    OnResult(bool),
}

impl Guard {
    pub fn from_condition(condition: Option<bool>) -> Self {
        condition.map_or(Self::Always, Self::OnResult)
    }

    /// The guard as an engine expression over the decision variable, or
    /// `None` for an unconditional edge.
    pub fn expression(&self) -> Option<String> {
        match self {
            Self::Always => None,
            Self::OnResult(true) => Some(format!("${{{RESULT_VARIABLE}}}")),
            Self::OnResult(false) => Some(format!("${{!{RESULT_VARIABLE}}}")),
        }
    }

    /// Evaluate against an execution's variables. A missing or non-boolean
    /// decision variable satisfies neither conditional guard.
    pub fn is_satisfied_by(&self, variables: &Variables) -> bool {
        match self {
            Self::Always => true,
            Self::OnResult(expected) => match variables.get(RESULT_VARIABLE) {
                Some(Value::Bool(actual)) => actual == expected,
                _ => false,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// A directed, optionally guarded transition between two stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    from: String,
    to: String,
    guard: Guard,
}

impl Edge {
    /// Translate a declared transition into a routable edge.
    ///
    /// # Errors
    /// [`EngineError::MissingEndpoint`] if either stage name is blank.
    pub fn new(definition: &EdgeDefinition) -> Result<Self, EngineError> {
        if definition.from.trim().is_empty() {
            return Err(EngineError::MissingEndpoint { side: "from" });
        }
        if definition.to.trim().is_empty() {
            return Err(EngineError::MissingEndpoint { side: "to" });
        }

        Ok(Self {
            from: definition.from.clone(),
            to: definition.to.clone(),
            guard: Guard::from_condition(definition.condition),
        })
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn guard(&self) -> Guard {
        self.guard
    }

    /// Register this edge on `graph`. Only [`ProcessGraph::build`] calls
    /// this, ahead of validation.
    pub(crate) fn add_to_graph(self, graph: &mut ProcessGraph) {
        graph.edges.push(self);
    }
}

// ---------------------------------------------------------------------------
// ProcessGraph
// ---------------------------------------------------------------------------

/// A validated, executable workflow graph.
#[derive(Debug, Clone)]
pub struct ProcessGraph {
    name: String,
    version: u32,
    definition_id: String,
    stages: Vec<StageDefinition>,
    edges: Vec<Edge>,
}

impl ProcessGraph {
    /// Build and validate the graph for `definition`.
    ///
    /// # Errors
    /// Any [`EngineError`] graph-build variant; a rejected definition never
    /// yields a partially built graph.
    pub fn build(definition: &WorkflowDefinition) -> Result<Self, EngineError> {
        if definition.name.trim().is_empty() {
            return Err(EngineError::EmptyDefinitionName);
        }
        if definition.name.contains(':') {
            return Err(EngineError::InvalidDefinitionName(definition.name.clone()));
        }
        if definition.stages.is_empty() {
            return Err(EngineError::NoStages(definition.name.clone()));
        }

        let mut graph = Self {
            name: definition.name.clone(),
            version: definition.version,
            definition_id: format!(
                "{}:{}:{}",
                definition.name,
                definition.version,
                Uuid::new_v4().simple()
            ),
            stages: definition.stages.clone(),
            edges: Vec::with_capacity(definition.edges.len()),
        };

        for declared in &definition.edges {
            Edge::new(declared)?.add_to_graph(&mut graph);
        }

        graph.validate()?;
        Ok(graph)
    }

    fn validate(&self) -> Result<(), EngineError> {
        // -------------------------------------------------------------------
        // 1. Stage names are present and unique
        // -------------------------------------------------------------------
        let mut names: HashSet<&str> = HashSet::with_capacity(self.stages.len());
        for stage in &self.stages {
            if stage.name.trim().is_empty() {
                return Err(EngineError::EmptyStageName);
            }
            if !names.insert(stage.name.as_str()) {
                return Err(EngineError::DuplicateStage(stage.name.clone()));
            }
        }

        // -------------------------------------------------------------------
        // 2. Edge endpoints
        // -------------------------------------------------------------------
        for edge in &self.edges {
            if !names.contains(edge.from()) {
                return Err(EngineError::UnknownStageReference {
                    stage: edge.from.clone(),
                    side: "from",
                });
            }
            if !names.contains(edge.to()) {
                return Err(EngineError::UnknownStageReference {
                    stage: edge.to.clone(),
                    side: "to",
                });
            }
        }

        // -------------------------------------------------------------------
        // 3. Decision stages branch exactly once per outcome
        // -------------------------------------------------------------------
        #[derive(Default)]
        struct Outgoing {
            on_true: usize,
            on_false: usize,
            always: usize,
        }

        let mut outgoing: HashMap<&str, Outgoing> = HashMap::new();
        for edge in &self.edges {
            let counts = outgoing.entry(edge.from()).or_default();
            match edge.guard {
                Guard::Always => counts.always += 1,
                Guard::OnResult(true) => counts.on_true += 1,
                Guard::OnResult(false) => counts.on_false += 1,
            }
        }

        // Walk stages in declaration order so the reported stage is stable.
        for stage in &self.stages {
            let Some(counts) = outgoing.get(stage.name.as_str()) else {
                continue;
            };
            if counts.on_true == 0 && counts.on_false == 0 {
                continue;
            }

            let stage = stage.name.clone();
            if counts.on_true > 1 {
                return Err(EngineError::DuplicateGuard { stage, condition: true });
            }
            if counts.on_false > 1 {
                return Err(EngineError::DuplicateGuard { stage, condition: false });
            }
            if counts.on_true == 0 {
                return Err(EngineError::IncompleteDecision { stage, missing: true });
            }
            if counts.on_false == 0 {
                return Err(EngineError::IncompleteDecision { stage, missing: false });
            }
            if counts.always > 0 {
                return Err(EngineError::MixedGuards { stage });
            }
        }

        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Engine-style definition id, `name:version:unique`.
    pub fn definition_id(&self) -> &str {
        &self.definition_id
    }

    /// The first declared stage.
    pub fn entry_stage(&self) -> &StageDefinition {
        // `build` rejects definitions without stages.
        &self.stages[0]
    }

    pub fn stage(&self, name: &str) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edges leaving `stage`, in declaration order.
    pub fn outgoing<'a>(&'a self, stage: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.from == stage)
    }

    /// Edges leaving `stage` whose guard holds for `variables`.
    pub fn eligible_edges<'a>(&'a self, stage: &'a str, variables: &Variables) -> Vec<&'a Edge> {
        self.outgoing(stage)
            .filter(|e| e.guard.is_satisfied_by(variables))
            .collect()
    }
}
