//! Execution plans
//!
//! An [`ExecutionPlan`] is the ordered set of calls chosen for one request.
//! A call may only depend on calls that come before it in the same plan, so
//! the dependency graph is acyclic by construction. This is checked when the
//! plan is built and the engine never sees an invalid plan.

use crate::tools::Parameters;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Identifier of a call within one plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallId(u32);

impl CallId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

/// One tool invocation within a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedCall {
    /// Call identifier, unique within the plan
    pub id: CallId,

    /// Tool to invoke
    pub tool_id: String,

    /// Validated parameters
    pub parameters: Parameters,

    /// Calls that must finish before this one starts
    #[serde(default)]
    pub depends_on: Vec<CallId>,

    /// Overrides the tool's default timeout
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl PlannedCall {
    pub fn new(id: CallId, tool_id: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            id,
            tool_id: tool_id.into(),
            parameters,
            depends_on: Vec::new(),
            timeout: None,
        }
    }

    /// Add a dependency on another call
    pub fn depends_on(mut self, call: CallId) -> Self {
        if !self.depends_on.contains(&call) {
            self.depends_on.push(call);
        }
        self
    }

    /// Override the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Check if the call has no dependencies
    pub fn is_independent(&self) -> bool {
        self.depends_on.is_empty()
    }
}

/// Error building a plan
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("Call id {0} appears more than once")]
    DuplicateCall(CallId),

    #[error("Call {call} depends on unknown call {dependency}")]
    UnknownDependency { call: CallId, dependency: CallId },

    /// Self and forward references; any dependency cycle contains one
    #[error("Call {call} depends on {dependency}, which does not come before it")]
    ForwardDependency { call: CallId, dependency: CallId },
}

/// A validated, layered plan
///
/// `layers()` holds plan indices grouped so that every call's dependencies
/// live in strictly earlier layers. Within a layer, plan order is preserved.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    calls: Vec<PlannedCall>,
    layers: Vec<Vec<usize>>,
}

impl ExecutionPlan {
    /// Validate the calls and compute dependency layers
    pub fn new(calls: Vec<PlannedCall>) -> Result<Self, PlanError> {
        let mut positions = HashMap::with_capacity(calls.len());
        for (index, call) in calls.iter().enumerate() {
            if positions.insert(call.id, index).is_some() {
                return Err(PlanError::DuplicateCall(call.id));
            }
        }

        let mut pending = vec![0usize; calls.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); calls.len()];
        for (index, call) in calls.iter().enumerate() {
            let unique: HashSet<CallId> = call.depends_on.iter().copied().collect();
            for dependency in unique {
                let Some(&position) = positions.get(&dependency) else {
                    return Err(PlanError::UnknownDependency {
                        call: call.id,
                        dependency,
                    });
                };
                if position >= index {
                    return Err(PlanError::ForwardDependency {
                        call: call.id,
                        dependency,
                    });
                }
                pending[index] += 1;
                dependents[position].push(index);
            }
        }

        // Kahn's algorithm, one frontier at a time
        let mut layers = Vec::new();
        let mut frontier: Vec<usize> = (0..calls.len()).filter(|&i| pending[i] == 0).collect();
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for &index in &frontier {
                for &dependent in &dependents[index] {
                    pending[dependent] -= 1;
                    if pending[dependent] == 0 {
                        next.push(dependent);
                    }
                }
            }
            next.sort_unstable();
            layers.push(std::mem::replace(&mut frontier, next));
        }

        Ok(Self { calls, layers })
    }

    /// A plan with no calls ("answer without tools")
    pub fn empty() -> Self {
        Self::default()
    }

    /// Calls in plan order
    pub fn calls(&self) -> &[PlannedCall] {
        &self.calls
    }

    /// Plan indices grouped by dependency layer
    pub fn layers(&self) -> &[Vec<usize>] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Look up a call by id
    pub fn call(&self, id: CallId) -> Option<&PlannedCall> {
        self.calls.iter().find(|call| call.id == id)
    }
}
