//! Tool selection
//!
//! The [`Selector`] turns a free-text request into an [`ExecutionPlan`]:
//!
//! 1. Score every registered tool with its applicability heuristic
//! 2. Keep scores strictly above the threshold
//! 3. Sort by score (descending), breaking ties by registration order
//! 4. Truncate to `max_tools`
//! 5. Extract and validate parameters, dropping candidates that fail
//! 6. Assign call ids and record `serialize_after` dependencies

use super::extractor::ParameterExtractor;
use super::plan::{CallId, ExecutionPlan, PlanError, PlannedCall};
use crate::context::ConversationContext;
use crate::tools::{normalize_score, Tool, ToolRegistry};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Selector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Scores must be strictly greater than this to qualify
    pub threshold: f32,

    /// Maximum number of tools per plan
    pub max_tools: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            max_tools: 3,
        }
    }
}

/// A tool that passed scoring
#[derive(Clone)]
pub struct Candidate {
    pub tool: Arc<dyn Tool>,
    pub score: f32,
    /// Registration position, the tie-break
    pub position: usize,
}

impl std::fmt::Debug for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Candidate")
            .field("tool", &self.tool.id())
            .field("score", &self.score)
            .field("position", &self.position)
            .finish()
    }
}

/// Builds execution plans from requests
#[derive(Debug, Clone, Default)]
pub struct Selector {
    config: SelectorConfig,
}

impl Selector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Score, filter, sort and truncate the registry's tools
    pub fn rank(&self, request: &str, registry: &ToolRegistry) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = registry
            .all()
            .enumerate()
            .filter_map(|(position, tool)| {
                let score = normalize_score(tool.applicability(request));
                tracing::trace!(tool = %tool.id(), score, "Scored tool");
                (score > self.config.threshold).then(|| Candidate {
                    tool: Arc::clone(tool),
                    score,
                    position,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        candidates.truncate(self.config.max_tools);
        candidates
    }

    /// Build a plan for a request
    ///
    /// When `request` is blank the latest user message in `context` is used
    /// instead. An empty plan means "answer without tools".
    pub async fn select(
        &self,
        request: &str,
        context: &ConversationContext,
        registry: &ToolRegistry,
        extractor: &dyn ParameterExtractor,
    ) -> Result<ExecutionPlan, PlanError> {
        let request = if request.trim().is_empty() {
            context.last_user_message().unwrap_or(request)
        } else {
            request
        };

        let candidates = self.rank(request, registry);
        if candidates.is_empty() {
            tracing::debug!("No tool qualified for request");
            return Ok(ExecutionPlan::empty());
        }

        let mut calls: Vec<PlannedCall> = Vec::with_capacity(candidates.len());
        let mut selected: HashMap<String, Vec<CallId>> = HashMap::new();

        for candidate in candidates {
            let tool = candidate.tool.as_ref();

            let extracted = match extractor.extract(tool.schema(), request).await {
                Ok(params) => params,
                Err(e) => {
                    tracing::warn!(tool = %tool.id(), error = %e, "Dropping candidate");
                    continue;
                }
            };

            let parameters = match tool.schema().validate(tool.id(), extracted) {
                Ok(params) => params,
                Err(e) => {
                    tracing::warn!(tool = %tool.id(), error = %e, "Dropping candidate");
                    continue;
                }
            };

            let id = CallId::new(calls.len() as u32);
            let mut call = PlannedCall::new(id, tool.id(), parameters);
            for upstream in &tool.descriptor().serialize_after {
                for &dependency in selected.get(upstream).into_iter().flatten() {
                    call = call.depends_on(dependency);
                }
            }

            tracing::debug!(
                call = %id,
                tool = %tool.id(),
                score = candidate.score,
                depends_on = call.depends_on.len(),
                "Planned call"
            );
            selected.entry(tool.id().to_string()).or_default().push(id);
            calls.push(call);
        }

        ExecutionPlan::new(calls)
    }
}
