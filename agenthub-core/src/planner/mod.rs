//! Planning: tool selection, parameter extraction and execution plans

mod extractor;
mod plan;
mod selector;

pub use extractor::{ExtractionError, ParameterExtractor, RequestTextExtractor, SchemaDefaults};
pub use plan::{CallId, ExecutionPlan, PlanError, PlannedCall};
pub use selector::{Candidate, Selector, SelectorConfig};
