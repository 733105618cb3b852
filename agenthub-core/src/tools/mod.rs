//! Tool system: capability interface, registry and results
//!
//! Every capability the engine can dispatch to implements [`Tool`] and carries
//! a [`ToolDescriptor`]:
//! - Parameter schema validated before a call is planned
//! - Pluggable applicability heuristic used for selection
//! - Execution limits (timeout, concurrency cap, rate limit, cache TTL)
//!
//! # Example
//!
//! ```rust,no_run
//! use agenthub_core::tools::{
//!     HandlerTool, KeywordHeuristic, ParamType, ParameterSchema, Parameters, ToolDescriptor,
//!     ToolInvocationError, ToolRegistry,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let descriptor = ToolDescriptor::new("echo", "Echoes the message back")
//!     .with_parameters(ParameterSchema::new().required("message", ParamType::String))
//!     .with_heuristic(KeywordHeuristic::new(["echo"]));
//!
//! let echo = HandlerTool::new(descriptor, |params: Parameters, _cancel: CancellationToken| async move {
//!     Ok::<_, ToolInvocationError>(params["message"].clone())
//! });
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(Arc::new(echo)).unwrap();
//! ```

mod heuristic;
mod registry;
mod result;
mod schema;
mod tool;

pub use heuristic::{
    normalize_score, ApplicabilityHeuristic, BoxedHeuristic, ConstantHeuristic, FnHeuristic,
    KeywordHeuristic,
};
pub use registry::{RegistryError, ToolRegistry, ToolSummary};
pub use result::{ToolResult, ToolStatus};
pub use schema::{
    FieldError, ParamType, ParameterSchema, ParameterSpec, ParameterValidationError, Parameters,
};
pub use tool::{
    BoxedTool, HandlerTool, Tool, ToolDescriptor, ToolHandler, ToolInvocationError,
    DEFAULT_CACHE_TTL, DEFAULT_MAX_CONCURRENT_CALLS, DEFAULT_TOOL_TIMEOUT,
};
