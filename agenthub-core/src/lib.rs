//! # Agent Hub - Tool Orchestration Core
//!
//! Agent Hub answers a conversational request by deciding which tools apply,
//! running them concurrently under per-tool limits, and feeding their results
//! to a text generator whose output is streamed back chunk by chunk:
//! - Tool registry with schemas and applicability heuristics
//! - Relevance-ranked selection into a dependency-aware execution plan
//! - Concurrent execution with timeouts, concurrency caps and rate limits
//! - TTL result cache keyed by tool and canonicalized parameters
//! - Evidence-augmented conversation context
//! - Cancellable response streaming
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agenthub_core::prelude::*;
//! use futures::StreamExt;
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut registry = ToolRegistry::new();
//!     registry.register(Arc::new(HandlerTool::new(
//!         ToolDescriptor::new("weather", "Current weather for a city")
//!             .with_heuristic(KeywordHeuristic::new(["weather", "forecast"])),
//!         |_params: Parameters, _cancel: CancellationToken| async move {
//!             Ok::<_, ToolInvocationError>(json!({"temperature_c": 11}))
//!         },
//!     )))?;
//!
//!     let orchestrator = Orchestrator::builder()
//!         .registry(registry)
//!         .config(HubConfig::load()?)
//!         .build()?;
//!
//!     let cancel = CancellationToken::new();
//!     let context = ConversationContext::new().with_user("What's the weather in Oslo?");
//!     let (context, _results) = orchestrator
//!         .select_and_execute("What's the weather in Oslo?", context, Some(Duration::from_secs(10)), &cancel)
//!         .await?;
//!
//!     let mut stream = orchestrator.stream_response(context, &cancel);
//!     while let Some(chunk) = stream.next().await {
//!         print!("{}", chunk?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **tools**: descriptors, the [`tools::Tool`] trait and the registry
//! - **planner**: selection and the layered [`planner::ExecutionPlan`]
//! - **engine**: plan execution with cache and rate-limit checks
//! - **context**: conversation messages and the evidence section
//! - **stream**: the response stream state machine
//! - **orchestrator**: the facade tying these together

pub mod cache;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod llm;
pub mod logging;
pub mod orchestrator;
pub mod planner;
pub mod ratelimit;
pub mod stream;
pub mod tools;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::{CacheConfig, CacheKey, ResultCache};
    pub use crate::config::{ConfigBuilder, HubConfig};
    pub use crate::context::{
        AugmenterConfig, ContextAugmenter, ConversationContext, EvidenceSection, Message,
        MessageRole,
    };
    pub use crate::engine::{EngineConfig, ExecutionEngine};
    pub use crate::error::{HubError, Result};
    pub use crate::llm::{
        ChunkStream, GeneratorConfig, ModelInfo, OpenAICompatibleGenerator, StaticGenerator,
        TextGenerator,
    };
    pub use crate::orchestrator::{Orchestrator, OrchestratorBuilder};
    pub use crate::planner::{
        CallId, ExecutionPlan, ParameterExtractor, PlanError, PlannedCall, RequestTextExtractor,
        Selector, SelectorConfig,
    };
    pub use crate::ratelimit::{RateLimitConfig, RateLimiter};
    pub use crate::stream::{ResponseStream, ResponseStreamer, StreamState};
    pub use crate::tools::{
        ApplicabilityHeuristic, HandlerTool, KeywordHeuristic, ParamType, ParameterSchema,
        Parameters, Tool, ToolDescriptor, ToolInvocationError, ToolRegistry, ToolResult,
        ToolStatus,
    };

    pub use tokio_util::sync::CancellationToken;
}
