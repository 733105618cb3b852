//! Tool trait and capability descriptors
//!
//! A tool is a capability the engine can invoke with structured parameters.
//! Each tool carries a [`ToolDescriptor`]: its identity, parameter schema,
//! applicability heuristic and execution limits.

use super::heuristic::{ApplicabilityHeuristic, BoxedHeuristic, ConstantHeuristic};
use super::schema::{ParameterSchema, Parameters};
use crate::ratelimit::RateLimitConfig;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default per-call timeout
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cache lifetime of a successful result
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default number of simultaneous invocations per tool
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 4;

/// Static metadata describing one tool
///
/// Immutable once the tool is registered.
#[derive(Clone)]
pub struct ToolDescriptor {
    /// Unique tool identifier
    pub id: String,

    /// Human-readable description
    pub description: String,

    /// Accepted parameters
    pub parameters: ParameterSchema,

    /// Relevance scoring for free-text requests
    pub heuristic: BoxedHeuristic,

    /// Maximum simultaneous invocations
    pub max_concurrent_calls: usize,

    /// Per-call timeout unless the planned call overrides it
    pub default_timeout: Duration,

    /// How long successful results stay cached (zero disables caching)
    pub cache_ttl: Duration,

    /// Token bucket for this tool (None = unthrottled)
    pub rate_limit: Option<RateLimitConfig>,

    /// Tools that must finish before this one starts when both are selected
    pub serialize_after: Vec<String>,

    /// Whether invocations stop promptly when their token is cancelled
    pub cancellable: bool,
}

impl ToolDescriptor {
    /// Create a descriptor with defaults and a heuristic that never matches
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            parameters: ParameterSchema::new(),
            heuristic: Arc::new(ConstantHeuristic(0.0)),
            max_concurrent_calls: DEFAULT_MAX_CONCURRENT_CALLS,
            default_timeout: DEFAULT_TOOL_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
            rate_limit: None,
            serialize_after: Vec::new(),
            cancellable: true,
        }
    }

    /// Set the parameter schema
    pub fn with_parameters(mut self, parameters: ParameterSchema) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the applicability heuristic
    pub fn with_heuristic(mut self, heuristic: impl ApplicabilityHeuristic + 'static) -> Self {
        self.heuristic = Arc::new(heuristic);
        self
    }

    /// Set the concurrency cap (at least one)
    pub fn with_max_concurrent_calls(mut self, max: usize) -> Self {
        self.max_concurrent_calls = max.max(1);
        self
    }

    /// Set the default timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the cache lifetime
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Throttle this tool with a token bucket
    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    /// Require this tool to run after another selected tool
    pub fn serialize_after(mut self, tool_id: impl Into<String>) -> Self {
        self.serialize_after.push(tool_id.into());
        self
    }

    /// Declare whether invocations honour cancellation
    pub fn with_cancellable(mut self, cancellable: bool) -> Self {
        self.cancellable = cancellable;
        self
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("id", &self.id)
            .field("parameters", &self.parameters.parameters.keys().collect::<Vec<_>>())
            .field("max_concurrent_calls", &self.max_concurrent_calls)
            .field("default_timeout", &self.default_timeout)
            .field("cache_ttl", &self.cache_ttl)
            .field("rate_limit", &self.rate_limit)
            .field("cancellable", &self.cancellable)
            .finish()
    }
}

/// Error reported by a tool's own execution
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ToolInvocationError {
    /// Raw error text (logged, never shown to end users)
    pub message: String,
}

impl ToolInvocationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for ToolInvocationError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ToolInvocationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Core tool trait
///
/// The engine enforces caching, rate limits, concurrency caps and timeouts
/// around `invoke`; implementations only do the work itself and should return
/// promptly once `cancel` fires.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool descriptor
    fn descriptor(&self) -> &ToolDescriptor;

    /// Get tool id (convenience method)
    fn id(&self) -> &str {
        &self.descriptor().id
    }

    /// Get the parameter schema (convenience method)
    fn schema(&self) -> &ParameterSchema {
        &self.descriptor().parameters
    }

    /// Relevance of this tool to a request
    fn applicability(&self, request: &str) -> f32 {
        self.descriptor().heuristic.score(request)
    }

    /// Execute the tool with validated parameters
    async fn invoke(
        &self,
        params: Parameters,
        cancel: CancellationToken,
    ) -> Result<Value, ToolInvocationError>;
}

/// Handler trait for simpler tool implementations
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(
        &self,
        params: Parameters,
        cancel: CancellationToken,
    ) -> Result<Value, ToolInvocationError>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(Parameters, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolInvocationError>> + Send + 'static,
{
    async fn handle(
        &self,
        params: Parameters,
        cancel: CancellationToken,
    ) -> Result<Value, ToolInvocationError> {
        (self)(params, cancel).await
    }
}

/// Wrapper to turn a descriptor plus a [`ToolHandler`] into a full [`Tool`]
pub struct HandlerTool<H: ToolHandler> {
    descriptor: ToolDescriptor,
    handler: H,
}

impl<H: ToolHandler> HandlerTool<H> {
    /// Create a new handler tool
    pub fn new(descriptor: ToolDescriptor, handler: H) -> Self {
        Self {
            descriptor,
            handler,
        }
    }
}

#[async_trait]
impl<H: ToolHandler + 'static> Tool for HandlerTool<H> {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(
        &self,
        params: Parameters,
        cancel: CancellationToken,
    ) -> Result<Value, ToolInvocationError> {
        self.handler.handle(params, cancel).await
    }
}

/// Type alias for shared tools
pub type BoxedTool = Arc<dyn Tool>;
