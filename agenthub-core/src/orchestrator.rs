//! Orchestrator facade
//!
//! Wires the selector, execution engine, context augmenter and response
//! streamer together behind the two calls an embedding application needs:
//!
//! - [`Orchestrator::select_and_execute`]: plan, run tools, merge evidence
//! - [`Orchestrator::stream_response`]: stream the generated answer
//!
//! # Example
//!
//! ```rust,ignore
//! use agenthub_core::prelude::*;
//!
//! let orchestrator = Orchestrator::builder()
//!     .registry(registry)
//!     .generator(Arc::new(StaticGenerator::from_text("It is sunny.")))
//!     .build()?;
//!
//! let cancel = CancellationToken::new();
//! let context = ConversationContext::new().with_user("weather in Oslo?");
//! let (context, results) = orchestrator
//!     .select_and_execute("weather in Oslo?", context, Some(Duration::from_secs(10)), &cancel)
//!     .await?;
//!
//! let mut stream = orchestrator.stream_response(context, &cancel);
//! while let Some(chunk) = stream.next().await {
//!     print!("{}", chunk?);
//! }
//! ```

use crate::cache::ResultCache;
use crate::config::HubConfig;
use crate::context::{ContextAugmenter, ConversationContext};
use crate::engine::ExecutionEngine;
use crate::error::{HubError, Result};
use crate::llm::{OpenAICompatibleGenerator, TextGenerator};
use crate::planner::{ParameterExtractor, RequestTextExtractor, Selector};
use crate::ratelimit::RateLimiter;
use crate::stream::{ResponseStream, ResponseStreamer};
use crate::tools::{ToolRegistry, ToolResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Entry point for processing requests
///
/// Expired cache entries are otherwise dropped only when read or when the
/// cache overflows; enable [`OrchestratorBuilder::cache_sweeper`] (or call
/// [`Orchestrator::spawn_cache_sweeper`]) to reclaim them periodically.
pub struct Orchestrator {
    selector: Selector,
    extractor: Arc<dyn ParameterExtractor>,
    engine: ExecutionEngine,
    augmenter: ContextAugmenter,
    streamer: ResponseStreamer,
    sweeper: Option<tokio::task::JoinHandle<()>>,
    config: HubConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("engine", &self.engine)
            .field("streamer", &self.streamer)
            .field("config", &self.config)
            .finish()
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        self.engine.registry()
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Whether the sweeper started by the builder is still running
    pub fn cache_sweeper_running(&self) -> bool {
        self.sweeper.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Select tools, run them and merge their results into `context`
    ///
    /// Results come back in plan order, one per planned call. When
    /// `deadline` elapses (or `cancel` fires) unfinished calls are reported
    /// as `Cancelled`; the augmented context is still returned so an answer
    /// can be generated without that evidence.
    pub async fn select_and_execute(
        &self,
        request: &str,
        context: ConversationContext,
        deadline: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<(ConversationContext, Vec<ToolResult>)> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("select_and_execute", %request_id);

        async move {
            let token = cancel.child_token();
            // `work` borrows `context`; it must be gone before `context` moves
            let results = {
                let mut work = std::pin::pin!(self.plan_and_run(request, &context, &token));
                match deadline {
                    Some(limit) => tokio::select! {
                        results = &mut work => results,
                        _ = tokio::time::sleep(limit) => {
                            tracing::warn!(?limit, "Request deadline elapsed, cancelling tool calls");
                            token.cancel();
                            work.await
                        }
                    },
                    None => work.await,
                }
            }?;

            tracing::info!(
                calls = results.len(),
                statuses = ?status_counts(&results),
                "Tool execution finished"
            );

            let context = self.augmenter.augment(context, &results);
            Ok((context, results))
        }
        .instrument(span)
        .await
    }

    async fn plan_and_run(
        &self,
        request: &str,
        context: &ConversationContext,
        token: &CancellationToken,
    ) -> Result<Vec<ToolResult>> {
        let plan = self
            .selector
            .select(request, context, self.engine.registry(), self.extractor.as_ref())
            .await?;

        if plan.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(calls = plan.len(), layers = plan.layers().len(), "Executing plan");
        Ok(self.engine.run(&plan, token).await)
    }

    /// Stream the answer for a prepared context
    pub fn stream_response(
        &self,
        context: ConversationContext,
        cancel: &CancellationToken,
    ) -> ResponseStream {
        self.streamer.stream(context, cancel)
    }

    /// Generate the whole answer for a prepared context
    pub async fn complete(
        &self,
        context: ConversationContext,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.streamer.complete(context, cancel).await
    }

    /// Non-streaming path: run tools, then return the whole answer
    pub async fn respond(
        &self,
        request: &str,
        context: ConversationContext,
        deadline: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let (context, _results) = self
            .select_and_execute(request, context, deadline, cancel)
            .await?;
        self.complete(context, cancel).await
    }

    /// Periodically evict expired cache entries until `cancel` fires
    ///
    /// The task also ends once the cache is dropped. Prefer
    /// [`OrchestratorBuilder::cache_sweeper`] unless the handle is needed.
    pub fn spawn_cache_sweeper(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        self.engine.cache().spawn_sweeper(cancel)
    }
}

fn status_counts(results: &[ToolResult]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for status in results.iter().map(|r| r.status) {
        *counts.entry(status.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Builder for [`Orchestrator`]
#[derive(Default)]
pub struct OrchestratorBuilder {
    registry: Option<Arc<ToolRegistry>>,
    extractor: Option<Arc<dyn ParameterExtractor>>,
    generator: Option<Arc<dyn TextGenerator>>,
    cache: Option<Arc<ResultCache>>,
    limiter: Option<Arc<RateLimiter>>,
    sweeper: Option<CancellationToken>,
    config: Option<HubConfig>,
}

impl OrchestratorBuilder {
    /// Set the tool registry
    pub fn registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    /// Share an existing registry
    pub fn shared_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the parameter extractor (defaults to binding the request text to `query`)
    pub fn extractor(mut self, extractor: Arc<dyn ParameterExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Set the text generator (defaults to one built from `config.generator`)
    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Share a result cache across orchestrators
    pub fn cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Share a rate limiter across orchestrators
    pub fn limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn config(mut self, config: HubConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sweep expired cache entries every `cache.sweep_interval`
    ///
    /// The sweeper is spawned by `build()` on the current Tokio runtime and
    /// runs until `cancel` fires or the cache is dropped.
    pub fn cache_sweeper(mut self, cancel: CancellationToken) -> Self {
        self.sweeper = Some(cancel);
        self
    }

    /// Build the orchestrator
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, no generator is
    /// available, or a cache sweeper was requested outside a Tokio runtime.
    pub fn build(self) -> Result<Orchestrator> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let generator: Arc<dyn TextGenerator> = match (self.generator, &config.generator) {
            (Some(generator), _) => generator,
            (None, Some(generator_config)) => {
                Arc::new(OpenAICompatibleGenerator::new(generator_config.clone())?)
            }
            (None, None) => {
                return Err(HubError::Configuration(
                    "No text generator configured".to_string(),
                ));
            }
        };

        let registry = self.registry.unwrap_or_default();
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(ResultCache::new(config.cache.clone())));
        let sweeper = match self.sweeper {
            Some(cancel) => {
                if tokio::runtime::Handle::try_current().is_err() {
                    return Err(HubError::Configuration(
                        "Cache sweeper requires a Tokio runtime".to_string(),
                    ));
                }
                tracing::debug!(interval = ?cache.config().sweep_interval, "Starting cache sweeper");
                Some(cache.spawn_sweeper(cancel))
            }
            None => None,
        };
        let limiter = self.limiter.unwrap_or_default();
        let engine = ExecutionEngine::new(registry, cache, limiter, config.engine.clone());

        tracing::info!(
            tools = engine.registry().len(),
            model = %generator.model_info().model_name,
            "Orchestrator ready"
        );

        Ok(Orchestrator {
            selector: Selector::new(config.selector.clone()),
            extractor: self
                .extractor
                .unwrap_or_else(|| Arc::new(RequestTextExtractor::default())),
            engine,
            augmenter: ContextAugmenter::new(config.augmenter.clone()),
            streamer: ResponseStreamer::new(generator),
            sweeper,
            config,
        })
    }
}
