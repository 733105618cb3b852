//! Execution engine
//!
//! Runs an [`ExecutionPlan`] layer by layer. Calls within a layer run as
//! concurrent tasks; a layer starts only after every call of the previous
//! layer has produced its result. Each call goes through:
//!
//! 1. Result cache lookup (hit short-circuits with `CacheHit`)
//! 2. Rate-limit token acquisition with a bounded wait (`RateLimited`)
//! 3. Per-tool concurrency permit
//! 4. Invocation under the call's timeout (`TimedOut`)
//! 5. Cache store on success (`Success`) or `Failure` on a tool error
//!
//! Per-call problems never abort sibling calls and never surface as errors:
//! `run` always returns exactly one [`ToolResult`] per planned call, in plan
//! order. When the request is cancelled, calls that have not finished are
//! reported as `Cancelled`.

use crate::cache::{CacheKey, ResultCache};
use crate::planner::{ExecutionPlan, PlannedCall};
use crate::ratelimit::RateLimiter;
use crate::tools::{Tool, ToolRegistry, ToolResult};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const MAX_LOG_ERROR_CHARS: usize = 2_000;

/// Cap on call timeouts so deadlines stay representable as an `Instant`
const MAX_CALL_TIMEOUT_SECS: u64 = 60 * 60 * 24 * 365;

fn truncate_for_log(input: &str, max_chars: usize) -> String {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return input.to_string();
    }
    let mut preview: String = input.chars().take(max_chars).collect();
    preview.push_str(&format!("... [truncated, total_chars={}]", char_count));
    preview
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Longest wait for a rate-limit token
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(2),
        }
    }
}

struct EngineInner {
    registry: Arc<ToolRegistry>,
    cache: Arc<ResultCache>,
    limiter: Arc<RateLimiter>,
    concurrency: HashMap<String, Arc<Semaphore>>,
    config: EngineConfig,
}

/// Executes plans against a registry
///
/// Cheap to clone; clones share the cache, limiter and concurrency caps.
#[derive(Clone)]
pub struct ExecutionEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("tools", &self.inner.registry.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl ExecutionEngine {
    /// Create an engine
    ///
    /// Tools that declare a rate limit get a bucket in `limiter` unless the
    /// limiter already has one for them (so tests and callers can inject
    /// their own).
    pub fn new(
        registry: Arc<ToolRegistry>,
        cache: Arc<ResultCache>,
        limiter: Arc<RateLimiter>,
        config: EngineConfig,
    ) -> Self {
        let mut concurrency = HashMap::with_capacity(registry.len());
        for tool in registry.all() {
            let descriptor = tool.descriptor();
            if let Some(rate_limit) = descriptor.rate_limit {
                if !limiter.is_configured(&descriptor.id) {
                    limiter.configure(descriptor.id.clone(), rate_limit);
                }
            }
            concurrency.insert(
                descriptor.id.clone(),
                Arc::new(Semaphore::new(descriptor.max_concurrent_calls.max(1))),
            );
        }

        Self {
            inner: Arc::new(EngineInner {
                registry,
                cache,
                limiter,
                concurrency,
                config,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.inner.registry
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.inner.cache
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.inner.limiter
    }

    /// Run every call of `plan`, returning results in plan order
    pub async fn run(&self, plan: &ExecutionPlan, cancel: &CancellationToken) -> Vec<ToolResult> {
        let mut slots: Vec<Option<ToolResult>> = vec![None; plan.len()];

        for (depth, layer) in plan.layers().iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::debug!(layer = depth, "Request cancelled, skipping remaining layers");
                break;
            }
            tracing::debug!(layer = depth, calls = layer.len(), "Dispatching layer");

            let mut running: FuturesUnordered<_> = layer
                .iter()
                .map(|&index| {
                    let inner = Arc::clone(&self.inner);
                    let call = plan.calls()[index].clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move { inner.execute(call, cancel).await })
                        .map(move |joined| (index, joined))
                })
                .collect();

            while let Some((index, joined)) = running.next().await {
                let result = match joined {
                    Ok(result) => result,
                    Err(e) => {
                        let call = &plan.calls()[index];
                        tracing::error!(call = %call.id, tool = %call.tool_id, error = %e, "Call task failed");
                        ToolResult::failure(
                            call.id,
                            call.tool_id.clone(),
                            format!("call task failed: {}", e),
                            Utc::now(),
                            Duration::ZERO,
                        )
                    }
                };
                slots[index] = Some(result);
            }
        }

        slots
            .into_iter()
            .zip(plan.calls())
            .map(|(slot, call)| {
                slot.unwrap_or_else(|| {
                    ToolResult::cancelled(call.id, call.tool_id.clone(), Utc::now(), Duration::ZERO)
                })
            })
            .collect()
    }
}

impl EngineInner {
    async fn execute(&self, call: PlannedCall, cancel: CancellationToken) -> ToolResult {
        let started_at = Utc::now();
        let clock = Instant::now();

        if cancel.is_cancelled() {
            return ToolResult::cancelled(call.id, call.tool_id, started_at, Duration::ZERO);
        }

        let tool = match self.registry.lookup(&call.tool_id) {
            Ok(tool) => Arc::clone(tool),
            Err(e) => {
                tracing::warn!(call = %call.id, error = %e, "Planned call references unknown tool");
                return ToolResult::failure(call.id, call.tool_id, e.to_string(), started_at, clock.elapsed());
            }
        };
        let descriptor = tool.descriptor();

        let cache_key = CacheKey::new(&call.tool_id, &call.parameters);
        if !descriptor.cache_ttl.is_zero() {
            if let Some(payload) = self.cache.get(&cache_key) {
                tracing::debug!(call = %call.id, tool = %call.tool_id, key = %cache_key, "Cache hit");
                return ToolResult::cache_hit(call.id, call.tool_id, payload, started_at, clock.elapsed());
            }
        }

        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return ToolResult::cancelled(call.id, call.tool_id, started_at, clock.elapsed());
            }
            acquired = self.limiter.acquire(&call.tool_id, self.config.acquire_timeout) => acquired,
        };
        if let Err(e) = acquired {
            tracing::warn!(call = %call.id, tool = %call.tool_id, error = %e, "Rate limited");
            return ToolResult::rate_limited(call.id, call.tool_id, e.to_string(), started_at, clock.elapsed());
        }

        let timeout = call.timeout.unwrap_or(descriptor.default_timeout);
        let deadline = clock + timeout.min(Duration::from_secs(MAX_CALL_TIMEOUT_SECS));

        let permit = match self.concurrency.get(&call.tool_id) {
            Some(semaphore) => {
                let semaphore = Arc::clone(semaphore);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return ToolResult::cancelled(call.id, call.tool_id, started_at, clock.elapsed());
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        tracing::warn!(call = %call.id, tool = %call.tool_id, ?timeout, "Timed out waiting for a concurrency slot");
                        return ToolResult::timed_out(call.id, call.tool_id, timeout, started_at, clock.elapsed());
                    }
                    permit = semaphore.acquire_owned() => permit.ok(),
                }
            }
            None => None,
        };

        self.invoke(tool, call, cache_key, permit, cancel, deadline, timeout, started_at, clock)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn invoke(
        &self,
        tool: Arc<dyn Tool>,
        call: PlannedCall,
        cache_key: CacheKey,
        permit: Option<OwnedSemaphorePermit>,
        cancel: CancellationToken,
        deadline: Instant,
        timeout: Duration,
        started_at: chrono::DateTime<Utc>,
        clock: Instant,
    ) -> ToolResult {
        let cancellable = tool.descriptor().cancellable;
        let cache_ttl = tool.descriptor().cache_ttl;
        let call_token = cancel.child_token();

        let handle = {
            let call_token = call_token.clone();
            let params = call.parameters.clone();
            tokio::spawn(async move {
                // Held until the invocation ends, even when detached
                let _permit = permit;
                tool.invoke(params, call_token).await
            })
        };
        let abort = handle.abort_handle();

        let joined = tokio::select! {
            joined = handle => joined,
            _ = cancel.cancelled() => {
                call_token.cancel();
                if cancellable {
                    abort.abort();
                }
                tracing::debug!(call = %call.id, tool = %call.tool_id, "Call cancelled");
                return ToolResult::cancelled(call.id, call.tool_id, started_at, clock.elapsed());
            }
            _ = tokio::time::sleep_until(deadline) => {
                call_token.cancel();
                if cancellable {
                    abort.abort();
                } else {
                    tracing::debug!(call = %call.id, tool = %call.tool_id, "Detaching non-cancellable call");
                }
                tracing::warn!(call = %call.id, tool = %call.tool_id, ?timeout, "Call timed out");
                return ToolResult::timed_out(call.id, call.tool_id, timeout, started_at, clock.elapsed());
            }
        };

        let duration = clock.elapsed();
        match joined {
            Ok(Ok(payload)) => {
                self.cache.put(cache_key, payload.clone(), cache_ttl);
                tracing::debug!(call = %call.id, tool = %call.tool_id, ?duration, "Call succeeded");
                ToolResult::success(call.id, call.tool_id, payload, started_at, duration)
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    call = %call.id,
                    tool = %call.tool_id,
                    error = %truncate_for_log(&e.message, MAX_LOG_ERROR_CHARS),
                    "Call failed"
                );
                ToolResult::failure(call.id, call.tool_id, e.message, started_at, duration)
            }
            Err(e) => {
                let detail = if e.is_panic() {
                    "tool panicked".to_string()
                } else {
                    format!("tool task ended unexpectedly: {}", e)
                };
                tracing::error!(call = %call.id, tool = %call.tool_id, error = %detail, "Call failed");
                ToolResult::failure(call.id, call.tool_id, detail, started_at, duration)
            }
        }
    }
}

#[cfg(test)]
mod tests;
