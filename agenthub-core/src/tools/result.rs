//! Tool call results
//!
//! Every planned call produces exactly one [`ToolResult`], whatever happened
//! to it. Failures are data, not errors: the status records the outcome and
//! the raw error text stays in `error_detail` for logs only.

use crate::planner::CallId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Outcome of one planned call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// Tool ran and returned a payload
    Success,
    /// Tool reported an error
    Failure,
    /// Tool did not finish within its timeout
    TimedOut,
    /// No rate-limit token could be acquired in time
    RateLimited,
    /// Payload served from the result cache
    CacheHit,
    /// The request was cancelled before the call finished
    Cancelled,
}

impl ToolStatus {
    /// Whether the result carries usable evidence
    pub fn is_usable(&self) -> bool {
        matches!(self, ToolStatus::Success | ToolStatus::CacheHit)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Success => "success",
            ToolStatus::Failure => "failure",
            ToolStatus::TimedOut => "timed_out",
            ToolStatus::RateLimited => "rate_limited",
            ToolStatus::CacheHit => "cache_hit",
            ToolStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single planned call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Call this result belongs to
    pub call_id: CallId,

    /// Tool that was (or would have been) invoked
    pub tool_id: String,

    /// Outcome
    pub status: ToolStatus,

    /// Payload for `Success` and `CacheHit`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Raw error text for non-success outcomes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,

    /// When the call started
    pub started_at: DateTime<Utc>,

    /// How long the call took
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl ToolResult {
    fn new(
        call_id: CallId,
        tool_id: impl Into<String>,
        status: ToolStatus,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            call_id,
            tool_id: tool_id.into(),
            status,
            payload: None,
            error_detail: None,
            started_at,
            duration,
        }
    }

    /// Tool returned a payload
    pub fn success(
        call_id: CallId,
        tool_id: impl Into<String>,
        payload: Value,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        let mut result = Self::new(call_id, tool_id, ToolStatus::Success, started_at, duration);
        result.payload = Some(payload);
        result
    }

    /// Payload served from the cache
    pub fn cache_hit(
        call_id: CallId,
        tool_id: impl Into<String>,
        payload: Value,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        let mut result = Self::new(call_id, tool_id, ToolStatus::CacheHit, started_at, duration);
        result.payload = Some(payload);
        result
    }

    /// Tool reported an error
    pub fn failure(
        call_id: CallId,
        tool_id: impl Into<String>,
        detail: impl Into<String>,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        let mut result = Self::new(call_id, tool_id, ToolStatus::Failure, started_at, duration);
        result.error_detail = Some(detail.into());
        result
    }

    /// Tool exceeded its timeout
    pub fn timed_out(
        call_id: CallId,
        tool_id: impl Into<String>,
        timeout: Duration,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        let mut result = Self::new(call_id, tool_id, ToolStatus::TimedOut, started_at, duration);
        result.error_detail = Some(format!("timed out after {:?}", timeout));
        result
    }

    /// No rate-limit token in time
    pub fn rate_limited(
        call_id: CallId,
        tool_id: impl Into<String>,
        detail: impl Into<String>,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        let mut result = Self::new(call_id, tool_id, ToolStatus::RateLimited, started_at, duration);
        result.error_detail = Some(detail.into());
        result
    }

    /// Call cancelled (or never started) because the request was cancelled
    pub fn cancelled(
        call_id: CallId,
        tool_id: impl Into<String>,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self::new(call_id, tool_id, ToolStatus::Cancelled, started_at, duration)
    }

    /// Check if the result carries usable evidence
    pub fn is_usable(&self) -> bool {
        self.status.is_usable()
    }
}
