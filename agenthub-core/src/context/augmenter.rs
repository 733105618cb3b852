//! Merging tool results into the conversation
//!
//! Usable results (`Success`, `CacheHit`) become evidence entries carrying
//! their payload. Everything else becomes a short diagnostic note naming the
//! tool and a generic reason; raw error text never reaches the context.

use super::ConversationContext;
use crate::planner::CallId;
use crate::tools::{ToolResult, ToolStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Annotation used when tools ran but none produced usable evidence
pub const NO_EVIDENCE_NOTE: &str =
    "No tool evidence was available for this request. Answer from your own knowledge and say so when unsure.";

/// Augmenter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmenterConfig {
    /// Longest payload rendering kept per evidence entry
    pub max_evidence_chars: usize,
}

impl Default for AugmenterConfig {
    fn default() -> Self {
        Self {
            max_evidence_chars: 4000,
        }
    }
}

/// Payload of one usable result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceEntry {
    pub call_id: CallId,
    pub tool_id: String,
    pub status: ToolStatus,
    /// Rendered (possibly truncated) payload
    pub content: String,
}

/// Notice for a result without usable evidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticNote {
    pub call_id: CallId,
    pub tool_id: String,
    pub status: ToolStatus,
    pub reason: String,
}

/// Tool evidence attached to a conversation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSection {
    pub entries: Vec<EvidenceEntry>,
    pub notes: Vec<DiagnosticNote>,
    /// Set when tools ran and none produced evidence
    pub fallback: bool,
}

impl EvidenceSection {
    /// Section carrying only the fallback annotation
    pub fn fallback() -> Self {
        Self {
            fallback: true,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.notes.is_empty() && !self.fallback
    }

    /// Render as the text of a system message
    pub fn render(&self) -> String {
        let mut out = String::from("Tool evidence for the latest request:\n");

        for entry in &self.entries {
            out.push_str(&format!("\n[{}] {}:\n{}\n", entry.call_id, entry.tool_id, entry.content));
        }

        if !self.notes.is_empty() {
            out.push_str("\nUnavailable tools:\n");
            for note in &self.notes {
                out.push_str(&format!("- {}: {}\n", note.tool_id, note.reason));
            }
        }

        if self.fallback {
            out.push('\n');
            out.push_str(NO_EVIDENCE_NOTE);
            out.push('\n');
        }
        out
    }
}

/// Builds the evidence section from engine results
#[derive(Debug, Clone, Default)]
pub struct ContextAugmenter {
    config: AugmenterConfig,
}

impl ContextAugmenter {
    pub fn new(config: AugmenterConfig) -> Self {
        Self { config }
    }

    /// Attach evidence for `results` (in call order) to `context`
    ///
    /// An empty result set leaves the context untouched: no tools were
    /// planned, so there is nothing to report.
    pub fn augment(&self, context: ConversationContext, results: &[ToolResult]) -> ConversationContext {
        if results.is_empty() {
            return context;
        }

        let section = self.build_section(results);
        tracing::debug!(
            evidence = section.entries.len(),
            notes = section.notes.len(),
            fallback = section.fallback,
            "Augmented context"
        );
        context.with_evidence(section)
    }

    pub fn build_section(&self, results: &[ToolResult]) -> EvidenceSection {
        let mut section = EvidenceSection::default();

        for result in results {
            match (&result.payload, result.is_usable()) {
                (Some(payload), true) => section.entries.push(EvidenceEntry {
                    call_id: result.call_id,
                    tool_id: result.tool_id.clone(),
                    status: result.status,
                    content: self.render_payload(payload),
                }),
                _ => section.notes.push(DiagnosticNote {
                    call_id: result.call_id,
                    tool_id: result.tool_id.clone(),
                    status: result.status,
                    reason: diagnostic_reason(result.status).to_string(),
                }),
            }
        }

        section.fallback = section.entries.is_empty();
        section
    }

    fn render_payload(&self, payload: &Value) -> String {
        let rendered = match payload {
            Value::String(text) => text.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        };
        truncate_chars(&rendered, self.config.max_evidence_chars)
    }
}

/// Generic reason shown for a non-usable status
fn diagnostic_reason(status: ToolStatus) -> &'static str {
    match status {
        ToolStatus::Failure => "the tool reported an error",
        ToolStatus::TimedOut => "the tool did not respond in time",
        ToolStatus::RateLimited => "the tool is temporarily rate limited",
        ToolStatus::Cancelled => "the request was cancelled before the tool finished",
        ToolStatus::Success | ToolStatus::CacheHit => "the tool returned no data",
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}... [truncated]", &text[..cut]),
        None => text.to_string(),
    }
}
