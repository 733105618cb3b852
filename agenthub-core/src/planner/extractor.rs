//! Parameter extraction
//!
//! Turning free text into structured parameters is delegated to a
//! [`ParameterExtractor`]. The selector validates whatever comes back against
//! the tool's schema, so extractors never need to coerce or guess.

use crate::tools::{ParamType, ParameterSchema, Parameters};
use async_trait::async_trait;
use serde_json::Value;

/// Error returned by an extractor
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("parameter extraction failed: {message}")]
pub struct ExtractionError {
    pub message: String,
}

impl ExtractionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Collaborator that derives tool parameters from a request
#[async_trait]
pub trait ParameterExtractor: Send + Sync {
    async fn extract(
        &self,
        schema: &ParameterSchema,
        request_text: &str,
    ) -> Result<Parameters, ExtractionError>;
}

/// Extractor that supplies nothing and lets schema defaults fill in
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaDefaults;

#[async_trait]
impl ParameterExtractor for SchemaDefaults {
    async fn extract(
        &self,
        _schema: &ParameterSchema,
        _request_text: &str,
    ) -> Result<Parameters, ExtractionError> {
        Ok(Parameters::new())
    }
}

/// Binds the request text to one named string parameter
///
/// Tools whose schema does not declare the parameter (or declares it with a
/// non-string type) get an empty parameter set.
#[derive(Debug, Clone)]
pub struct RequestTextExtractor {
    param: String,
}

impl RequestTextExtractor {
    pub fn new(param: impl Into<String>) -> Self {
        Self {
            param: param.into(),
        }
    }
}

impl Default for RequestTextExtractor {
    fn default() -> Self {
        Self::new("query")
    }
}

#[async_trait]
impl ParameterExtractor for RequestTextExtractor {
    async fn extract(
        &self,
        schema: &ParameterSchema,
        request_text: &str,
    ) -> Result<Parameters, ExtractionError> {
        let mut params = Parameters::new();
        let Some(spec) = schema.get(&self.param) else {
            return Ok(params);
        };

        if matches!(spec.param_type, ParamType::String | ParamType::Any) {
            let text = request_text.trim();
            if !text.is_empty() {
                params.insert(self.param.clone(), Value::String(text.to_string()));
            }
        }
        Ok(params)
    }
}
