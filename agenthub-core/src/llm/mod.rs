//! Text generation
//!
//! The response generator is an external collaborator behind
//! [`TextGenerator`]: given the augmented conversation it yields a finite,
//! lazy sequence of text chunks. Each call opens a fresh stream; streams are
//! not restartable.

use crate::context::{ConversationContext, Message};
use crate::error::Result;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::pin::Pin;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod openai;

pub use openai::{GeneratorConfig, OpenAICompatibleGenerator, API_KEY_ENV};

/// Stream of generated text chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Model information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub provider: String,
    pub model_name: String,
}

/// Trait for response generators
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Start generating a response for `context`
    ///
    /// The returned stream ends early once `cancel` fires.
    async fn generate(
        &self,
        context: &ConversationContext,
        cancel: CancellationToken,
    ) -> Result<ChunkStream>;

    /// Get model information
    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "unknown".to_string(),
            model_name: "unknown".to_string(),
        }
    }
}

/// Generator that replays fixed chunks
///
/// Useful offline and in tests; records the messages it was last asked to
/// answer so callers can inspect the augmented context.
#[derive(Debug, Default)]
pub struct StaticGenerator {
    chunks: Vec<String>,
    delay: Option<Duration>,
    last_messages: Mutex<Option<Vec<Message>>>,
}

impl StaticGenerator {
    pub fn new<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            delay: None,
            last_messages: Mutex::new(None),
        }
    }

    /// Split `text` into word chunks, keeping the whitespace
    pub fn from_text(text: &str) -> Self {
        Self::new(text.split_inclusive(' ').map(str::to_string))
    }

    /// Wait `delay` before each chunk
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Messages of the most recent `generate` call
    pub fn last_messages(&self) -> Option<Vec<Message>> {
        self.last_messages.lock().clone()
    }
}

#[async_trait]
impl TextGenerator for StaticGenerator {
    async fn generate(
        &self,
        context: &ConversationContext,
        cancel: CancellationToken,
    ) -> Result<ChunkStream> {
        *self.last_messages.lock() = Some(context.render_messages());

        let delay = self.delay;
        let stream = futures::stream::iter(self.chunks.clone())
            .then(move |chunk| async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(chunk)
            })
            .take_until(cancel.cancelled_owned());

        Ok(Box::pin(stream))
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "static".to_string(),
            model_name: "static".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_generator_replays_chunks() {
        let generator = StaticGenerator::from_text("hello brave new world");
        let context = ConversationContext::new().with_user("hi");

        let chunks: Vec<String> = generator
            .generate(&context, CancellationToken::new())
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;

        assert_eq!(chunks, vec!["hello ", "brave ", "new ", "world"]);
        assert_eq!(generator.last_messages().unwrap(), context.render_messages());
    }

    #[tokio::test(start_paused = true)]
    async fn test_static_generator_stops_on_cancel() {
        let generator = StaticGenerator::new(["a", "b", "c"]).with_delay(Duration::from_millis(100));
        let cancel = CancellationToken::new();
        let mut stream = generator
            .generate(&ConversationContext::new(), cancel.clone())
            .await
            .unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        cancel.cancel();
        assert!(stream.next().await.is_none());
    }
}
