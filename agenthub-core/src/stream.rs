//! Response streaming
//!
//! [`ResponseStream`] drives a [`TextGenerator`] and forwards each chunk as
//! soon as it arrives; nothing is buffered beyond the chunk being handed
//! over. The generator is only started on first poll.
//!
//! State machine: `Idle -> Streaming -> Completed`, with `Streaming ->
//! Cancelled` when the request's token fires or the stream is dropped
//! (client disconnect), and `Failed` when the generator reports an error.

use crate::context::ConversationContext;
use crate::error::{HubError, Result};
use crate::llm::{ChunkStream, TextGenerator};
use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// Lifecycle of a response stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Generator not started yet
    Idle,
    /// Forwarding chunks
    Streaming,
    /// Generator finished normally
    Completed,
    /// Request cancelled or consumer went away
    Cancelled,
    /// Generator reported an error
    Failed,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamState::Completed | StreamState::Cancelled | StreamState::Failed
        )
    }
}

enum Phase {
    Opening(BoxFuture<'static, Result<ChunkStream>>),
    Streaming(ChunkStream),
    Done,
}

/// Lazy stream of response chunks for one request
pub struct ResponseStream {
    phase: Phase,
    state: StreamState,
    chunks: usize,
    token: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl std::fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("state", &self.state)
            .field("chunks", &self.chunks)
            .finish()
    }
}

impl ResponseStream {
    fn new(
        generator: Arc<dyn TextGenerator>,
        context: ConversationContext,
        cancel: &CancellationToken,
    ) -> Self {
        let token = cancel.child_token();
        let open = {
            let token = token.clone();
            async move { generator.generate(&context, token).await }.boxed()
        };

        Self {
            phase: Phase::Opening(open),
            state: StreamState::Idle,
            chunks: 0,
            cancelled: Box::pin(token.clone().cancelled_owned()),
            token,
        }
    }

    /// Current state
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Number of chunks forwarded so far
    pub fn chunks_forwarded(&self) -> usize {
        self.chunks
    }

    fn finish(&mut self, state: StreamState) {
        self.phase = Phase::Done;
        self.state = state;
        match state {
            StreamState::Completed => {
                tracing::debug!(chunks = self.chunks, "Response stream completed")
            }
            StreamState::Cancelled => {
                tracing::debug!(chunks = self.chunks, "Response stream cancelled")
            }
            _ => tracing::warn!(chunks = self.chunks, ?state, "Response stream ended"),
        }
    }
}

impl Stream for ResponseStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.state.is_terminal() {
                return Poll::Ready(None);
            }
            if this.cancelled.as_mut().poll(cx).is_ready() {
                this.finish(StreamState::Cancelled);
                return Poll::Ready(None);
            }

            match &mut this.phase {
                Phase::Opening(open) => match open.as_mut().poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Ok(stream)) => {
                        this.phase = Phase::Streaming(stream);
                        this.state = StreamState::Streaming;
                    }
                    Poll::Ready(Err(HubError::Cancelled)) => {
                        this.finish(StreamState::Cancelled);
                        return Poll::Ready(None);
                    }
                    Poll::Ready(Err(e)) => {
                        this.finish(StreamState::Failed);
                        return Poll::Ready(Some(Err(e)));
                    }
                },
                Phase::Streaming(inner) => {
                    return match inner.poll_next_unpin(cx) {
                        Poll::Pending => Poll::Pending,
                        Poll::Ready(Some(Ok(chunk))) => {
                            this.chunks += 1;
                            Poll::Ready(Some(Ok(chunk)))
                        }
                        Poll::Ready(Some(Err(e))) => {
                            this.finish(StreamState::Failed);
                            Poll::Ready(Some(Err(e)))
                        }
                        Poll::Ready(None) => {
                            let state = if this.token.is_cancelled() {
                                StreamState::Cancelled
                            } else {
                                StreamState::Completed
                            };
                            this.finish(state);
                            Poll::Ready(None)
                        }
                    };
                }
                Phase::Done => return Poll::Ready(None),
            }
        }
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            tracing::debug!(chunks = self.chunks, "Response stream dropped, cancelling generator");
        }
        self.token.cancel();
    }
}

/// Drives the text generator for prepared contexts
#[derive(Clone)]
pub struct ResponseStreamer {
    generator: Arc<dyn TextGenerator>,
}

impl std::fmt::Debug for ResponseStreamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStreamer")
            .field("model", &self.generator.model_info())
            .finish()
    }
}

impl ResponseStreamer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub fn generator(&self) -> &Arc<dyn TextGenerator> {
        &self.generator
    }

    /// Stream the response for `context`
    pub fn stream(&self, context: ConversationContext, cancel: &CancellationToken) -> ResponseStream {
        ResponseStream::new(Arc::clone(&self.generator), context, cancel)
    }

    /// Accumulate the whole response into one message
    pub async fn complete(
        &self,
        context: ConversationContext,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let mut stream = self.stream(context, cancel);
        let mut message = String::new();
        while let Some(chunk) = stream.next().await {
            message.push_str(&chunk?);
        }

        if stream.state() == StreamState::Cancelled {
            return Err(HubError::Cancelled);
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::StaticGenerator;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn streamer(generator: impl TextGenerator + 'static) -> ResponseStreamer {
        ResponseStreamer::new(Arc::new(generator))
    }

    #[tokio::test]
    async fn test_idle_until_polled_then_completed() {
        let streamer = streamer(StaticGenerator::new(["Hello", ", ", "world"]));
        let mut stream = streamer.stream(ConversationContext::new(), &CancellationToken::new());
        assert_eq!(stream.state(), StreamState::Idle);

        assert_eq!(stream.next().await.unwrap().unwrap(), "Hello");
        assert_eq!(stream.state(), StreamState::Streaming);

        let rest: Vec<String> = (&mut stream).map(|c| c.unwrap()).collect().await;
        assert_eq!(rest, vec![", ", "world"]);
        assert_eq!(stream.state(), StreamState::Completed);
        assert_eq!(stream.chunks_forwarded(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_stream() {
        let streamer = streamer(StaticGenerator::new(["a", "b", "c", "d"]).with_delay(Duration::from_millis(100)));
        let cancel = CancellationToken::new();
        let mut stream = streamer.stream(ConversationContext::new(), &cancel);

        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        cancel.cancel();
        assert!(stream.next().await.is_none());
        assert_eq!(stream.state(), StreamState::Cancelled);
        assert_eq!(stream.chunks_forwarded(), 1);
    }

    #[tokio::test]
    async fn test_complete_accumulates() {
        let streamer = streamer(StaticGenerator::from_text("one two three"));
        let message = streamer
            .complete(ConversationContext::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(message, "one two three");
    }

    #[tokio::test]
    async fn test_complete_reports_cancellation() {
        let streamer = streamer(StaticGenerator::from_text("never sent"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = streamer.complete(ConversationContext::new(), &cancel).await;
        assert!(matches!(result, Err(HubError::Cancelled)));
    }

    struct BrokenGenerator;

    #[async_trait]
    impl TextGenerator for BrokenGenerator {
        async fn generate(
            &self,
            _context: &ConversationContext,
            _cancel: CancellationToken,
        ) -> Result<ChunkStream> {
            let chunks = vec![
                Ok("partial ".to_string()),
                Err(HubError::Generation("upstream closed".to_string())),
                Ok("unreachable".to_string()),
            ];
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    #[tokio::test]
    async fn test_generator_error_fails_stream() {
        let streamer = streamer(BrokenGenerator);
        let mut stream = streamer.stream(ConversationContext::new(), &CancellationToken::new());

        assert_eq!(stream.next().await.unwrap().unwrap(), "partial ");
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
        assert_eq!(stream.state(), StreamState::Failed);
    }

    struct WatchedGenerator {
        saw_cancel: Arc<AtomicBool>,
    }

    #[async_trait]
    impl TextGenerator for WatchedGenerator {
        async fn generate(
            &self,
            _context: &ConversationContext,
            cancel: CancellationToken,
        ) -> Result<ChunkStream> {
            let saw_cancel = Arc::clone(&self.saw_cancel);
            tokio::spawn(async move {
                cancel.cancelled().await;
                saw_cancel.store(true, Ordering::SeqCst);
            });
            Ok(Box::pin(futures::stream::pending()))
        }
    }

    #[tokio::test]
    async fn test_dropping_stream_cancels_generator() {
        let saw_cancel = Arc::new(AtomicBool::new(false));
        let streamer = streamer(WatchedGenerator {
            saw_cancel: Arc::clone(&saw_cancel),
        });
        let caller = CancellationToken::new();
        let mut stream = streamer.stream(ConversationContext::new(), &caller);

        // Open the generator, then disconnect
        tokio_test::assert_pending!(futures::poll!(stream.next()));
        assert_eq!(stream.state(), StreamState::Streaming);
        drop(stream);

        tokio::task::yield_now().await;
        assert!(saw_cancel.load(Ordering::SeqCst));
        assert!(!caller.is_cancelled());
    }
}
