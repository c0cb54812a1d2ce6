use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};

use crate::errors::{AdapterError, AdapterResult};
use crate::models::response::{Delta, Response, StreamOutcome};

pub(crate) type BoxDeltaStream = Pin<Box<dyn Stream<Item = AdapterResult<Delta>> + Send>>;

#[derive(Debug)]
struct State {
    outcome: StreamOutcome,
    partial: String,
    response: Option<Response>,
}

/// Shared between a [`DeltaStream`] and the task producing its deltas.
#[derive(Debug, Clone)]
pub(crate) struct StreamStatus(Arc<Mutex<State>>);

impl StreamStatus {
    pub(crate) fn new() -> Self {
        StreamStatus(Arc::new(Mutex::new(State {
            outcome: StreamOutcome::Pending,
            partial: String::new(),
            response: None,
        })))
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.0.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    pub(crate) fn complete(&self, response: Response) {
        self.with(|state| {
            state.partial = response.content.clone();
            state.response = Some(response);
            state.outcome = StreamOutcome::Completed;
        })
    }

    pub(crate) fn end(&self, outcome: StreamOutcome, partial: &str) {
        self.with(|state| {
            state.partial = partial.to_string();
            state.outcome = outcome;
        })
    }

    fn cancel_if_pending(&self) {
        self.with(|state| {
            if state.outcome == StreamOutcome::Pending {
                state.outcome = StreamOutcome::Cancelled;
            }
        })
    }

    fn outcome(&self) -> StreamOutcome {
        self.with(|state| state.outcome)
    }
}

/// A lazy, single-pass sequence of [`Delta`]s for one streaming call.
///
/// Closing or dropping the stream releases the underlying connection right
/// away. A stream that ends before the provider signalled completion reports
/// [`StreamOutcome::Incomplete`] and never touches conversation history.
pub struct DeltaStream {
    inner: Option<BoxDeltaStream>,
    status: StreamStatus,
}

impl DeltaStream {
    pub(crate) fn new(inner: BoxDeltaStream, status: StreamStatus) -> Self {
        Self {
            inner: Some(inner),
            status,
        }
    }

    pub fn outcome(&self) -> StreamOutcome {
        self.status.outcome()
    }

    /// Stop consuming and release the connection.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            self.status.cancel_if_pending();
        }
    }

    /// Drain the remaining deltas into the final [`Response`].
    pub async fn into_response(mut self) -> AdapterResult<Response> {
        while let Some(delta) = self.next().await {
            delta?;
        }

        self.status.with(|state| match state.outcome {
            StreamOutcome::Completed => state.response.take().ok_or_else(|| {
                AdapterError::Decode("Completed stream has no response".to_string())
            }),
            _ => Err(AdapterError::IncompleteStream {
                partial: state.partial.clone(),
            }),
        })
    }
}

impl Stream for DeltaStream {
    type Item = AdapterResult<Delta>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };
        match inner.as_mut().poll_next(cx) {
            Poll::Ready(None) => {
                this.inner = None;
                this.status.cancel_if_pending();
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl Drop for DeltaStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DeltaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaStream")
            .field("open", &self.inner.is_some())
            .field("outcome", &self.outcome())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::response::UsageCounters;
    use async_stream::stream;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn delta(text: &str, cumulative: &str) -> Delta {
        Delta {
            text: text.to_string(),
            cumulative_text: cumulative.to_string(),
            finish_reason: None,
            usage_so_far: None,
        }
    }

    fn response(content: &str) -> Response {
        Response {
            id: "resp_1".to_string(),
            model: "m".to_string(),
            content: content.to_string(),
            finish_reason: Some("stop".to_string()),
            usage: UsageCounters::default(),
            tool_calls: Vec::new(),
        }
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_completed_stream() -> AdapterResult<()> {
        let status = StreamStatus::new();
        let producer = status.clone();
        let inner = stream! {
            yield Ok(delta("Hi", "Hi"));
            producer.complete(response("Hi there"));
            yield Ok(delta(" there", "Hi there"));
        };
        let stream = DeltaStream::new(Box::pin(inner), status);

        let response = stream.into_response().await?;
        assert_eq!(response.content, "Hi there");
        Ok(())
    }

    #[tokio::test]
    async fn test_incomplete_stream() {
        let status = StreamStatus::new();
        let producer = status.clone();
        let inner = stream! {
            yield Ok(delta("Hi", "Hi"));
            producer.end(StreamOutcome::Incomplete, "Hi");
        };
        let mut stream = DeltaStream::new(Box::pin(inner), status);

        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none());
        assert_eq!(stream.outcome(), StreamOutcome::Incomplete);

        let err = stream.into_response().await.unwrap_err();
        assert_eq!(
            err,
            AdapterError::IncompleteStream {
                partial: "Hi".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_close_releases_producer() {
        let released = Arc::new(AtomicBool::new(false));
        let guard = SetOnDrop(released.clone());
        let inner = stream! {
            let _guard = guard;
            yield Ok(delta("a", "a"));
            yield Ok(delta("b", "ab"));
        };
        let mut stream = DeltaStream::new(Box::pin(inner), StreamStatus::new());

        assert!(stream.next().await.is_some());
        assert!(!released.load(Ordering::SeqCst));

        stream.close();
        assert!(released.load(Ordering::SeqCst));
        assert_eq!(stream.outcome(), StreamOutcome::Cancelled);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_cancels() {
        let released = Arc::new(AtomicBool::new(false));
        let guard = SetOnDrop(released.clone());
        let status = StreamStatus::new();
        let inner = stream! {
            let _guard = guard;
            yield Ok(delta("a", "a"));
        };

        {
            let mut stream = DeltaStream::new(Box::pin(inner), status.clone());
            let _ = stream.next().await;
        }

        assert!(released.load(Ordering::SeqCst));
        assert_eq!(status.outcome(), StreamOutcome::Cancelled);
    }
}
