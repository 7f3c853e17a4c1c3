use futures::FutureExt;
use futures::future::{self, BoxFuture};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

use crate::backend::transport::Transport;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchStrategy {
    DecodeImage,
    OpaqueResource,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreloadCandidate {
    pub url: String,
    pub strategy: FetchStrategy,
}

impl PreloadCandidate {
    pub fn image(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            strategy: FetchStrategy::DecodeImage,
        }
    }

    pub fn resource(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            strategy: FetchStrategy::OpaqueResource,
        }
    }
}

pub struct PreloadTask {
    candidate: PreloadCandidate,
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
    started: AtomicBool,
    settled: Arc<AtomicBool>,
}

impl PreloadTask {
    pub fn new(candidate: PreloadCandidate, transport: Arc<dyn Transport>) -> Self {
        Self {
            candidate,
            transport,
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            settled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Marks the task started and returns the fetch. The future resolves when
    /// the task settles; a cancelled task settles with `Error::Cancelled`
    /// even if the transfer itself finished.
    pub fn start(&self) -> BoxFuture<'static, Result<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return future::ready(Err(Error::AlreadyStarted)).boxed();
        }

        let candidate = self.candidate.clone();
        let transport = self.transport.clone();
        let cancel = self.cancel.clone();
        let settled = self.settled.clone();

        async move {
            let result = match candidate.strategy {
                FetchStrategy::DecodeImage => {
                    transport.decode_image(&candidate.url, cancel.clone()).await
                }
                FetchStrategy::OpaqueResource => transport
                    .fetch_binary(&candidate.url, cancel.clone())
                    .await
                    .map(|_| ()),
            };
            settled.store(true, Ordering::SeqCst);

            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            result
        }
        .boxed()
    }

    /// Aborts a running task. No-op before `start` or after settlement.
    pub fn cancel(&self) {
        if self.is_started() && !self.is_settled() {
            self.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{FakeTransport, settle};

    #[tokio::test]
    async fn test_start_only_once() {
        let transport = FakeTransport::new();
        let task = PreloadTask::new(PreloadCandidate::image("https://i.test/a.jpg"), transport);

        assert!(task.start().await.is_ok());
        assert!(matches!(task.start().await, Err(Error::AlreadyStarted)));
    }

    #[tokio::test]
    async fn test_cancel_before_start_is_noop() {
        let transport = FakeTransport::new();
        let task = PreloadTask::new(
            PreloadCandidate::resource("https://i.test/a.zip"),
            transport.clone(),
        );

        task.cancel();
        assert!(!task.is_cancel_requested());
        assert!(task.start().await.is_ok());
        assert!(task.is_settled());
        assert_eq!(transport.preload_calls(), vec!["https://i.test/a.zip".to_string()]);
    }

    #[tokio::test]
    async fn test_cancel_running_task_fails_it() {
        let transport = FakeTransport::new();
        transport.hold_preloads();
        let task = PreloadTask::new(
            PreloadCandidate::image("https://i.test/a.jpg"),
            transport.clone(),
        );

        let handle = tokio::spawn(task.start());
        settle().await;
        assert_eq!(transport.running_preloads(), 1);
        assert!(!task.is_settled());

        task.cancel();
        task.cancel();
        let result = handle.await.unwrap();

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(task.is_settled());
        assert_eq!(transport.running_preloads(), 0);
    }

    #[tokio::test]
    async fn test_cancel_after_settle_is_noop() {
        let transport = FakeTransport::new();
        let task = PreloadTask::new(PreloadCandidate::image("https://i.test/a.jpg"), transport);

        task.start().await.unwrap();
        task.cancel();

        assert!(!task.is_cancel_requested());
    }

    #[tokio::test]
    async fn test_transport_failure_settles_as_error() {
        let transport = FakeTransport::new();
        transport.fail("https://i.test/broken.jpg".to_string());
        let task = PreloadTask::new(
            PreloadCandidate::image("https://i.test/broken.jpg"),
            transport,
        );

        assert!(task.start().await.is_err());
        assert!(task.is_settled());
    }
}
