use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use sleuth_core::error::{Result, SleuthError};

/// The provider-calling side of a [`CallQueue`].
///
/// One worker instance serves every queued request; a failed call is
/// reported through the job's reply channel, never by tearing the worker
/// down.
pub trait QueueWorker: Send + Sync + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;

    fn call(&self, request: Self::Request) -> BoxFuture<'_, Result<Self::Response>>;
}

struct Job<W: QueueWorker> {
    request: W::Request,
    reply: oneshot::Sender<Result<W::Response>>,
}

/// Serializes calls to one rate-limited external dependency.
///
/// A single worker task drains a FIFO queue; after finishing each job,
/// whether it succeeded or failed, it sleeps `min_interval` before taking
/// the next.
/// Any number of concurrent callers funnel through this one worker, so
/// global throughput to the provider is bounded no matter how many graph
/// runs are in flight.
pub struct CallQueue<W: QueueWorker> {
    tx: mpsc::UnboundedSender<Job<W>>,
    handle: tokio::task::JoinHandle<()>,
}

impl<W: QueueWorker> CallQueue<W> {
    /// Spawn the worker and return the queue handle.
    pub fn start(worker: W, min_interval: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job<W>>();
        let worker = Arc::new(worker);

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let result = worker.call(job.request).await;
                if let Err(ref e) = result {
                    warn!(error = %e, "queued call failed; delivering error reply");
                }
                // Caller may have given up; a dropped reply is not an error.
                let _ = job.reply.send(result);

                tokio::time::sleep(min_interval).await;
            }
            debug!("call queue worker stopped");
        });

        Self { tx, handle }
    }

    /// Submit a request and wait for its reply.
    pub async fn submit(&self, request: W::Request) -> Result<W::Response> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Job {
                request,
                reply: reply_tx,
            })
            .map_err(|_| SleuthError::capability("call_queue", "queue is shut down"))?;

        reply_rx
            .await
            .map_err(|_| SleuthError::capability("call_queue", "worker dropped the reply"))?
    }

    /// Stop accepting requests and let the worker drain what it has.
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct DoublingWorker {
        calls: Arc<AtomicU32>,
    }

    impl QueueWorker for DoublingWorker {
        type Request = u32;
        type Response = u32;

        fn call(&self, request: u32) -> BoxFuture<'_, Result<u32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if request == 13 {
                    Err(SleuthError::capability("doubler", "unlucky request"))
                } else {
                    Ok(request * 2)
                }
            })
        }
    }

    fn queue(interval_ms: u64) -> (CallQueue<DoublingWorker>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let q = CallQueue::start(
            DoublingWorker {
                calls: Arc::clone(&calls),
            },
            Duration::from_millis(interval_ms),
        );
        (q, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_replies_in_submission_order() {
        let (q, _) = queue(10);

        let (a, b, c) = tokio::join!(q.submit(1), q.submit(2), q.submit(3));
        assert_eq!(a.unwrap(), 2);
        assert_eq!(b.unwrap(), 4);
        assert_eq!(c.unwrap(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_minimum_interval_between_calls() {
        let (q, _) = queue(1000);
        let start = tokio::time::Instant::now();

        let futs = vec![q.submit(1), q.submit(2), q.submit(3)];
        let results = futures::future::join_all(futs).await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_ok()));

        // N requests take at least (N-1) intervals.
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_does_not_kill_worker() {
        let (q, calls) = queue(1);

        let err = q.submit(13).await.unwrap_err();
        assert!(matches!(err, SleuthError::Capability { .. }));

        // The worker survives and serves the next request.
        let ok = q.submit(4).await.unwrap();
        assert_eq!(ok, 8);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_worker() {
        let (q, calls) = queue(1);
        assert_eq!(q.submit(5).await.unwrap(), 10);
        q.shutdown().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
