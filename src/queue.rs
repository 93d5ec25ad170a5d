//! Single-lane request queue with rate-limit backoff
//!
//! All upstream API calls funnel through one worker task that executes them
//! strictly one at a time, in arrival order, with a short pause between
//! requests. A rate-limited request is put back at the head of the line and
//! retried with exponentially growing delays; everything queued behind it
//! waits, so the whole pipeline slows down together instead of hammering the
//! API from multiple call sites.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;

use crate::data::FetchError;

/// Retries allowed after a request's first rate-limited execution.
const MAX_RETRIES: u32 = 4;

/// First retry delay; doubles on each subsequent retry.
const BASE_RETRY_DELAY_MS: u64 = 1000;

/// Ceiling on the exponential retry delay.
const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Pause after a successful request before starting the next one.
const SUCCESS_PACING_MS: u64 = 300;

/// Pause after a non-rate-limit failure.
const FAILURE_PACING_MS: u64 = 500;

/// Pause after giving up on a rate-limited request.
const EXHAUSTED_PACING_MS: u64 = 1000;

/// How an executed request finished, from the worker's point of view.
enum Outcome {
    /// Result delivered to the caller.
    Success,
    /// Non-retryable error delivered to the caller.
    Failed,
    /// Rate limited with retries remaining; the worker should requeue.
    RateLimited,
    /// Rate limited on the final allowed attempt; error already delivered.
    Exhausted,
}

/// A queued request with its retry count.
///
/// The operation is type-erased so requests with different result types can
/// share one queue; delivery to the caller happens inside the closure. The
/// flag tells the closure whether this execution is its last chance, in
/// which case a rate-limit error is delivered instead of retried.
struct Job {
    attempt: u32,
    op: Box<dyn FnMut(bool) -> BoxFuture<'static, Outcome> + Send>,
}

/// Handle to the shared request lane.
///
/// Cloning is cheap; all clones feed the same worker.
#[derive(Clone)]
pub struct RequestQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl RequestQueue {
    /// Creates the queue and spawns its worker task.
    ///
    /// The worker exits once every handle is dropped and the backlog is
    /// drained.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(worker(rx));
        Self { tx }
    }

    /// Enqueues a request and waits for its result.
    ///
    /// `request` is a factory rather than a future because a rate-limited
    /// request must be re-executed from scratch on retry.
    pub async fn run<T, F, Fut>(&self, request: F) -> Result<T, FetchError>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let reply = Arc::new(Mutex::new(Some(reply_tx)));
        let request = Arc::new(request);

        let op = Box::new(move |final_attempt: bool| {
            let request = Arc::clone(&request);
            let reply = Arc::clone(&reply);
            async move {
                match request().await {
                    Ok(value) => {
                        deliver(&reply, Ok(value));
                        Outcome::Success
                    }
                    Err(err) if err.is_rate_limited() && !final_attempt => Outcome::RateLimited,
                    Err(err) if err.is_rate_limited() => {
                        deliver(&reply, Err(err));
                        Outcome::Exhausted
                    }
                    Err(err) => {
                        deliver(&reply, Err(err));
                        Outcome::Failed
                    }
                }
            }
            .boxed()
        });

        self.tx
            .send(Job { attempt: 0, op })
            .map_err(|_| FetchError::QueueClosed)?;
        reply_rx.await.map_err(|_| FetchError::QueueClosed)?
    }
}

/// Hands the result to the waiting caller, at most once.
fn deliver<T>(
    reply: &Mutex<Option<oneshot::Sender<Result<T, FetchError>>>>,
    result: Result<T, FetchError>,
) {
    if let Ok(mut slot) = reply.lock() {
        if let Some(tx) = slot.take() {
            // The caller may have given up waiting; that's fine.
            let _ = tx.send(result);
        }
    }
}

/// Delay before the `attempt`-th retry (1-based), capped at the ceiling.
fn retry_delay_ms(attempt: u32) -> u64 {
    MAX_RETRY_DELAY_MS.min(BASE_RETRY_DELAY_MS << (attempt - 1))
}

/// Executes queued requests one at a time with pacing and backoff.
///
/// A retried job goes to the head of the backlog, ahead of anything that
/// arrived while it was waiting out its delay.
async fn worker(mut rx: mpsc::UnboundedReceiver<Job>) {
    let mut backlog: VecDeque<Job> = VecDeque::new();

    loop {
        let mut job = match backlog.pop_front() {
            Some(job) => job,
            None => match rx.recv().await {
                Some(job) => job,
                None => break,
            },
        };

        let final_attempt = job.attempt >= MAX_RETRIES;
        match (job.op)(final_attempt).await {
            Outcome::Success => sleep(Duration::from_millis(SUCCESS_PACING_MS)).await,
            Outcome::Failed => sleep(Duration::from_millis(FAILURE_PACING_MS)).await,
            Outcome::Exhausted => {
                tracing::warn!(
                    retries = MAX_RETRIES,
                    "giving up on rate-limited request"
                );
                sleep(Duration::from_millis(EXHAUSTED_PACING_MS)).await;
            }
            Outcome::RateLimited => {
                job.attempt += 1;
                let delay_ms = retry_delay_ms(job.attempt);
                tracing::warn!(
                    attempt = job.attempt,
                    delay_ms,
                    "rate limit hit, backing off"
                );
                sleep(Duration::from_millis(delay_ms)).await;
                backlog.push_front(job);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_request_result() {
        let queue = RequestQueue::new();
        let result = queue.run(|| async { Ok::<_, FetchError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_execute_in_arrival_order() {
        let queue = RequestQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let mk = |name: &'static str| {
            let log = Arc::clone(&log);
            queue.run(move || {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push(name);
                    Ok::<_, FetchError>(())
                }
            })
        };

        let (a, b, c) = tokio::join!(mk("a"), mk("b"), mk("c"));
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_request_retries_with_exponential_backoff() {
        let queue = RequestQueue::new();
        let times = Arc::new(Mutex::new(Vec::new()));

        let times_in = Arc::clone(&times);
        let result = queue
            .run(move || {
                let times = Arc::clone(&times_in);
                async move {
                    times.lock().unwrap().push(Instant::now());
                    Err::<(), _>(FetchError::RateLimited)
                }
            })
            .await;

        assert!(matches!(result, Err(FetchError::RateLimited)));

        let times = times.lock().unwrap();
        assert_eq!(times.len(), 5, "Initial execution plus four retries");
        let gaps: Vec<u64> = times
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis() as u64)
            .collect();
        assert_eq!(gaps, vec![1000, 2000, 4000, 8000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retried_request_goes_back_to_head_of_line() {
        let queue = RequestQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let failures = Arc::new(AtomicU32::new(1));

        let log_a = Arc::clone(&log);
        let flaky = queue.run(move || {
            let log = Arc::clone(&log_a);
            let failures = Arc::clone(&failures);
            async move {
                log.lock().unwrap().push("flaky");
                if failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    Err(FetchError::RateLimited)
                } else {
                    Ok(())
                }
            }
        });

        let log_b = Arc::clone(&log);
        let behind = queue.run(move || {
            let log = Arc::clone(&log_b);
            async move {
                log.lock().unwrap().push("behind");
                Ok::<_, FetchError>(())
            }
        });

        // Arrives mid-backoff, while the flaky request waits out its delay.
        let log_c = Arc::clone(&log);
        let queue_c = queue.clone();
        let late = async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            queue_c
                .run(move || {
                    let log = Arc::clone(&log_c);
                    async move {
                        log.lock().unwrap().push("late");
                        Ok::<_, FetchError>(())
                    }
                })
                .await
        };

        let (a, b, c) = tokio::join!(flaky, behind, late);
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        // The retry runs first; requests that arrived during the backoff run
        // after it, in their own order.
        assert_eq!(*log.lock().unwrap(), vec!["flaky", "flaky", "behind", "late"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ordinary_failure_is_not_retried() {
        let queue = RequestQueue::new();
        let calls = Arc::new(AtomicU32::new(0));

        let calls_in = Arc::clone(&calls);
        let result = queue
            .run(move || {
                let calls = Arc::clone(&calls_in);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(FetchError::Status(500))
                }
            })
            .await;

        assert!(matches!(result, Err(FetchError::Status(500))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        assert_eq!(retry_delay_ms(1), 1000);
        assert_eq!(retry_delay_ms(2), 2000);
        assert_eq!(retry_delay_ms(3), 4000);
        assert_eq!(retry_delay_ms(4), 8000);
        assert_eq!(retry_delay_ms(10), 30_000);
    }
}
