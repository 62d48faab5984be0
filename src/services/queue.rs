use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::types::{CoreError, CoreResult, JOB_RETRY_DELAY_MS, JOB_TIMEOUT_S, MAX_JOB_ATTEMPTS};

/// A unit of background work pulled from a topic queue. Attempts are
/// bounded and each attempt runs under a hard timeout; a timed-out attempt
/// counts as a failed one. Only retryable (infrastructure) errors are
/// re-run, so task bodies must re-validate rather than blindly re-insert.
#[async_trait]
pub trait QueueTask: Send + Sync + 'static {
    type Ctx: Clone + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    fn max_attempts(&self) -> u32 {
        MAX_JOB_ATTEMPTS
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(JOB_TIMEOUT_S)
    }

    async fn run(&self, ctx: &Self::Ctx) -> CoreResult<()>;

    /// Invoked exactly once when the task is out of attempts (or failed
    /// with a non-retryable error); must leave a terminal outcome record.
    async fn on_permanent_failure(&self, ctx: &Self::Ctx, err: &CoreError);
}

/// FIFO topic queue with a worker pool. A single worker keeps same-topic
/// tasks strictly ordered, which the booking pipeline relies on.
pub struct TaskQueue<T: QueueTask> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T: QueueTask> TaskQueue<T> {
    pub fn start(ctx: T::Ctx, workers: usize) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel::<T>();
        let rx = Arc::new(Mutex::new(rx));

        for worker in 0..workers.max(1) {
            let rx = rx.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                loop {
                    let task = { rx.lock().await.recv().await };
                    let Some(task) = task else { break };
                    execute(&task, &ctx, worker).await;
                }
            });
        }

        Arc::new(TaskQueue { tx })
    }

    pub fn enqueue(&self, task: T) -> CoreResult<()> {
        self.tx
            .send(task)
            .map_err(|_| CoreError::Infrastructure("task queue is closed".into()))
    }
}

async fn execute<T: QueueTask>(task: &T, ctx: &T::Ctx, worker: usize) {
    let max_attempts = task.max_attempts().max(1);

    for attempt in 1..=max_attempts {
        let err = match tokio::time::timeout(task.timeout(), task.run(ctx)).await {
            Ok(Ok(())) => {
                tracing::info!(task = task.name(), worker, attempt, "task finished");
                return;
            }
            Ok(Err(err)) => err,
            Err(_) => CoreError::Infrastructure(format!(
                "attempt timed out after {}s",
                task.timeout().as_secs()
            )),
        };

        tracing::error!(task = task.name(), worker, attempt, %err, "task attempt failed");

        if !err.is_retryable() || attempt == max_attempts {
            task.on_permanent_failure(ctx, &err).await;
            return;
        }

        tokio::time::sleep(Duration::from_millis(JOB_RETRY_DELAY_MS)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Probe {
        attempts: AtomicU32,
        permanent_failures: AtomicU32,
        completions: StdMutex<Vec<u32>>,
    }

    #[derive(Clone)]
    struct ProbeCtx(Arc<Probe>);

    struct TestTask {
        id: u32,
        fail_first: u32,
        retryable: bool,
        sleep_ms: u64,
        timeout_ms: u64,
    }

    impl TestTask {
        fn succeeding(id: u32) -> Self {
            TestTask { id, fail_first: 0, retryable: true, sleep_ms: 0, timeout_ms: 1000 }
        }
    }

    #[async_trait]
    impl QueueTask for TestTask {
        type Ctx = ProbeCtx;

        fn name(&self) -> &'static str {
            "test-task"
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(self.timeout_ms)
        }

        async fn run(&self, ctx: &ProbeCtx) -> CoreResult<()> {
            let attempt = ctx.0.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if self.sleep_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.sleep_ms)).await;
            }
            if attempt <= self.fail_first {
                return Err(if self.retryable {
                    CoreError::Infrastructure("flaky".into())
                } else {
                    CoreError::Validation("bad input".into())
                });
            }
            ctx.0.completions.lock().unwrap().push(self.id);
            Ok(())
        }

        async fn on_permanent_failure(&self, ctx: &ProbeCtx, _err: &CoreError) {
            ctx.0.permanent_failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn settle(probe: &Probe, expected_attempts: u32) {
        for _ in 0..300 {
            if probe.attempts.load(Ordering::SeqCst) >= expected_attempts {
                // One extra tick so post-attempt bookkeeping lands.
                tokio::time::sleep(Duration::from_millis(20)).await;
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queue never reached {expected_attempts} attempts");
    }

    #[tokio::test]
    async fn runs_a_task_once_on_success() {
        let probe = Arc::new(Probe::default());
        let queue = TaskQueue::start(ProbeCtx(probe.clone()), 1);
        queue.enqueue(TestTask::succeeding(1)).unwrap();

        settle(&probe, 1).await;
        assert_eq!(probe.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(probe.permanent_failures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retries_infrastructure_failures() {
        let probe = Arc::new(Probe::default());
        let queue = TaskQueue::start(ProbeCtx(probe.clone()), 1);
        queue
            .enqueue(TestTask { fail_first: 2, ..TestTask::succeeding(1) })
            .unwrap();

        settle(&probe, 3).await;
        assert_eq!(probe.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(probe.permanent_failures.load(Ordering::SeqCst), 0);
        assert_eq!(*probe.completions.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn gives_up_after_the_attempt_ceiling() {
        let probe = Arc::new(Probe::default());
        let queue = TaskQueue::start(ProbeCtx(probe.clone()), 1);
        queue
            .enqueue(TestTask { fail_first: 99, ..TestTask::succeeding(1) })
            .unwrap();

        settle(&probe, 3).await;
        assert_eq!(probe.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(probe.permanent_failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_permanently_at_once() {
        let probe = Arc::new(Probe::default());
        let queue = TaskQueue::start(ProbeCtx(probe.clone()), 1);
        queue
            .enqueue(TestTask { fail_first: 99, retryable: false, ..TestTask::succeeding(1) })
            .unwrap();

        settle(&probe, 1).await;
        assert_eq!(probe.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(probe.permanent_failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_timed_out_attempt_is_a_failed_attempt() {
        let probe = Arc::new(Probe::default());
        let queue = TaskQueue::start(ProbeCtx(probe.clone()), 1);
        queue
            .enqueue(TestTask { sleep_ms: 200, timeout_ms: 20, ..TestTask::succeeding(1) })
            .unwrap();

        settle(&probe, 3).await;
        assert_eq!(probe.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(probe.permanent_failures.load(Ordering::SeqCst), 1);
        assert!(probe.completions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_worker_preserves_fifo_order() {
        let probe = Arc::new(Probe::default());
        let queue = TaskQueue::start(ProbeCtx(probe.clone()), 1);
        for id in 1..=5 {
            queue.enqueue(TestTask::succeeding(id)).unwrap();
        }

        settle(&probe, 5).await;
        assert_eq!(*probe.completions.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    }
}
