//! Background solve jobs.
//!
//! The store hands a closure to a [`JobQueue`] together with the job id it
//! has already written into the attempt. Revoking a job only detaches it:
//! a blocking solve cannot be interrupted, so the store discards the result
//! of any job whose id no longer matches the attempt's `task_id`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::EngineResult;

/// Work submitted to a queue.
pub type Job = Box<dyn FnOnce() -> EngineResult<()> + Send + 'static>;

/// Where a job stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed(String),
    Revoked,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

/// Dispatches jobs for execution.
pub trait JobQueue: Send + Sync {
    /// Starts `job` under `id`.
    fn submit(&self, id: Uuid, job: Job);

    fn status(&self, id: Uuid) -> Option<JobStatus>;

    /// Detaches a running job. Returns `false` if it is unknown or already
    /// finished.
    fn revoke(&self, id: Uuid) -> bool;
}

/// Runs every job on the calling thread before `submit` returns.
#[derive(Debug, Default)]
pub struct ImmediateJobQueue {
    statuses: Mutex<HashMap<Uuid, JobStatus>>,
}

impl ImmediateJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobQueue for ImmediateJobQueue {
    fn submit(&self, id: Uuid, job: Job) {
        let status = match job() {
            Ok(()) => JobStatus::Succeeded,
            Err(e) => JobStatus::Failed(e.to_string()),
        };
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.insert(id, status);
        }
    }

    fn status(&self, id: Uuid) -> Option<JobStatus> {
        self.statuses.lock().ok()?.get(&id).cloned()
    }

    fn revoke(&self, _id: Uuid) -> bool {
        false
    }
}

struct JobEntry {
    status: watch::Receiver<JobStatus>,
    cancel: Option<oneshot::Sender<()>>,
}

/// Runs jobs on the blocking pool of a tokio runtime.
///
/// A finished job is forgotten once its terminal status has been read
/// through [`JobQueue::status`] or [`TokioJobQueue::wait`].
#[derive(Clone)]
pub struct TokioJobQueue {
    handle: Handle,
    jobs: Arc<Mutex<HashMap<Uuid, JobEntry>>>,
}

impl TokioJobQueue {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Queue on the runtime of the current task.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Waits until the job reaches a terminal status.
    pub async fn wait(&self, id: Uuid) -> Option<JobStatus> {
        let mut rx = {
            let jobs = self.jobs.lock().ok()?;
            jobs.get(&id)?.status.clone()
        };
        let status = rx.wait_for(JobStatus::is_terminal).await.ok()?.clone();
        self.forget(id);
        Some(status)
    }

    fn forget(&self, id: Uuid) {
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.remove(&id);
        }
    }

    /// Number of jobs still tracked.
    pub fn tracked(&self) -> usize {
        self.jobs.lock().map_or(0, |jobs| jobs.len())
    }
}

impl JobQueue for TokioJobQueue {
    fn submit(&self, id: Uuid, job: Job) {
        let (status_tx, status_rx) = watch::channel(JobStatus::Running);
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        match self.jobs.lock() {
            Ok(mut jobs) => {
                jobs.insert(
                    id,
                    JobEntry {
                        status: status_rx,
                        cancel: Some(cancel_tx),
                    },
                );
            }
            Err(e) => {
                warn!(%id, error = %e, "job table poisoned, job not started");
                return;
            }
        }

        let jobs = Arc::clone(&self.jobs);
        let blocking = self.handle.clone();
        self.handle.spawn(async move {
            let work = blocking.spawn_blocking(job);
            let status = tokio::select! {
                joined = work => match joined {
                    Ok(Ok(())) => JobStatus::Succeeded,
                    Ok(Err(e)) => JobStatus::Failed(e.to_string()),
                    Err(e) => JobStatus::Failed(format!("job panicked: {e}")),
                },
                _ = cancel_rx => JobStatus::Revoked,
            };
            debug!(%id, ?status, "job done");
            if let Ok(mut jobs) = jobs.lock() {
                if let Some(entry) = jobs.get_mut(&id) {
                    entry.cancel = None;
                }
            }
            let _ = status_tx.send(status);
        });
    }

    fn status(&self, id: Uuid) -> Option<JobStatus> {
        let mut jobs = self.jobs.lock().ok()?;
        let status = jobs.get(&id)?.status.borrow().clone();
        if status.is_terminal() {
            jobs.remove(&id);
        }
        Some(status)
    }

    fn revoke(&self, id: Uuid) -> bool {
        let Ok(mut jobs) = self.jobs.lock() else {
            return false;
        };
        match jobs.get_mut(&id).and_then(|e| e.cancel.take()) {
            Some(cancel) => {
                warn!(%id, "job revoked");
                cancel.send(()).is_ok()
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn test_immediate_queue_runs_inline() {
        let queue = ImmediateJobQueue::new();
        let id = Uuid::new_v4();
        queue.submit(id, Box::new(|| Ok(())));
        assert_eq!(queue.status(id), Some(JobStatus::Succeeded));

        let failing = Uuid::new_v4();
        queue.submit(failing, Box::new(|| Err(EngineError::InvalidConfiguration("bad".into()))));
        assert!(matches!(queue.status(failing), Some(JobStatus::Failed(_))));
        assert!(!queue.revoke(id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tokio_queue_completes() {
        let queue = TokioJobQueue::current();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let id = Uuid::new_v4();
        queue.submit(
            id,
            Box::new(move || {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }),
        );

        assert_eq!(queue.wait(id).await, Some(JobStatus::Succeeded));
        assert!(ran.load(Ordering::SeqCst));
        // finished jobs cannot be revoked
        assert!(!queue.revoke(id));
        assert_eq!(queue.status(id), None);
        assert_eq!(queue.tracked(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tokio_queue_forgets_read_status() {
        let queue = TokioJobQueue::current();
        let id = Uuid::new_v4();
        queue.submit(id, Box::new(|| Ok(())));

        let status = loop {
            match queue.status(id) {
                Some(JobStatus::Running) => tokio::time::sleep(Duration::from_millis(5)).await,
                other => break other,
            }
        };
        assert_eq!(status, Some(JobStatus::Succeeded));
        assert_eq!(queue.status(id), None);
        assert_eq!(queue.tracked(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tokio_queue_revoke() {
        let queue = TokioJobQueue::current();
        let id = Uuid::new_v4();
        queue.submit(
            id,
            Box::new(|| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            }),
        );

        assert_eq!(queue.status(id), Some(JobStatus::Running));
        assert!(queue.revoke(id));
        assert_eq!(queue.wait(id).await, Some(JobStatus::Revoked));
        assert_eq!(queue.status(Uuid::new_v4()), None);
    }
}
