//! Start/stop bookkeeping shared by long-running components.
//!
//! A component composes a `Lifecycle` instead of inheriting service behaviour.
//! The lifecycle owns the quit signal every background task watches and keeps
//! the handles of the tasks it spawned so a caller can wait for them to drain.

use crate::error::ServiceError;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Lifecycle {
    name: &'static str,
    started: AtomicBool,
    stopped: AtomicBool,
    /// Token to signal shutdown to all tasks
    cancel_token: CancellationToken,
    /// Handles to all spawned tasks
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Lifecycle {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            cancel_token: CancellationToken::new(),
            task_handles: Mutex::new(Vec::new()),
        }
    }

    /// Transition to running. A lifecycle runs at most once.
    pub fn start(&self) -> Result<(), ServiceError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ServiceError::AlreadyStopped(self.name));
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::AlreadyStarted(self.name));
        }
        tracing::info!("▶️  Starting {}", self.name);
        Ok(())
    }

    /// Transition to stopped and fire the quit signal.
    pub fn stop(&self) -> Result<(), ServiceError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(ServiceError::NotStarted(self.name));
        }
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::AlreadyStopped(self.name));
        }
        tracing::info!("🛑 Stopping {}", self.name);
        self.cancel_token.cancel();
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    /// Get a clone of the quit signal for spawning tasks
    pub fn quit(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Spawn a task that is part of this component's lifetime.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        self.task_handles.lock().push(handle);
    }

    /// Wait for every spawned task to finish, up to `timeout`.
    /// Returns false if some task was still running when time ran out; those
    /// tasks stay registered so a later `wait` still sees them.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.task_handles.lock());
        let deadline = tokio::time::Instant::now() + timeout;

        while let Some(handle) = handles.last_mut() {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(result) => {
                    if let Err(e) = result {
                        tracing::warn!("{} task ended abnormally: {}", self.name, e);
                    }
                    handles.pop();
                }
                Err(_) => {
                    tracing::warn!("⏱️  {} tasks did not stop within {:?}", self.name, timeout);
                    self.task_handles.lock().extend(handles);
                    return false;
                }
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_start_stop_transitions() {
        let lifecycle = Lifecycle::new("test");
        assert!(!lifecycle.is_running());
        assert_eq!(lifecycle.stop(), Err(ServiceError::NotStarted("test")));

        lifecycle.start().unwrap();
        assert!(lifecycle.is_running());
        assert_eq!(lifecycle.start(), Err(ServiceError::AlreadyStarted("test")));

        lifecycle.stop().unwrap();
        assert!(!lifecycle.is_running());
        assert!(lifecycle.quit().is_cancelled());
        assert_eq!(lifecycle.stop(), Err(ServiceError::AlreadyStopped("test")));
        assert_eq!(lifecycle.start(), Err(ServiceError::AlreadyStopped("test")));
    }

    #[tokio::test]
    async fn test_wait_joins_tasks_after_stop() {
        let lifecycle = Lifecycle::new("test");
        lifecycle.start().unwrap();

        for _ in 0..2 {
            let quit = lifecycle.quit();
            lifecycle.spawn(async move { quit.cancelled().await });
        }
        assert!(!lifecycle.wait(Duration::from_millis(20)).await);

        lifecycle.stop().unwrap();
        assert!(lifecycle.wait(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_timed_out_tasks_stay_registered() {
        let lifecycle = Lifecycle::new("test");
        lifecycle.start().unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        // Ignores the quit signal.
        lifecycle.spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            flag.store(true, Ordering::SeqCst);
        });

        assert!(!lifecycle.wait(Duration::from_millis(10)).await);
        lifecycle.stop().unwrap();
        assert!(!lifecycle.wait(Duration::from_millis(10)).await);
        assert!(!done.load(Ordering::SeqCst));

        assert!(lifecycle.wait(Duration::from_secs(2)).await);
        assert!(done.load(Ordering::SeqCst));
    }
}
