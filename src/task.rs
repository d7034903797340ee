//! Cancellable background threads.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Handle to a background thread.
///
/// Dropping the handle (or calling [`TaskHandle::stop`]) wakes the thread at
/// its next wait and ends it. The thread is not joined on drop.
#[derive(Debug)]
pub struct TaskHandle {
    name: String,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signal the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Background task {} panicked", self.name);
            }
        }
    }

    /// Wait for the thread to exit without signalling it.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Background task {} panicked", self.name);
            }
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.stop.take();
    }
}

/// Run `tick` every `interval` until stopped.
pub fn spawn_periodic<F>(name: &str, interval: Duration, mut tick: F) -> std::io::Result<TaskHandle>
where
    F: FnMut() + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<()>();
    let thread = thread::Builder::new().name(name.to_string()).spawn(move || loop {
        match rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => tick(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    })?;
    Ok(TaskHandle {
        name: name.to_string(),
        stop: Some(tx),
        thread: Some(thread),
    })
}

/// Run `task` once after `delay` unless stopped first.
pub fn spawn_delayed<F>(name: &str, delay: Duration, task: F) -> std::io::Result<TaskHandle>
where
    F: FnOnce() + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<()>();
    let task_name = name.to_string();
    let thread = thread::Builder::new().name(name.to_string()).spawn(move || {
        match rx.recv_timeout(delay) {
            Err(RecvTimeoutError::Timeout) => task(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                log::debug!("Background task {} cancelled", task_name);
            }
        }
    })?;
    Ok(TaskHandle {
        name: name.to_string(),
        stop: Some(tx),
        thread: Some(thread),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delayed_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handle = spawn_delayed("test-delayed", Duration::from_millis(10), move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        handle.join();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delayed_cancelled() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handle = spawn_delayed("test-cancel", Duration::from_secs(60), move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        handle.stop();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_periodic_stops() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handle = spawn_periodic("test-periodic", Duration::from_millis(5), move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        while count.load(Ordering::SeqCst) < 2 {
            thread::sleep(Duration::from_millis(5));
        }
        handle.stop();
        let after = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), after);
    }
}
