//! Background reader threads with cooperative stop and bounded join.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Handle to a named background thread.
///
/// The thread body receives the shared `running` flag and must return soon
/// after it turns false. [`Worker::stop`] never waits longer than its timeout.
pub struct Worker {
    name: String,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    done: Receiver<()>,
}

impl Worker {
    /// Spawn `body` on a new thread.
    pub fn spawn<F>(name: &str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        // The sender is dropped when the body returns (or unwinds), which
        // disconnects the channel and tells `stop` the thread has finished.
        let (done_tx, done_rx): (Sender<()>, Receiver<()>) = bounded(1);

        let flag = running.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _done = done_tx;
                body(flag.clone());
                flag.store(false, Ordering::SeqCst);
            })?;

        Ok(Self {
            name: name.to_string(),
            running,
            handle: Some(handle),
            done: done_rx,
        })
    }

    /// Whether the thread body is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the thread to stop without waiting.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Stop the thread and wait at most `timeout` for it to finish.
    ///
    /// Returns `true` if the thread was joined. On timeout the thread is
    /// detached and left to exit on its own.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.request_stop();
        let Some(handle) = self.handle.take() else {
            return true;
        };

        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "{} thread did not stop within {:?}, detaching",
                    self.name,
                    timeout
                );
                false
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop(Duration::from_millis(100));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_stop_joins_cooperative_thread() {
        let mut worker = Worker::spawn("test-loop", |running| {
            while running.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();

        assert!(worker.is_running());
        assert!(worker.stop(Duration::from_secs(1)));
        assert!(!worker.is_running());
    }

    #[test]
    fn test_stop_times_out_on_stuck_thread() {
        let mut worker = Worker::spawn("test-stuck", |_running| {
            thread::sleep(Duration::from_millis(500));
        })
        .unwrap();

        let started = Instant::now();
        assert!(!worker.stop(Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn test_finished_body_clears_running() {
        let mut worker = Worker::spawn("test-once", |_running| {}).unwrap();
        assert!(worker.stop(Duration::from_secs(1)));
        assert!(!worker.is_running());
    }
}
