// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle for background device loops
//!
//! Both the camera acquisition loop and the sensor poller run a closure on a
//! dedicated thread until a stop flag is raised. Stopping waits a bounded
//! amount of time; a thread stuck in device I/O past the deadline is detached
//! and logged instead of blocking the caller forever.

use crate::constants::timing::JOIN_POLL_STEP;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Controller for a loop running on its own thread
///
/// ```ignore
/// let mut controller = LoopController::start("acquisition", move || {
///     match device.read_frame() {
///         Ok(frame) => slot.publish(frame),
///         Err(e) => warn!(error = %e, "Read failed"),
///     }
/// })?;
///
/// controller.stop(Duration::from_millis(500));
/// ```
pub struct LoopController {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl LoopController {
    /// Spawn the loop thread
    ///
    /// `loop_fn` runs repeatedly until the stop signal is raised. The signal
    /// is checked before every iteration. If the thread cannot be spawned,
    /// `loop_fn` is dropped and the error returned.
    pub fn start<F>(name: &str, mut loop_fn: F) -> io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, "Starting background loop");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %name_clone, "Loop thread started");

                while !stop_signal_clone.load(Ordering::SeqCst) {
                    loop_fn();
                }

                info!(name = %name_clone, "Loop thread exiting");
            })
            .inspect_err(|e| warn!(name = %name, error = %e, "Failed to spawn loop thread"))?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    /// Whether the loop thread is alive
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Raise the stop signal without waiting
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Raise the stop signal and wait up to `timeout` for the thread
    ///
    /// Returns `false` if the thread was still busy at the deadline. It is
    /// detached in that case and exits on its own once its current
    /// iteration returns.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.request_stop();
        self.join(timeout)
    }

    /// Wait up to `timeout` for the thread without raising the signal
    pub fn join(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.thread_handle.take() else {
            return true;
        };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    name = %self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Loop thread did not stop in time, detaching"
                );
                return false;
            }
            thread::sleep(JOIN_POLL_STEP);
        }

        if let Err(e) = handle.join() {
            warn!(name = %self.name, "Loop thread panicked: {:?}", e);
        } else {
            debug!(name = %self.name, "Loop thread finished");
        }
        true
    }
}

impl Drop for LoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "LoopController dropped, stopping loop");
            self.stop(crate::constants::timing::LOOP_JOIN_TIMEOUT);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_join_waits_for_requested_stop() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller = LoopController::start("test-loop", move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
        })
        .unwrap();

        while counter.load(Ordering::SeqCst) < 3 {
            thread::sleep(Duration::from_millis(5));
        }
        controller.request_stop();
        assert!(controller.join(Duration::from_secs(5)));
        let settled = counter.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(counter.load(Ordering::SeqCst), settled);
    }

    #[test]
    fn test_loop_state_is_dropped_on_exit() {
        struct Flag(Arc<AtomicBool>);
        impl Drop for Flag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let flag = Flag(Arc::clone(&dropped));
        let mut controller = LoopController::start("test-drop", move || {
            let _held = &flag;
            thread::sleep(Duration::from_millis(5));
        })
        .unwrap();

        assert!(controller.stop(Duration::from_secs(1)));
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stop_signal() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller = LoopController::start("test-loop", move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
        })
        .unwrap();

        thread::sleep(Duration::from_millis(50));

        assert!(controller.stop(Duration::from_secs(1)));
        assert!(counter.load(Ordering::SeqCst) > 0);
        assert!(!controller.is_running());
    }

    #[test]
    fn test_stop_times_out_on_stuck_iteration() {
        let mut controller = LoopController::start("test-stuck", || {
            thread::sleep(Duration::from_millis(300));
        })
        .unwrap();
        thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        assert!(!controller.stop(Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_millis(250));
    }

    #[test]
    fn test_is_running() {
        let controller = LoopController::start("test-running", || {
            thread::sleep(Duration::from_millis(10));
        })
        .unwrap();

        assert!(controller.is_running());
        drop(controller);
    }
}
