// SPDX-License-Identifier: GPL-3.0-only
//! Frame pump threads
//!
//! Camera backends move frames from the device into the encoder surface on
//! a dedicated thread. [`FrameLoop`] owns that thread: it runs an optional
//! setup step once, then calls the step closure until the closure asks to
//! stop or [`FrameLoop::stop`] is called. Frame threads never touch session
//! state; anything they need to report goes through a callback sink.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// What the frame loop should do after one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    Stop,
}

/// Handle to a running frame pump thread
pub struct FrameLoop {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl FrameLoop {
    /// Spawn a frame loop without per-thread setup
    pub fn spawn<F>(name: &str, mut step: F) -> std::io::Result<Self>
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        Self::spawn_with_init(name, || Ok(()), move |_: &mut ()| step())
    }

    /// Spawn a frame loop whose state is built on the loop thread
    ///
    /// Device streams borrow kernel buffers and are not `Send` across a
    /// restart, so they are created by `init` on the thread that uses them.
    /// An `init` error ends the thread before the first step.
    pub fn spawn_with_init<S, I, F>(name: &str, init: I, mut step: F) -> std::io::Result<Self>
    where
        S: 'static,
        I: FnOnce() -> Result<S, String> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_signal);
        let thread_name = name.to_string();

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut state = match init() {
                    Ok(state) => state,
                    Err(e) => {
                        warn!(name = %thread_name, error = %e, "Frame loop setup failed");
                        return;
                    }
                };
                debug!(name = %thread_name, "Frame loop running");

                while !thread_stop.load(Ordering::SeqCst) {
                    if step(&mut state) == LoopAction::Stop {
                        debug!(name = %thread_name, "Frame loop ended itself");
                        break;
                    }
                }

                debug!(name = %thread_name, "Frame loop exiting");
            })?;

        info!(name = %name, "Frame loop started");

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Ask the loop to stop after its current step
    pub fn request_stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread
    ///
    /// Calling this from inside the loop's own thread would deadlock; frame
    /// loops end themselves by returning [`LoopAction::Stop`] instead.
    pub fn stop(&mut self) {
        self.request_stop();
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!(name = %self.name, "Frame loop thread panicked");
            } else {
                debug!(name = %self.name, "Frame loop joined");
            }
        }
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[test]
    fn test_loop_ends_itself() {
        let counter = Arc::new(AtomicU32::new(0));
        let steps = Arc::clone(&counter);

        let mut frame_loop = FrameLoop::spawn("test-loop", move || {
            if steps.fetch_add(1, Ordering::SeqCst) >= 4 {
                LoopAction::Stop
            } else {
                LoopAction::Continue
            }
        })
        .unwrap();

        while frame_loop.is_running() {
            thread::sleep(Duration::from_millis(5));
        }
        frame_loop.stop();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_stop_joins_thread() {
        let counter = Arc::new(AtomicU32::new(0));
        let steps = Arc::clone(&counter);

        let mut frame_loop = FrameLoop::spawn("test-stop", move || {
            steps.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            LoopAction::Continue
        })
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        frame_loop.stop();
        assert!(!frame_loop.is_running());

        let after_stop = counter.load(Ordering::SeqCst);
        assert!(after_stop > 0);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(counter.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_failed_init_skips_steps() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_in_loop = Arc::clone(&ran);

        let mut frame_loop = FrameLoop::spawn_with_init(
            "test-init",
            || Err::<u32, _>("no device".to_string()),
            move |_| {
                ran_in_loop.store(true, Ordering::SeqCst);
                LoopAction::Stop
            },
        )
        .unwrap();

        frame_loop.stop();
        assert!(!ran.load(Ordering::SeqCst));
    }
}
