//! Delayed posting of handlers.
//!
//! A [`Timer`] turns "run this later" into a sleeping worker thread that
//! posts the handler to the dispatcher once the delay has elapsed. The worker
//! never runs the handler itself; execution always happens on the dispatch
//! thread, in queue order.
//!
//! # Example: periodic work
//!
//! ```ignore
//! use handlerq::{Dispatcher, Timer};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! fn tick(timer: Arc<Timer>) {
//!     // Re-arm first so the period does not depend on how long the work takes.
//!     let next = timer.clone();
//!     timer.wait_then_post(Duration::from_millis(300), move || tick(next));
//!     do_work();
//! }
//!
//! let dispatcher = Dispatcher::new();
//! let timer = Arc::new(Timer::new(&dispatcher));
//! let first = timer.clone();
//! timer.wait_then_post(Duration::from_millis(300), move || tick(first));
//! let _stop = Timer::stop_after(&dispatcher, Duration::from_secs(5));
//! dispatcher.run()?;
//! ```

use crate::runtime::Dispatcher;

use parking_lot::Mutex;

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

type SharedHandler = Arc<dyn Fn() + Send + Sync + 'static>;

/// Schedules handlers onto a dispatcher after a delay.
///
/// Each call to [`Timer::wait_then_post`] starts one worker thread that
/// sleeps and then posts. The timer owns the handles of its workers; dropping
/// the timer blocks until every outstanding worker has posted, so no post
/// from this timer can arrive after it is gone. There is no cancellation.
///
/// A handler that captures an `Arc<Timer>` and sits in the queue keeps the
/// timer, and through it the dispatcher, alive. Once `run` has returned,
/// [`Dispatcher::clear`] drops such abandoned handlers.
pub struct Timer {
    dispatcher: Dispatcher,
    handler: Option<SharedHandler>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Timer {
    /// Creates a timer with no registered handler.
    ///
    /// Use [`Self::wait_then_post`] to schedule arbitrary handlers.
    pub fn new(dispatcher: &Dispatcher) -> Self {
        Self {
            dispatcher: dispatcher.clone(),
            handler: None,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Creates a timer whose expiry runs `handler`.
    ///
    /// The handler is posted each time the timer is [armed](Self::arm).
    pub fn with_handler<F>(dispatcher: &Dispatcher, handler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            dispatcher: dispatcher.clone(),
            handler: Some(Arc::new(handler)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Creates and arms a timer that stops the dispatcher after `delay`.
    ///
    /// Construct it before calling [`Dispatcher::run`] to bound the run.
    pub fn stop_after(dispatcher: &Dispatcher, delay: Duration) -> Self {
        let target = dispatcher.clone();
        let timer = Self::with_handler(dispatcher, move || {
            tracing::debug!("timed stop fired");
            target.stop();
        });
        timer.arm(delay);
        timer
    }

    /// Posts the registered handler after `delay`.
    ///
    /// Does nothing (beyond a warning) on a timer created with [`Self::new`].
    pub fn arm(&self, delay: Duration) {
        match &self.handler {
            Some(handler) => {
                let handler = handler.clone();
                self.wait_then_post(delay, move || handler());
            }
            None => tracing::warn!(?delay, "timer armed without a handler"),
        }
    }

    /// Posts `handler` to the dispatcher once `delay` has elapsed.
    ///
    /// Returns immediately. The wait happens on a sleeping worker thread, so
    /// neither the caller nor the dispatcher is blocked and no CPU is spent
    /// while waiting.
    ///
    /// # Arguments
    /// * `delay` - How long to wait before posting
    /// * `handler` - The handler to post
    pub fn wait_then_post<F>(&self, delay: Duration, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let dispatcher = self.dispatcher.clone();
        tracing::debug!(?delay, "timer worker started");

        let worker = thread::spawn(move || {
            thread::sleep(delay);
            tracing::trace!(?delay, "timer expired, posting handler");
            dispatcher.post(handler);
        });

        let mut workers = self.workers.lock();
        workers.retain(|w| !w.is_finished());
        workers.push(worker);
    }

    /// Number of workers still sleeping or posting.
    pub fn pending_workers(&self) -> usize {
        self.workers
            .lock()
            .iter()
            .filter(|w| !w.is_finished())
            .count()
    }

    /// The dispatcher this timer posts to.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let current = thread::current().id();

        for worker in self.workers.get_mut().drain(..) {
            // The last reference can be released by one of our own workers.
            if worker.thread().id() == current {
                continue;
            }

            if worker.join().is_err() {
                tracing::warn!("timer worker panicked before posting");
            }
        }
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("has_handler", &self.handler.is_some())
            .field("pending_workers", &self.pending_workers())
            .finish()
    }
}
