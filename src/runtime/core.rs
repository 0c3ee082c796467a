//! Single-consumer run loop that executes posted handlers.
//!
//! The dispatcher is the only place application handlers run. Producers on
//! any thread post into its queue; `run` drains it one handler at a time on
//! the calling thread until `stop` is requested.

use crate::builder::{DispatcherBuilder, IdleStrategy};
use crate::error::{Error, Result};
use crate::runtime::queue::{Handler, HandlerQueue};

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Handle to a handler queue and its run loop.
///
/// Cloning is cheap and every clone refers to the same queue, so a dispatcher
/// can be handed to timers, connections and worker threads. Exactly one
/// thread at a time may be inside [`Dispatcher::run`].
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

struct Shared {
    queue: HandlerQueue,
    stop: AtomicBool,
    running: AtomicBool,
    idle: IdleStrategy,
}

/// Clears the running flag when `run` exits, including by unwinding.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Dispatcher {
    /// Creates a dispatcher with the default configuration.
    ///
    /// # Example
    /// ```ignore
    /// let dispatcher = Dispatcher::new();
    /// dispatcher.post(|| println!("hello"));
    /// ```
    pub fn new() -> Self {
        DispatcherBuilder::new().build()
    }

    /// Starts a builder for a custom configured dispatcher.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub(crate) fn with_idle_strategy(idle: IdleStrategy) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: HandlerQueue::new(),
                stop: AtomicBool::new(false),
                running: AtomicBool::new(false),
                idle,
            }),
        }
    }

    /// Posts a handler to run on the dispatch thread.
    ///
    /// Returns immediately. Safe to call from any thread, including from
    /// inside a running handler; the posted handler runs after the current
    /// one returns.
    pub fn post<F>(&self, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_boxed(Box::new(handler));
    }

    /// Posts an already boxed handler.
    pub fn post_boxed(&self, handler: Handler) {
        self.shared.queue.enqueue(handler);
    }

    /// Runs posted handlers in order until [`Self::stop`] is called.
    ///
    /// Handlers execute synchronously on the calling thread, never two at a
    /// time. When the queue is empty the loop idles according to its
    /// [`IdleStrategy`]. A panicking handler unwinds out of `run`.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyRunning`] if another call to `run` on this
    /// dispatcher has not returned yet.
    pub fn run(&self) -> Result<()> {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyRunning);
        }
        let _running = RunningGuard(&self.shared.running);

        tracing::debug!(idle = ?self.shared.idle, "dispatcher running");
        let mut executed: u64 = 0;

        loop {
            if self.shared.stop.load(Ordering::Acquire) {
                break;
            }

            let next = match self.shared.idle {
                IdleStrategy::Sleep(interval) => {
                    let next = self.shared.queue.try_dequeue();
                    if next.is_none() {
                        thread::sleep(interval);
                    }
                    next
                }
                IdleStrategy::Notify(max_wait) => self.shared.queue.dequeue_timeout(max_wait),
            };

            if let Some(handler) = next {
                tracing::trace!("dispatching handler");
                handler();
                executed += 1;
            }
        }

        tracing::debug!(
            executed,
            abandoned = self.shared.queue.len(),
            "dispatcher stopped"
        );
        Ok(())
    }

    /// Requests the run loop to stop.
    ///
    /// Usually called from inside a handler. The handler currently running
    /// finishes; no further handler starts once the flag is observed.
    /// Handlers still queued are not drained.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.queue.wake();
    }

    /// Clears a previous stop request so the dispatcher can run again.
    pub fn reset(&self) {
        self.shared.stop.store(false, Ordering::Release);
    }

    /// True once [`Self::stop`] has been called and not reset.
    pub fn is_stop_requested(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }

    /// True while some thread is inside [`Self::run`].
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Number of handlers posted but not yet started.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Drops every queued handler without running it.
    ///
    /// Use it after `run` returns to release what abandoned handlers
    /// captured, such as an `Arc<Timer>` that holds this dispatcher.
    ///
    /// # Returns
    /// The number of handlers dropped
    pub fn clear(&self) -> usize {
        let dropped = self.shared.queue.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "queued handlers cleared");
        }
        dropped
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending", &self.pending())
            .field("running", &self.is_running())
            .field("stop_requested", &self.is_stop_requested())
            .field("idle", &self.shared.idle)
            .finish()
    }
}
