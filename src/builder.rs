//! Fluent builder for Dispatcher construction.
//!
//! Provides a builder pattern interface for creating and configuring
//! Dispatcher instances. All configuration lives here; there are no config
//! files or environment variables.

use crate::runtime::Dispatcher;

use std::time::Duration;

/// Fixed sleep used by the polling idle strategy.
pub const DEFAULT_IDLE_SLEEP: Duration = Duration::from_millis(1);

/// What the run loop does when it finds the queue empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdleStrategy {
    /// Sleep for a fixed duration, then look at the queue again.
    Sleep(Duration),

    /// Wait on the queue until a handler is enqueued or stop is requested,
    /// re-checking the stop flag at least every `Duration`.
    Notify(Duration),
}

impl Default for IdleStrategy {
    fn default() -> Self {
        IdleStrategy::Notify(DEFAULT_IDLE_SLEEP)
    }
}

/// Builder for constructing Dispatcher instances with fluent API.
///
/// # Example
/// ```ignore
/// let dispatcher = DispatcherBuilder::new()
///     .idle_strategy(IdleStrategy::Sleep(Duration::from_millis(1)))
///     .build();
/// ```
#[derive(Clone, Debug, Default)]
pub struct DispatcherBuilder {
    idle: IdleStrategy,
}

impl DispatcherBuilder {
    /// Creates a new dispatcher builder with the default idle strategy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects how the run loop idles while the queue is empty.
    pub fn idle_strategy(mut self, idle: IdleStrategy) -> Self {
        self.idle = idle;
        self
    }

    /// Shorthand for the fixed-sleep polling loop.
    pub fn poll_every(self, interval: Duration) -> Self {
        self.idle_strategy(IdleStrategy::Sleep(interval))
    }

    /// Builds and returns a configured Dispatcher instance.
    ///
    /// Consumes the builder. The returned dispatcher has an empty queue and
    /// no stop request.
    pub fn build(self) -> Dispatcher {
        Dispatcher::with_idle_strategy(self.idle)
    }
}
