//! Thread-safe handler queue feeding the dispatcher.
//!
//! Provides a FIFO queue that any thread can push handlers onto and that the
//! dispatcher drains from a single thread. This is the only shared mutable
//! structure of the whole runtime.

use parking_lot::{Condvar, Mutex};

use std::collections::VecDeque;
use std::time::Duration;

/// A deferred, parameterless unit of work run on the dispatch thread.
///
/// Handlers are consumed when they run, so each one executes at most once.
pub type Handler = Box<dyn FnOnce() + Send + 'static>;

/// A thread-safe, FIFO queue of handlers.
///
/// Uses a Mutex-wrapped VecDeque so producers on any thread can enqueue while
/// the dispatcher dequeues. The condition variable lets an idle consumer wait
/// for the next enqueue instead of polling.
pub struct HandlerQueue {
    queue: Mutex<VecDeque<Handler>>,
    available: Condvar,
}

impl HandlerQueue {
    /// Creates a new empty handler queue.
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    /// Enqueues a handler to be executed.
    ///
    /// Pushes the handler to the back of the queue. Handlers are executed in
    /// the order they were added. The lock is held only for the push itself.
    ///
    /// # Arguments
    /// * `handler` - The handler to enqueue
    pub fn enqueue(&self, handler: Handler) {
        let len = {
            let mut queue = self.queue.lock();
            queue.push_back(handler);
            queue.len()
        };

        tracing::trace!(queued = len, "handler enqueued");
        self.available.notify_one();
    }

    /// Dequeues and returns the oldest handler.
    ///
    /// # Returns
    /// Some(handler) if one is queued, None if the queue is empty
    pub fn try_dequeue(&self) -> Option<Handler> {
        self.queue.lock().pop_front()
    }

    /// Dequeues the oldest handler, waiting up to `timeout` for one to be
    /// enqueued when the queue is empty.
    ///
    /// A call to [`Self::wake`] also ends the wait early, returning None.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<Handler> {
        let mut queue = self.queue.lock();

        if queue.is_empty() {
            self.available.wait_for(&mut queue, timeout);
        }

        queue.pop_front()
    }

    /// Wakes a consumer blocked in [`Self::dequeue_timeout`].
    pub fn wake(&self) {
        // Taking the lock orders this wake after a consumer that has already
        // checked for emptiness but not yet started waiting.
        drop(self.queue.lock());
        self.available.notify_all();
    }

    /// Removes all queued handlers and returns how many there were.
    ///
    /// The handlers are dropped after the lock is released.
    pub fn clear(&self) -> usize {
        let drained = std::mem::take(&mut *self.queue.lock());
        drained.len()
    }

    /// Returns the number of queued handlers.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Checks if the handler queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl Default for HandlerQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> Handler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move |n: u32| -> Handler {
            let sink = sink.clone();
            Box::new(move || sink.lock().push(n))
        };
        (log, make)
    }

    #[test]
    fn empty_queue_yields_nothing() {
        let queue = HandlerQueue::new();
        assert!(queue.try_dequeue().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn dequeues_in_insertion_order() {
        let queue = HandlerQueue::new();
        let (log, make) = recorder();

        for n in 0..5 {
            queue.enqueue(make(n));
        }
        assert_eq!(queue.len(), 5);

        while let Some(handler) = queue.try_dequeue() {
            handler();
        }

        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn clear_drops_queued_handlers_unrun() {
        let queue = HandlerQueue::new();
        let (log, make) = recorder();

        queue.enqueue(make(1));
        queue.enqueue(make(2));

        assert_eq!(queue.clear(), 2);
        assert!(queue.try_dequeue().is_none());
        assert!(log.lock().is_empty());
    }

    #[test]
    fn dequeue_timeout_returns_none_when_idle() {
        let queue = HandlerQueue::new();
        assert!(queue.dequeue_timeout(Duration::from_millis(20)).is_none());
    }

    #[test]
    fn dequeue_timeout_wakes_on_enqueue() {
        let queue = Arc::new(HandlerQueue::new());
        let producer = queue.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.enqueue(Box::new(|| {}));
        });

        let start = Instant::now();
        let mut handler = None;
        while handler.is_none() && start.elapsed() < Duration::from_secs(5) {
            handler = queue.dequeue_timeout(Duration::from_secs(5));
        }
        handle.join().unwrap();

        assert!(handler.is_some());
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
