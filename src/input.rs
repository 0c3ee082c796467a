//! Line input delivered through the dispatcher.
//!
//! [`LineReader`] reads one line at a time on a worker thread and posts a
//! handler when the line is available, mirroring [`AsyncConnection::read`].
//!
//! [`AsyncConnection::read`]: crate::net::AsyncConnection::read

use crate::error::{Error, Result};
use crate::runtime::Dispatcher;

use parking_lot::Mutex;

use std::fmt;
use std::io::{self, BufRead, BufReader};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Asynchronous line source, typically the console.
#[derive(Clone)]
pub struct LineReader {
    shared: Arc<Shared>,
}

struct Shared {
    dispatcher: Dispatcher,
    source: Mutex<Box<dyn BufRead + Send>>,
    line: Mutex<String>,
    reading: AtomicBool,
    eof: AtomicBool,
}

impl LineReader {
    /// Wraps any buffered reader.
    pub fn new<R>(dispatcher: &Dispatcher, source: R) -> Self
    where
        R: BufRead + Send + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                dispatcher: dispatcher.clone(),
                source: Mutex::new(Box::new(source)),
                line: Mutex::new(String::new()),
                reading: AtomicBool::new(false),
                eof: AtomicBool::new(false),
            }),
        }
    }

    /// Reads lines from standard input.
    pub fn stdin(dispatcher: &Dispatcher) -> Self {
        Self::new(dispatcher, BufReader::new(io::stdin()))
    }

    /// Reads the next line in the background and then posts `handler`.
    ///
    /// The handler is also posted at end of input or on a read error, after
    /// which [`Self::is_eof`] is true and [`Self::line`] is empty.
    ///
    /// # Errors
    /// Returns [`Error::Busy`] if a read is already outstanding.
    pub fn read<F>(&self, handler: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shared.reading.swap(true, Ordering::AcqRel) {
            return Err(Error::Busy { operation: "read" });
        }

        let shared = self.shared.clone();
        thread::spawn(move || {
            let mut buffer = String::new();
            let outcome = shared.source.lock().read_line(&mut buffer);

            match outcome {
                Ok(0) => {
                    tracing::debug!("end of line input");
                    shared.eof.store(true, Ordering::Release);
                    buffer.clear();
                }
                Ok(_) => {
                    let trimmed = buffer.trim_end_matches(['\n', '\r']).len();
                    buffer.truncate(trimmed);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "line input failed");
                    shared.eof.store(true, Ordering::Release);
                    buffer.clear();
                }
            }

            *shared.line.lock() = buffer;
            shared.reading.store(false, Ordering::Release);
            shared.dispatcher.post(handler);
        });

        Ok(())
    }

    /// The last line read, without its line terminator.
    pub fn line(&self) -> String {
        self.shared.line.lock().clone()
    }

    /// True once the source is exhausted or has failed.
    pub fn is_eof(&self) -> bool {
        self.shared.eof.load(Ordering::Acquire)
    }
}

impl fmt::Debug for LineReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineReader")
            .field("reading", &self.shared.reading.load(Ordering::Relaxed))
            .field("eof", &self.is_eof())
            .finish()
    }
}
