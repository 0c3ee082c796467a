//! Cooperative event dispatch on a single ordered handler queue.
//!
//! Application code posts parameterless handlers from any thread; one
//! dispatch thread runs them strictly one at a time, in posting order.
//! Timers and network operations block on worker threads of their own and
//! talk to the application only by posting a completion handler, so handler
//! code never races with itself and needs no locking.
//!
//! # Architecture
//!
//! - **HandlerQueue**: Thread-safe FIFO of handlers, the one synchronization point
//! - **Dispatcher**: Drains the queue on the thread that calls `run` until stopped
//! - **DispatcherBuilder**: Fluent configuration of the idle strategy
//! - **Timer**: Posts handlers after a delay from a sleeping worker
//! - **AsyncConnection**: TCP client or server whose accept/read completions are posted
//! - **LineReader**: Line input with the same read-then-post shape
//!
//! # Example
//!
//! ```ignore
//! use handlerq::{Dispatcher, Timer};
//! use std::time::Duration;
//!
//! let dispatcher = Dispatcher::new();
//! let timer = Timer::new(&dispatcher);
//! timer.wait_then_post(Duration::from_millis(100), || println!("later"));
//! let _stop = Timer::stop_after(&dispatcher, Duration::from_secs(1));
//! dispatcher.run()?;
//! ```

mod builder;
mod error;
mod input;
pub mod net;
mod runtime;
mod timer;

pub use builder::{DEFAULT_IDLE_SLEEP, DispatcherBuilder, IdleStrategy};
pub use error::{Error, Result, SetupError};
pub use input::LineReader;
pub use net::{AsyncConnection, ConnectionState, Role};
pub use runtime::{Dispatcher, Handler, HandlerQueue};
pub use timer::Timer;
