//! Dispatcher subsystem modules.

mod core;
pub(crate) mod queue;

pub use self::core::Dispatcher;
pub use queue::{Handler, HandlerQueue};
