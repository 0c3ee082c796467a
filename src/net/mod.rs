//! TCP networking on top of the dispatcher.
//!
//! - [`connection`]: [`AsyncConnection`], a client or server endpoint whose
//!   accept and read completions are posted as handlers
//! - [`socket`]: blocking setup helpers and the networking defaults

pub mod connection;
pub mod socket;

pub use connection::{AsyncConnection, ConnectionState, RECEIVE_BUFFER_SIZE, Role};
pub use socket::{DEFAULT_HOST, DEFAULT_PORT, parse_port};
