//! Error types for the dispatcher and its networking layer.
//!
//! Only synchronous failures are errors. Anything that goes wrong inside a
//! worker (a read hitting end of stream, a failed accept) is folded into the
//! completion handler and observed through connection state instead.

use std::io;

/// Failure while setting up a connection or a listener.
///
/// Every variant is fatal to the operation that produced it and is returned
/// to the caller of `connect_to` / `listen_on`; nothing is posted.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("failed to resolve {address}:{port}: {source}")]
    Resolve {
        address: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("no address found for {address}:{port}")]
    NoAddress { address: String, port: u16 },

    #[error("failed to create socket: {0}")]
    Socket(#[source] io::Error),

    #[error("bind on port {port} failed: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("listen on port {port} failed: {source}")]
    Listen {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("connect to {address} failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid port {0:?}")]
    InvalidPort(String),
}

/// Crate-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Setup(#[from] SetupError),

    /// `read`/`send` issued without a live connection.
    #[error("{operation} requires a live connection")]
    NotConnected { operation: &'static str },

    /// A second `read`/`listen_on` issued while the previous one is still
    /// outstanding on the same connection.
    #[error("{operation} is already outstanding on this connection")]
    Busy { operation: &'static str },

    /// `connect_to` on an endpoint that already has a live peer.
    #[error("connection already established")]
    AlreadyConnected,

    #[error("dispatcher is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// True for the invalid-state family: calls made in the wrong
    /// connection state rather than failing in the transport.
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            Error::NotConnected { .. } | Error::Busy { .. } | Error::AlreadyConnected
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
