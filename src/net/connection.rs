//! Stream socket endpoint whose completions are delivered as handlers.
//!
//! An [`AsyncConnection`] owns at most one live peer. Setup calls
//! (`connect_to`, the bind/listen half of `listen_on`) block the caller.
//! Accept and receive block a worker thread instead, and the worker's only
//! interaction with the application is posting one completion handler to the
//! dispatcher.
//!
//! # Example: echo-to-log server
//!
//! ```ignore
//! use handlerq::{AsyncConnection, Dispatcher};
//!
//! fn on_read(conn: AsyncConnection) {
//!     if !conn.is_connected() {
//!         println!("connection closed");
//!         return;
//!     }
//!     println!("Msg read: {}", conn.received_lossy());
//!     let next = conn.clone();
//!     conn.read(move || on_read(next)).unwrap();
//! }
//!
//! let dispatcher = Dispatcher::new();
//! let conn = AsyncConnection::new(&dispatcher);
//! let accepted = conn.clone();
//! conn.listen_on(move || {
//!     let next = accepted.clone();
//!     accepted.read(move || on_read(next)).unwrap();
//! }, 27654)?;
//! dispatcher.run()?;
//! ```

use crate::error::{Error, Result};
use crate::net::socket;
use crate::runtime::{Dispatcher, Handler};

use parking_lot::Mutex;

use std::fmt;
use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Weak};
use std::thread;

/// Capacity of the receive buffer. A single read delivers at most this many
/// bytes; anything beyond stays in the transport for the next read.
pub const RECEIVE_BUFFER_SIZE: usize = 1024;

/// Which side of the connection this endpoint set up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Observable connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// A `connect_to` call is in progress.
    Connecting,
    /// An accept is outstanding and no peer is connected.
    Listening,
    Connected,
}

/// One TCP endpoint, client or server, bound to a dispatcher.
///
/// Cloning yields another handle to the same endpoint, which is how
/// completion handlers get at the connection they belong to.
///
/// Background workers do not keep the endpoint alive. When the last handle
/// is dropped the peer connection is shut down and a pending accept is
/// abandoned; the outstanding worker then exits without posting.
#[derive(Clone)]
pub struct AsyncConnection {
    shared: Arc<Shared>,
}

struct Shared {
    dispatcher: Dispatcher,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    role: Option<Role>,
    stream: Option<Arc<TcpStream>>,
    listener: Option<Arc<TcpListener>>,
    peer: Option<SocketAddr>,
    local_port: Option<u16>,
    // Bumped for every new peer so a late read completion cannot tear down
    // a connection it does not belong to.
    generation: u64,
    connecting: bool,
    accepting: bool,
    reading: bool,
    received: Vec<u8>,
}

impl AsyncConnection {
    /// Creates a disconnected endpoint posting completions to `dispatcher`.
    pub fn new(dispatcher: &Dispatcher) -> Self {
        Self {
            shared: Arc::new(Shared {
                dispatcher: dispatcher.clone(),
                inner: Mutex::new(Inner {
                    received: Vec::with_capacity(RECEIVE_BUFFER_SIZE),
                    ..Inner::default()
                }),
            }),
        }
    }

    /// Connects to a server, blocking the calling thread.
    ///
    /// # Errors
    /// * [`Error::Setup`] if resolution, socket creation or connect fails
    /// * [`Error::AlreadyConnected`] if a peer is already connected
    pub fn connect_to(&self, address: &str, port: u16) -> Result<()> {
        {
            let mut inner = self.shared.inner.lock();
            if inner.stream.is_some() {
                return Err(Error::AlreadyConnected);
            }
            inner.connecting = true;
        }

        tracing::info!(address, port, "try connect");
        let outcome = socket::connect_stream(address, port);

        let mut inner = self.shared.inner.lock();
        inner.connecting = false;

        let (stream, peer) = outcome?;
        inner.role = Some(Role::Client);
        inner.stream = Some(Arc::new(stream));
        inner.peer = Some(peer);
        inner.generation += 1;

        tracing::info!(%peer, "connected");
        Ok(())
    }

    /// Connects to [`socket::DEFAULT_HOST`] on [`socket::DEFAULT_PORT`].
    pub fn connect_default(&self) -> Result<()> {
        self.connect_to(socket::DEFAULT_HOST, socket::DEFAULT_PORT)
    }

    /// Starts listening on `port` and accepts a single peer in the background.
    ///
    /// Bind and listen happen on the calling thread. The accept runs on a
    /// worker; when a peer connects the listener is closed and `accept` is
    /// posted. Call `listen_on` again to accept another peer. If accept fails,
    /// or a peer arrives while another one is still connected, nothing is
    /// posted; use [`Self::listen_on_or_else`] to be told.
    ///
    /// # Errors
    /// * [`Error::Setup`] if socket creation, bind or listen fails
    /// * [`Error::Busy`] if an accept is already outstanding
    pub fn listen_on<F>(&self, accept: F, port: u16) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.start_listening(Box::new(accept), None, port)
    }

    /// Like [`Self::listen_on`], but posts `on_failure` when the accept fails
    /// or the incoming peer is rejected. Exactly one of the two handlers is
    /// posted per call.
    pub fn listen_on_or_else<F, G>(&self, accept: F, on_failure: G, port: u16) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
        G: FnOnce() + Send + 'static,
    {
        self.start_listening(Box::new(accept), Some(Box::new(on_failure)), port)
    }

    fn start_listening(
        &self,
        accept: Handler,
        on_failure: Option<Handler>,
        port: u16,
    ) -> Result<()> {
        let (listener, bound) = {
            let mut inner = self.shared.inner.lock();
            if inner.accepting {
                return Err(Error::Busy {
                    operation: "listen_on",
                });
            }

            let listener = Arc::new(socket::bind_listener(port)?);
            let bound = listener.local_addr().map(|a| a.port()).unwrap_or(port);

            inner.role = Some(Role::Server);
            inner.local_port = Some(bound);
            inner.listener = Some(listener.clone());
            inner.accepting = true;
            (listener, bound)
        };

        tracing::info!(port = bound, "listening for client");

        let endpoint = Arc::downgrade(&self.shared);
        thread::spawn(move || accept_block(&endpoint, listener, accept, on_failure));
        Ok(())
    }

    /// Receives one chunk in the background and then posts `handler`.
    ///
    /// The same handler is posted whether bytes arrived or the connection
    /// ended; check [`Self::is_connected`] inside it. On success the bytes
    /// are available from [`Self::received`]. Call `read` again to receive
    /// the next chunk.
    ///
    /// # Errors
    /// * [`Error::NotConnected`] without a live peer
    /// * [`Error::Busy`] if a read is already outstanding
    pub fn read<F>(&self, handler: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let (stream, generation) = {
            let mut inner = self.shared.inner.lock();
            let Some(stream) = inner.stream.clone() else {
                return Err(Error::NotConnected { operation: "read" });
            };
            if inner.reading {
                return Err(Error::Busy { operation: "read" });
            }
            inner.reading = true;
            (stream, inner.generation)
        };

        let endpoint = Arc::downgrade(&self.shared);
        thread::spawn(move || read_block(&endpoint, stream, generation, Box::new(handler)));
        Ok(())
    }

    /// Sends `bytes` to the peer with a single blocking send call.
    ///
    /// Returns the number of bytes the transport accepted, which may be less
    /// than `bytes.len()`; the remainder is not retried.
    ///
    /// # Errors
    /// * [`Error::NotConnected`] without a live peer
    /// * [`Error::Io`] if the send call fails
    pub fn send(&self, bytes: impl AsRef<[u8]>) -> Result<usize> {
        let stream = self
            .shared
            .inner
            .lock()
            .stream
            .clone()
            .ok_or(Error::NotConnected { operation: "send" })?;

        let bytes = bytes.as_ref();
        let sent = socket::send_once(&stream, bytes)?;
        if sent < bytes.len() {
            tracing::debug!(sent, requested = bytes.len(), "partial send");
        }
        Ok(sent)
    }

    /// Shuts down and releases the connection to the current peer.
    ///
    /// An outstanding read completes and posts its handler with the endpoint
    /// disconnected. An outstanding accept is unaffected.
    pub fn close(&self) {
        let stream = {
            let mut inner = self.shared.inner.lock();
            inner.peer = None;
            inner.stream.take()
        };

        if let Some(stream) = stream {
            if let Err(err) = stream.shutdown(Shutdown::Both) {
                tracing::debug!(error = %err, "shutdown on close failed");
            }
            tracing::info!("connection closed locally");
        }
    }

    /// True while a peer is connected. Never blocks on I/O.
    pub fn is_connected(&self) -> bool {
        self.shared.inner.lock().stream.is_some()
    }

    pub fn state(&self) -> ConnectionState {
        let inner = self.shared.inner.lock();

        if inner.stream.is_some() {
            ConnectionState::Connected
        } else if inner.connecting {
            ConnectionState::Connecting
        } else if inner.accepting {
            ConnectionState::Listening
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Client or server, once a setup call has succeeded.
    pub fn role(&self) -> Option<Role> {
        self.shared.inner.lock().role
    }

    pub fn is_server(&self) -> bool {
        self.role() == Some(Role::Server)
    }

    /// Port the last `listen_on` bound to.
    pub fn local_port(&self) -> Option<u16> {
        self.shared.inner.lock().local_port
    }

    /// Address of the connected peer.
    pub fn remote_address(&self) -> Option<SocketAddr> {
        self.shared.inner.lock().peer
    }

    /// Bytes delivered by the last successful read.
    ///
    /// Empty after a read that ended the connection.
    pub fn received(&self) -> Vec<u8> {
        self.shared.inner.lock().received.clone()
    }

    /// [`Self::received`] as text, replacing invalid UTF-8.
    pub fn received_lossy(&self) -> String {
        String::from_utf8_lossy(&self.shared.inner.lock().received).into_owned()
    }

    /// The dispatcher completions are posted to.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.shared.dispatcher
    }
}

fn accept_block(
    endpoint: &Weak<Shared>,
    listener: Arc<TcpListener>,
    accept: Handler,
    on_failure: Option<Handler>,
) {
    let outcome = listener.accept();
    // One accept per listen_on.
    drop(listener);

    let Some(shared) = endpoint.upgrade() else {
        tracing::debug!("endpoint dropped while accepting");
        return;
    };

    let handler = {
        let mut inner = shared.inner.lock();
        inner.accepting = false;
        inner.listener = None;

        match outcome {
            Err(err) => {
                tracing::warn!(error = %err, "accept failed");
                on_failure
            }
            Ok((_, peer)) if inner.stream.is_some() => {
                tracing::warn!(%peer, "second connection rejected");
                on_failure
            }
            Ok((stream, peer)) => {
                inner.stream = Some(Arc::new(stream));
                inner.peer = Some(peer);
                inner.generation += 1;
                tracing::info!(%peer, "client accepted");
                Some(accept)
            }
        }
    };

    if let Some(handler) = handler {
        shared.dispatcher.post_boxed(handler);
    }
}

fn read_block(
    endpoint: &Weak<Shared>,
    stream: Arc<TcpStream>,
    generation: u64,
    handler: Handler,
) {
    let mut buffer = [0u8; RECEIVE_BUFFER_SIZE];
    let outcome = receive(&stream, &mut buffer);
    drop(stream);

    let Some(shared) = endpoint.upgrade() else {
        tracing::debug!("endpoint dropped while reading");
        return;
    };

    {
        let mut inner = shared.inner.lock();
        inner.reading = false;
        inner.received.clear();

        match outcome {
            Ok(n) if n > 0 => {
                tracing::trace!(bytes = n, "read complete");
                inner.received.extend_from_slice(&buffer[..n]);
            }
            outcome => {
                match outcome {
                    Err(err) => tracing::info!(error = %err, "connection failed"),
                    Ok(_) => tracing::info!("connection closed"),
                }
                if inner.generation == generation {
                    inner.stream = None;
                    inner.peer = None;
                }
            }
        }
    }

    shared.dispatcher.post_boxed(handler);
}

fn receive(mut stream: &TcpStream, buffer: &mut [u8]) -> io::Result<usize> {
    loop {
        match stream.read(buffer) {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            outcome => return outcome,
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();

        if let Some(stream) = inner.stream.take() {
            if let Err(err) = stream.shutdown(Shutdown::Both) {
                tracing::debug!(error = %err, "shutdown on drop failed");
            }
            tracing::info!("connection released");
        }

        if let Some(listener) = inner.listener.take() {
            socket::unblock_accept(&listener);
        }
    }
}

impl fmt::Debug for AsyncConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("AsyncConnection")
            .field("role", &inner.role)
            .field("connected", &inner.stream.is_some())
            .field("peer", &inner.peer)
            .field("local_port", &inner.local_port)
            .field("accepting", &inner.accepting)
            .field("reading", &inner.reading)
            .finish()
    }
}
