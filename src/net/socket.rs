//! Blocking socket setup: resolution, connect, bind and listen.
//!
//! Each step maps to its own [`SetupError`] variant so callers can tell a
//! resolution failure from a refused connection or a port already in use.

use crate::error::SetupError;

use socket2::{Domain, Protocol, SockAddr, SockRef, Socket, Type};

use std::io;
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Port used when the application does not pick one.
pub const DEFAULT_PORT: u16 = 27654;

/// Server address used by [`AsyncConnection::connect_default`].
///
/// [`AsyncConnection::connect_default`]: crate::net::AsyncConnection::connect_default
pub const DEFAULT_HOST: &str = "127.0.0.1";

#[cfg(unix)]
const BACKLOG: i32 = libc::SOMAXCONN;
#[cfg(not(unix))]
const BACKLOG: i32 = 128;

#[cfg(target_os = "linux")]
const SEND_FLAGS: i32 = libc::MSG_NOSIGNAL;
#[cfg(not(target_os = "linux"))]
const SEND_FLAGS: i32 = 0;

const WAKE_TIMEOUT: Duration = Duration::from_millis(200);

/// Parses a numeric port string such as `"27654"`.
///
/// # Errors
/// Returns [`SetupError::InvalidPort`] for anything that is not a `u16`.
pub fn parse_port(port: &str) -> Result<u16, SetupError> {
    port.trim()
        .parse()
        .map_err(|_| SetupError::InvalidPort(port.to_string()))
}

/// Resolves `address:port` and connects to the first address found.
pub(crate) fn connect_stream(
    address: &str,
    port: u16,
) -> Result<(TcpStream, SocketAddr), SetupError> {
    let target = (address, port)
        .to_socket_addrs()
        .map_err(|source| SetupError::Resolve {
            address: address.to_string(),
            port,
            source,
        })?
        .next()
        .ok_or_else(|| SetupError::NoAddress {
            address: address.to_string(),
            port,
        })?;

    let socket = Socket::new(Domain::for_address(target), Type::STREAM, Some(Protocol::TCP))
        .map_err(SetupError::Socket)?;

    tracing::debug!(%target, "connecting");
    socket
        .connect(&SockAddr::from(target))
        .map_err(|source| SetupError::Connect {
            address: target.to_string(),
            source,
        })?;

    Ok((socket.into(), target))
}

/// Creates a listener on all IPv4 interfaces.
///
/// Port `0` lets the operating system choose; read the result back with
/// `local_addr`.
pub(crate) fn bind_listener(port: u16) -> Result<TcpListener, SetupError> {
    let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

    let socket =
        Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).map_err(SetupError::Socket)?;

    // Lets a server listen again while the previous peer sits in TIME_WAIT.
    socket.set_reuse_address(true).map_err(SetupError::Socket)?;

    socket
        .bind(&SockAddr::from(address))
        .map_err(|source| SetupError::Bind { port, source })?;

    socket
        .listen(BACKLOG)
        .map_err(|source| SetupError::Listen { port, source })?;

    Ok(socket.into())
}

/// Single best-effort send; partial writes are reported, not retried.
pub(crate) fn send_once(stream: &TcpStream, bytes: &[u8]) -> io::Result<usize> {
    SockRef::from(stream).send_with_flags(bytes, SEND_FLAGS)
}

/// Makes an accept blocked on `listener` in another thread return.
///
/// Linux fails the pending accept once the listening socket is shut down.
/// Elsewhere shutdown is rejected on a listener, so a throwaway loopback
/// connection completes the accept instead.
pub(crate) fn unblock_accept(listener: &TcpListener) {
    if SockRef::from(listener).shutdown(Shutdown::Both).is_ok() {
        return;
    }

    let Ok(local) = listener.local_addr() else {
        return;
    };
    let wake = SocketAddr::from((Ipv4Addr::LOCALHOST, local.port()));
    if let Err(err) = TcpStream::connect_timeout(&wake, WAKE_TIMEOUT) {
        tracing::debug!(error = %err, "could not wake pending accept");
    }
}
