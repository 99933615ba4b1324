//! Transparent outbound sockets
//!
//! Builds a TCP connection to the backend whose local endpoint is the
//! original client's address. This needs the transparent socket option
//! (Linux `IP_TRANSPARENT` / `IPV6_TRANSPARENT`), `CAP_NET_ADMIN`, and
//! policy routing that sends the backend's replies back through this host.

use std::io;
use std::net::SocketAddr;

use log::{debug, trace};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpSocket, TcpStream};

use crate::common::match_family;

/// Whether this platform has a transparent socket option
pub fn is_supported() -> bool {
    cfg!(target_os = "linux")
}

/// Open a connection to `backend` that appears to come from `client`
///
/// Steps, in order: create the socket for the backend's family, apply the
/// platform's default outbound options, enable the transparent option, bind
/// to the client's address, connect. Any failure aborts the dial.
pub async fn connect(backend: SocketAddr, client: SocketAddr) -> io::Result<TcpStream> {
    let local = match_family(client, &backend).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("client address {} cannot be bound for backend {}", client, backend),
        )
    })?;

    let socket = transparent_socket(&backend)?;
    socket.bind(&local.into())?;
    trace!("Bound transparent socket to {}", local);

    // Ownership of the descriptor moves to tokio; nothing is duplicated.
    let socket = TcpSocket::from_std_stream(socket.into());
    let stream = socket.connect(backend).await?;

    debug!("Transparent connection {} -> {} established", local, backend);
    Ok(stream)
}

/// Check whether this process may set the transparent option for the
/// family of `addr`
///
/// A permission error here means the process lacks `CAP_NET_ADMIN`.
pub fn probe(addr: SocketAddr) -> io::Result<()> {
    transparent_socket(&addr).map(drop)
}

/// Create a non-blocking, close-on-exec stream socket with the transparent
/// option set, ready to be bound
pub(crate) fn transparent_socket(backend: &SocketAddr) -> io::Result<Socket> {
    let domain = Domain::for_address(*backend);

    // socket2 sets close-on-exec atomically where the platform allows it
    // and immediately after creation elsewhere.
    let socket = Socket::new(domain, stream_type(), Some(Protocol::TCP))?;
    #[cfg(not(target_os = "linux"))]
    socket.set_nonblocking(true)?;

    apply_default_options(&socket, backend)?;
    set_transparent(&socket, backend)?;

    Ok(socket)
}

/// Stream type, non-blocking from creation on Linux
#[cfg(target_os = "linux")]
fn stream_type() -> Type {
    Type::STREAM.nonblocking()
}

#[cfg(not(target_os = "linux"))]
fn stream_type() -> Type {
    Type::STREAM
}

/// Options an ordinary outbound socket gets from the platform dialer
fn apply_default_options(socket: &Socket, backend: &SocketAddr) -> io::Result<()> {
    if backend.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    socket.set_broadcast(true)?;
    Ok(())
}

#[cfg(target_os = "linux")]
fn set_transparent(socket: &Socket, backend: &SocketAddr) -> io::Result<()> {
    if backend.is_ipv4() {
        return socket.set_ip_transparent(true);
    }

    use std::os::fd::AsRawFd;

    let enable: libc::c_int = 1;
    // SAFETY: the descriptor is owned by `socket` for the whole call and the
    // option value is a properly sized c_int.
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_IPV6,
            libc::IPV6_TRANSPARENT,
            &enable as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn set_transparent(_socket: &Socket, _backend: &SocketAddr) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "transparent sockets are only supported on Linux",
    ))
}
