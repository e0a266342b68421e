use std::{
    io,
    net::{Ipv4Addr, SocketAddr, UdpSocket as StdUdpSocket},
};

use thiserror::Error;
use tokio::net::UdpSocket as TokioUdpSocket;

/// Defines all possible errors for socket operations.
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("Failed to create a new socket")]
    CreateSocket(#[source] io::Error),

    #[error("Failed to enable broadcast on socket")]
    SetBroadcast(#[source] io::Error),

    #[error("Failed to set SO_REUSEADDR on socket")]
    SetReuseAddress(#[source] io::Error),

    #[error("Failed to set SO_BINDTODEVICE on interface '{interface}'")]
    BindToDevice {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to bind socket to {addr}")]
    BindSocket {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Failed to set socket to non-blocking mode")]
    SetNonBlocking(#[source] io::Error),

    #[error("Failed to convert socket to TokioUdpSocket")]
    ConvertToTokio(#[source] io::Error),

    #[error("Failed to send datagram")]
    Send(#[source] io::Error),

    #[error("Failed to receive datagram")]
    Receive(#[source] io::Error),

    #[error("Binding to a specific device is not supported on this platform")]
    BindToDeviceUnsupported,
}

/// Creates a `tokio::net::UdpSocket` for DHCP traffic.
///
/// The socket gets `SO_BROADCAST` (DISCOVER may go to the limited broadcast
/// address) and `SO_REUSEADDR`, is optionally pinned to a network device via
/// `SO_BINDTODEVICE` (Linux only), and is bound to `bind_addr:port`. The
/// port is a parameter so tests can run against a loopback server without
/// the privileged bootpc port.
pub fn new_tokio_socket(
    bind_addr: Ipv4Addr,
    port: u16,
    interface: Option<&str>,
) -> Result<TokioUdpSocket, SocketError> {
    use socket2::{Domain, Socket, Type};

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, None).map_err(SocketError::CreateSocket)?;

    socket
        .set_broadcast(true)
        .map_err(SocketError::SetBroadcast)?;
    socket
        .set_reuse_address(true)
        .map_err(SocketError::SetReuseAddress)?;

    if let Some(interface) = interface {
        bind_to_device(&socket, interface)?;
    }

    let addr = SocketAddr::from((bind_addr, port));
    socket
        .bind(&addr.into())
        .map_err(|source| SocketError::BindSocket { addr, source })?;

    let std_socket: StdUdpSocket = socket.into();
    std_socket
        .set_nonblocking(true)
        .map_err(SocketError::SetNonBlocking)?;
    TokioUdpSocket::from_std(std_socket).map_err(SocketError::ConvertToTokio)
}

/// Sets `SO_BINDTODEVICE`. This is an unsafe raw syscall; it is safe here
/// because the file descriptor is valid and the parameters are well-formed.
#[cfg(target_os = "linux")]
fn bind_to_device(socket: &socket2::Socket, interface: &str) -> Result<(), SocketError> {
    use std::os::fd::AsRawFd;

    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_BINDTODEVICE,
            interface.as_ptr() as *const libc::c_void,
            interface.len() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(SocketError::BindToDevice {
            interface: interface.to_string(),
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// Fallback for non-Linux systems where `SO_BINDTODEVICE` is not available.
#[cfg(not(target_os = "linux"))]
fn bind_to_device(_socket: &socket2::Socket, _interface: &str) -> Result<(), SocketError> {
    Err(SocketError::BindToDeviceUnsupported)
}
