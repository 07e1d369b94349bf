//! Outbound datagram transport.
//!
//! [`DatagramTransport`] is the seam between the channel state machine and
//! the network. The server uses [`UdpTransport`]; tests substitute an
//! in-memory implementation.
//!
//! Opening a UDP "connection" resolves the host, binds an ephemeral local
//! port and connects the socket so that ICMP errors for the destination are
//! reported back on later sends.

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, ErrorKind};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;

use navcast_core::{ChannelError, Endpoint};

/// Opens links to an endpoint.
#[async_trait]
pub trait DatagramTransport: Send + Sync + 'static {
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn DatagramLink>, ChannelError>;
}

/// An opened link. Each `send` is one datagram.
#[async_trait]
pub trait DatagramLink: Send + Sync {
    async fn send(&self, payload: &[u8]) -> Result<usize, ChannelError>;
}

/// Map an I/O error seen while opening.
///
/// Anything that looks like a network that may come back is recoverable.
pub fn classify_open_error(context: &str, e: &io::Error) -> ChannelError {
    let message = format!("{}: {}", context, e);
    if is_transient(e) {
        ChannelError::Waiting(message)
    } else {
        ChannelError::Open(message)
    }
}

/// Map an I/O error seen while sending.
///
/// Transient network errors put the channel into `Waiting`, a broken socket
/// fails it, everything else only fails the single write.
pub fn classify_send_error(e: &io::Error) -> ChannelError {
    let message = e.to_string();
    if is_transient(e) {
        ChannelError::Waiting(message)
    } else {
        match e.kind() {
            ErrorKind::NotConnected | ErrorKind::BrokenPipe | ErrorKind::ConnectionAborted => {
                ChannelError::Fatal(message)
            }
            _ => ChannelError::Send(message),
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::NetworkUnreachable
            | ErrorKind::HostUnreachable
            | ErrorKind::NetworkDown
            | ErrorKind::TimedOut
    )
}

// this will be common for all our sockets
fn new_socket(domain: Domain) -> io::Result<Socket> {
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// Plain UDP transport.
#[derive(Debug, Clone, Default)]
pub struct UdpTransport;

impl UdpTransport {
    pub fn new() -> Self {
        UdpTransport
    }

    async fn resolve(endpoint: &Endpoint) -> Result<SocketAddr, ChannelError> {
        if !endpoint.is_valid() {
            return Err(ChannelError::Open(format!("Invalid endpoint '{}'", endpoint)));
        }
        let host = endpoint.host.trim();
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, endpoint.port))
            .await
            .map_err(|e| ChannelError::Waiting(format!("Cannot resolve '{}': {}", host, e)))?
            .collect();

        // Chartplotters on boat networks are almost always IPv4
        addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| ChannelError::Open(format!("No address found for '{}'", host)))
    }
}

#[async_trait]
impl DatagramTransport for UdpTransport {
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn DatagramLink>, ChannelError> {
        let target = Self::resolve(endpoint).await?;

        let socket = new_socket(Domain::for_address(target))
            .map_err(|e| ChannelError::Open(format!("Failed to create socket: {}", e)))?;

        // Subnet broadcast addresses (e.g. 192.168.1.255) are a common target
        if target.is_ipv4() {
            socket
                .set_broadcast(true)
                .map_err(|e| ChannelError::Open(format!("Failed to set broadcast: {}", e)))?;
        }

        let local: SocketAddr = match target.ip() {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        socket
            .bind(&local.into())
            .map_err(|e| ChannelError::Open(format!("Failed to bind {}: {}", local, e)))?;

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket)
            .map_err(|e| ChannelError::Open(format!("Failed to convert to tokio socket: {}", e)))?;

        socket
            .connect(target)
            .await
            .map_err(|e| classify_open_error(&format!("Cannot connect to {}", target), &e))?;

        log::debug!(
            "UDP socket {} connected to {} ({})",
            socket
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "?".to_string()),
            endpoint,
            target
        );

        Ok(Box::new(UdpLink { socket }))
    }
}

struct UdpLink {
    socket: UdpSocket,
}

#[async_trait]
impl DatagramLink for UdpLink {
    async fn send(&self, payload: &[u8]) -> Result<usize, ChannelError> {
        self.socket
            .send(payload)
            .await
            .map_err(|e| classify_send_error(&e))
    }
}
