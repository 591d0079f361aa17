pub mod doctor;

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, trace};

/// Any routable address works; no datagram is ever sent to it.
pub const DEFAULT_ROUTE_TARGET: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 80);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum NetError {
    #[error("no free port in {start}..={end}")]
    NoFreePort { start: u16, end: u16 },
    #[error("empty port range {start}..={end}")]
    EmptyRange { start: u16, end: u16 },
    #[error("invalid ip address: {0}")]
    InvalidIp(#[from] std::net::AddrParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Address of the interface the OS would route external traffic through.
pub async fn get_host_ip() -> Result<IpAddr, NetError> {
    get_host_ip_via(DEFAULT_ROUTE_TARGET).await
}

pub async fn get_host_ip_via(target: SocketAddr) -> Result<IpAddr, NetError> {
    let bind = match target {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    // connect() on UDP only fixes the route; the socket closes on drop
    let sock = UdpSocket::bind(bind).await?;
    sock.connect(target).await?;
    let ip = sock.local_addr()?.ip();
    debug!("net: host ip {} (route to {})", ip, target);
    Ok(ip)
}

/// True if something accepts TCP connections on `ip:port`.
pub async fn is_port_used(ip: IpAddr, port: u16) -> bool {
    is_port_used_within(ip, port, DEFAULT_CONNECT_TIMEOUT).await
}

pub async fn is_port_used_within(ip: IpAddr, port: u16, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect((ip, port))).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            trace!("net: {}:{} free ({})", ip, port, e);
            false
        }
        Err(_) => {
            trace!("net: {}:{} connect timed out", ip, port);
            false
        }
    }
}

/// Inclusive port range scanned for a free port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        Self { start: 23450, end: 23459 }
    }
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Result<Self, NetError> {
        if start > end {
            return Err(NetError::EmptyRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn len(&self) -> usize {
        if self.start > self.end { 0 } else { usize::from(self.end - self.start) + 1 }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First port in the range nothing is listening on, scanned in order.
    pub async fn scan(&self, ip: IpAddr, timeout: Duration) -> Result<u16, NetError> {
        if self.is_empty() {
            return Err(NetError::EmptyRange { start: self.start, end: self.end });
        }
        for port in self.start..=self.end {
            if !is_port_used_within(ip, port, timeout).await {
                debug!("net: picked port {}", port);
                return Ok(port);
            }
        }
        Err(NetError::NoFreePort { start: self.start, end: self.end })
    }
}

pub async fn pick_available_port() -> Result<u16, NetError> {
    PortRange::default()
        .scan(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_CONNECT_TIMEOUT)
        .await
}
