// UDP transport module

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use tokio::net::UdpSocket;

use crate::error::SimError;

/// Boxed send future returned by [`Transport::send_to`].
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SimError>> + Send + 'a>>;

/// Datagram sending abstraction so clients can be driven by a mock in tests.
pub trait Transport: Send + Sync {
    fn send_to<'a>(&'a self, data: &'a [u8], addr: SocketAddr) -> SendFuture<'a>;
}

/// A single bound UDP socket.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind to `ip:port`. Port 0 lets the OS pick an ephemeral port.
    pub async fn bind(ip: IpAddr, port: u16) -> Result<Self, SimError> {
        let socket = UdpSocket::bind(SocketAddr::new(ip, port)).await?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SimError> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive one datagram into `buf`.
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), SimError> {
        Ok(self.socket.recv_from(buf).await?)
    }
}

impl Transport for UdpTransport {
    fn send_to<'a>(&'a self, data: &'a [u8], addr: SocketAddr) -> SendFuture<'a> {
        Box::pin(async move {
            self.socket.send_to(data, addr).await?;
            Ok(())
        })
    }
}
