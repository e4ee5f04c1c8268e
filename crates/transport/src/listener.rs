use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, ToSocketAddrs};
use std::ops::RangeInclusive;
use std::thread;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};

use crate::conn::Connection;
use crate::error::TransportError;

/// Address family selection for listeners.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AddrFamily {
    /// IPv4 only (`0.0.0.0`).
    V4,
    /// IPv6 only (`::` with `IPV6_V6ONLY` set).
    V6,
    /// Dual stack where the platform allows it; falls back to IPv4.
    #[default]
    Unspec,
}

/// A bound, listening TCP socket.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
}

/// Poll interval while waiting for an accept deadline to expire.
const ACCEPT_POLL: Duration = Duration::from_millis(20);

fn bind_socket(addr: SocketAddr, backlog: i32, v6_only: bool) -> io::Result<TcpListener> {
    let domain = Domain::for_address(addr);
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    if addr.is_ipv6() {
        socket.set_only_v6(v6_only)?;
    }
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    Ok(socket.into())
}

impl Listener {
    /// Binds a listener on `port` for the requested family.
    ///
    /// `SO_REUSEADDR` is always set so restarts do not trip over
    /// TIME_WAIT sockets; an IPv6-only listener additionally sets
    /// `IPV6_V6ONLY`. With [`AddrFamily::Unspec`] a dual-stack IPv6
    /// socket is preferred and IPv4 is the fallback.
    pub fn bind(family: AddrFamily, port: u16, backlog: i32) -> io::Result<Self> {
        let inner = match family {
            AddrFamily::V4 => bind_socket(
                SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
                backlog,
                false,
            )?,
            AddrFamily::V6 => bind_socket(
                SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port),
                backlog,
                true,
            )?,
            AddrFamily::Unspec => {
                let v6 = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port);
                match bind_socket(v6, backlog, false) {
                    Ok(listener) => listener,
                    Err(_) => bind_socket(
                        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
                        backlog,
                    false,
                    )?,
                }
            }
        };
        Ok(Self { inner })
    }

    /// Binds the first free port in `range`, returning the listener
    /// and the port it landed on.
    pub fn bind_in_range(
        family: AddrFamily,
        range: RangeInclusive<u16>,
        backlog: i32,
    ) -> Result<(Self, u16), TransportError> {
        let (lo, hi) = (*range.start(), *range.end());
        for port in range {
            match Self::bind(family, port, backlog) {
                Ok(listener) => return Ok((listener, port)),
                Err(error) if error.kind() == io::ErrorKind::AddrInUse => {}
                Err(error) if error.kind() == io::ErrorKind::PermissionDenied => {}
                Err(error) => return Err(TransportError::Io(error)),
            }
        }
        Err(TransportError::PortRangeExhausted { lo, hi })
    }

    /// Accepts the next connection, blocking indefinitely.
    ///
    /// Returns the connection together with the peer's printable
    /// address and port.
    pub fn accept(&self) -> io::Result<(Connection, String, u16)> {
        let (stream, peer) = self.inner.accept()?;
        Ok((Connection::new(stream), peer.ip().to_string(), peer.port()))
    }

    /// Accepts one connection within `timeout`.
    ///
    /// The listener is flipped to non-blocking and polled so the
    /// caller cannot be wedged by a peer that never connects; it is
    /// restored to blocking on every exit path.
    pub fn accept_deadline(&self, timeout: Duration) -> Result<Connection, TransportError> {
        self.inner.set_nonblocking(true)?;
        let deadline = Instant::now() + timeout;
        let outcome = loop {
            match self.inner.accept() {
                Ok((stream, _peer)) => {
                    stream.set_nonblocking(false)?;
                    break Ok(Connection::new(stream));
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        break Err(TransportError::Timeout);
                    }
                    thread::sleep(ACCEPT_POLL);
                }
                Err(error) => break Err(TransportError::Io(error)),
            }
        };
        self.inner.set_nonblocking(false)?;
        outcome
    }

    /// The local port this listener is bound to.
    pub fn local_port(&self) -> io::Result<u16> {
        Ok(self.inner.local_addr()?.port())
    }
}

/// Connects to `host:port`, trying every resolved address in order
/// and returning the first stream that succeeds.
pub fn connect(host: &str, port: u16) -> io::Result<Connection> {
    let mut last_error = None;
    for addr in (host, port).to_socket_addrs()? {
        match std::net::TcpStream::connect(addr) {
            Ok(stream) => return Ok(Connection::new(stream)),
            Err(error) => last_error = Some(error),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses resolved")
    }))
}

/// Connects to a single address with a bounded wait.
pub fn connect_timeout(addr: SocketAddr, timeout: Duration) -> Result<Connection, TransportError> {
    match std::net::TcpStream::connect_timeout(&addr, timeout) {
        Ok(stream) => Ok(Connection::new(stream)),
        Err(error) => Err(TransportError::from_socket_io(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_in_range_reports_assigned_port() {
        let (listener, port) =
            Listener::bind_in_range(AddrFamily::V4, 20000..=65535, 16).expect("bind");
        assert_eq!(listener.local_port().expect("port"), port);
        assert!((20000..=65535).contains(&port));
    }

    #[test]
    fn bind_in_range_skips_busy_ports() {
        let (first, port) = Listener::bind_in_range(AddrFamily::V4, 21000..=21100, 16)
            .expect("first bind");
        let (_second, second_port) = Listener::bind_in_range(AddrFamily::V4, port..=21100, 16)
            .expect("second bind");
        assert_ne!(port, second_port);
        drop(first);
    }

    #[test]
    fn accept_deadline_times_out_without_peer() {
        let (listener, _port) =
            Listener::bind_in_range(AddrFamily::V4, 21200..=21400, 4).expect("bind");
        let start = Instant::now();
        let result = listener.accept_deadline(Duration::from_millis(120));
        assert!(matches!(result, Err(TransportError::Timeout)));
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn connect_reaches_local_listener() {
        let (listener, port) =
            Listener::bind_in_range(AddrFamily::V4, 21500..=21700, 4).expect("bind");
        let client = std::thread::spawn(move || {
            let mut conn = connect("127.0.0.1", port).expect("connect");
            conn.send_all(b"ping").expect("send");
        });
        let (mut conn, peer_ip, _peer_port) = listener.accept().expect("accept");
        assert_eq!(peer_ip, "127.0.0.1");
        let mut buf = [0u8; 4];
        conn.recv_exact(&mut buf).expect("recv");
        assert_eq!(&buf, b"ping");
        client.join().expect("client thread");
    }
}
