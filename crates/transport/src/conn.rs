use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::{Duration, Instant};

use socket2::SockRef;

use crate::error::TransportError;

/// An established TCP connection.
///
/// Wraps a blocking [`TcpStream`] and keeps a small carry buffer so
/// [`Connection::recv_line`] can hand back one CRLF-terminated line at
/// a time without losing bytes that arrived after the terminator.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    carry: Vec<u8>,
}

impl Connection {
    /// Wraps an accepted or connected stream.
    #[must_use]
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            carry: Vec::new(),
        }
    }

    /// Clones the underlying socket handle.
    ///
    /// The clone shares the descriptor but has its own carry buffer;
    /// it is intended for write-side use (replies, shutdown) while the
    /// original keeps reading.
    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(Self {
            stream: self.stream.try_clone()?,
            carry: Vec::new(),
        })
    }

    /// Local address as a printable IP and port.
    pub fn local_addr(&self) -> io::Result<(String, u16)> {
        let addr = self.stream.local_addr()?;
        Ok((addr.ip().to_string(), addr.port()))
    }

    /// Peer address as a printable IP and port.
    pub fn peer_addr(&self) -> io::Result<(String, u16)> {
        let addr = self.stream.peer_addr()?;
        Ok((addr.ip().to_string(), addr.port()))
    }

    /// Receives one line terminated by LF, preserving the terminator.
    ///
    /// Returns [`TransportError::Overflow`] once more than `max_len`
    /// bytes accumulate without a terminator, [`TransportError::PeerClosed`]
    /// if the peer half-closes mid-line, and [`TransportError::Timeout`]
    /// when `timeout` elapses first. Bytes beyond the terminator are
    /// kept for the next call.
    pub fn recv_line(
        &mut self,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(pos) = self.carry.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.carry.drain(..=pos).collect();
                return Ok(line);
            }
            if self.carry.len() > max_len {
                return Err(TransportError::Overflow { limit: max_len });
            }

            let remaining = deadline
                .checked_duration_since(Instant::now())
                .filter(|left| !left.is_zero())
                .ok_or(TransportError::Timeout)?;
            self.stream.set_read_timeout(Some(remaining))?;

            let mut chunk = [0u8; 512];
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(TransportError::PeerClosed),
                Ok(n) => self.carry.extend_from_slice(&chunk[..n]),
                Err(error) => return Err(TransportError::from_socket_io(error)),
            }
        }
    }

    /// Reads some bytes; 0 means the peer half-closed.
    pub fn recv_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.carry.is_empty() {
            let n = self.carry.len().min(buf.len());
            buf[..n].copy_from_slice(&self.carry[..n]);
            self.carry.drain(..n);
            return Ok(n);
        }
        self.stream.read(buf)
    }

    /// Fills `buf` completely or fails.
    pub fn recv_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let take = self.carry.len().min(buf.len());
        buf[..take].copy_from_slice(&self.carry[..take]);
        self.carry.drain(..take);
        self.stream.read_exact(&mut buf[take..])
    }

    /// Writes the whole buffer.
    pub fn send_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream.write_all(buf)
    }

    /// Arms or clears the socket receive timeout.
    pub fn set_recv_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)
    }

    /// Arms or clears the socket send timeout.
    pub fn set_send_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_write_timeout(timeout)
    }

    /// Toggles Nagle's algorithm.
    pub fn set_tcp_nodelay(&self, enabled: bool) -> io::Result<()> {
        self.stream.set_nodelay(enabled)
    }

    /// Toggles TCP keepalive probes.
    pub fn set_keepalive(&self, enabled: bool) -> io::Result<()> {
        SockRef::from(&self.stream).set_keepalive(enabled)
    }

    /// Half-closes the sending direction.
    pub fn shutdown_send(&self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Write)
    }

    /// Half-closes the receiving direction.
    pub fn shutdown_recv(&self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Read)
    }

    /// Closes both directions; later I/O on clones fails fast.
    pub fn shutdown_both(&self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Both)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{AddrFamily, Listener};
    use std::thread;

    fn pair() -> (Connection, Connection) {
        let (listener, port) =
            Listener::bind_in_range(AddrFamily::V4, 22000..=22900, 4).expect("bind");
        let client = thread::spawn(move || {
            Connection::new(TcpStream::connect(("127.0.0.1", port)).expect("connect"))
        });
        let (server, _ip, _port) = listener.accept().expect("accept");
        (server, client.join().expect("client"))
    }

    #[test]
    fn recv_line_preserves_crlf() {
        let (mut server, mut client) = pair();
        client.send_all(b"USER anonymous\r\n").expect("send");
        let line = server
            .recv_line(1024, Duration::from_secs(2))
            .expect("line");
        assert_eq!(line, b"USER anonymous\r\n");
    }

    #[test]
    fn recv_line_splits_pipelined_commands() {
        let (mut server, mut client) = pair();
        client.send_all(b"NOOP\r\nQUIT\r\n").expect("send");
        let first = server
            .recv_line(1024, Duration::from_secs(2))
            .expect("first");
        let second = server
            .recv_line(1024, Duration::from_secs(2))
            .expect("second");
        assert_eq!(first, b"NOOP\r\n");
        assert_eq!(second, b"QUIT\r\n");
    }

    #[test]
    fn recv_line_times_out_when_silent() {
        let (mut server, _client) = pair();
        let result = server.recv_line(1024, Duration::from_millis(80));
        assert!(matches!(result, Err(TransportError::Timeout)));
    }

    #[test]
    fn recv_line_reports_peer_close() {
        let (mut server, client) = pair();
        drop(client);
        let result = server.recv_line(1024, Duration::from_secs(2));
        assert!(matches!(result, Err(TransportError::PeerClosed)));
    }

    #[test]
    fn recv_line_rejects_oversized_line() {
        let (mut server, mut client) = pair();
        client.send_all(&[b'a'; 2048]).expect("send");
        let result = server.recv_line(512, Duration::from_secs(2));
        assert!(matches!(result, Err(TransportError::Overflow { limit: 512 })));
    }

    #[test]
    fn recv_some_drains_carry_before_socket() {
        let (mut server, mut client) = pair();
        client.send_all(b"HEAD\r\nbody").expect("send");
        let _line = server
            .recv_line(1024, Duration::from_secs(2))
            .expect("line");
        let mut buf = [0u8; 16];
        let n = server.recv_some(&mut buf).expect("recv");
        assert_eq!(&buf[..n], b"body");
    }

    #[test]
    fn shutdown_send_signals_eof_to_peer() {
        let (server, mut client) = pair();
        server.shutdown_send().expect("shutdown");
        let mut buf = [0u8; 8];
        let n = client.recv_some(&mut buf).expect("recv");
        assert_eq!(n, 0);
    }
}
