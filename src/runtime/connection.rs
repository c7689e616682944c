//! Deadline-aware RESP connection over a TCP stream.
//!
//! A [`Connection`] owns one socket, a [`Decoder`] on its read side and an
//! [`Encoder`] on its write side. Every socket read and write applies the
//! configured timeout first. A fatal error shuts the socket down exactly once,
//! so a call blocked on the other half returns an error instead of hanging.

use super::flush::FlushEncoder;
use crate::error::{Error, Result};
use crate::protocols::resp::{Decoder, Encoder, Frame};
use socket2::{Domain, Protocol, SockRef, Socket, TcpKeepalive, Type};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Socket state shared by both halves of a connection.
#[derive(Debug)]
struct Shared {
    stream: TcpStream,
    closed: AtomicBool,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Shut the socket down. Only the first call has any effect; returns
    /// whether this call was it.
    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
            Err(e) => debug!(error = %e, "socket shutdown failed"),
        }
        true
    }

    fn check(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Close the connection if `result` carries a fatal error.
    fn fatal<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_fatal() && self.close() {
                let peer = self.stream.peer_addr().ok();
                match err {
                    Error::Protocol(_) => warn!(?peer, error = %err, "closing connection"),
                    _ => debug!(?peer, error = %err, "closing connection"),
                }
            }
        }
        result
    }
}

/// Byte source for the decoder: a socket read bounded by the read timeout.
#[derive(Debug)]
pub struct ConnReader {
    shared: Arc<Shared>,
    timeout: Duration,
    has_deadline: bool,
}

impl Read for ConnReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.timeout.is_zero() {
            self.shared.stream.set_read_timeout(Some(self.timeout))?;
            self.has_deadline = true;
        } else if self.has_deadline {
            self.shared.stream.set_read_timeout(None)?;
            self.has_deadline = false;
        }
        (&self.shared.stream).read(buf)
    }
}

/// Byte sink for the encoder: a socket write bounded by the write timeout.
///
/// One call writes the whole buffer or fails, so a buffered flush maps to a
/// single call here. The timeout is a deadline for the whole call: each
/// socket write only gets what is left of it.
#[derive(Debug)]
pub struct ConnWriter {
    shared: Arc<Shared>,
    timeout: Duration,
    has_deadline: bool,
    last_write: Option<Instant>,
}

impl Write for ConnWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let deadline = if self.timeout.is_zero() {
            if self.has_deadline {
                self.shared.stream.set_write_timeout(None)?;
                self.has_deadline = false;
            }
            None
        } else {
            Some(Instant::now() + self.timeout)
        };
        let mut written = 0;
        while written < buf.len() {
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "write deadline exceeded",
                    ));
                }
                self.shared.stream.set_write_timeout(Some(remaining))?;
                self.has_deadline = true;
            }
            match (&self.shared.stream).write(&buf[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        self.last_write = Some(Instant::now());
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Read side of a connection.
pub struct ReadHalf {
    shared: Arc<Shared>,
    decoder: Decoder<ConnReader>,
}

impl ReadHalf {
    /// Decode the next frame.
    pub fn decode(&mut self) -> Result<Frame> {
        self.shared.check()?;
        let result = self.decoder.decode();
        self.shared.fatal(result)
    }

    /// Decode the next request as a list of bulk strings.
    pub fn decode_multi_bulk(&mut self) -> Result<Vec<Frame>> {
        self.shared.check()?;
        let result = self.decoder.decode_multi_bulk();
        self.shared.fatal(result)
    }

    pub fn read_timeout(&self) -> Duration {
        self.decoder.reader().get_ref().timeout
    }

    /// Zero disables the timeout.
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.decoder.reader_mut().get_mut().timeout = timeout;
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.decoder.reader().buffered()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Close the whole connection.
    pub fn close(&self) {
        self.shared.close();
    }
}

/// Write side of a connection.
pub struct WriteHalf {
    shared: Arc<Shared>,
    encoder: Encoder<ConnWriter>,
}

impl WriteHalf {
    /// Encode `frame`, flushing to the socket if `flush` is set.
    pub fn encode(&mut self, frame: &Frame, flush: bool) -> Result<()> {
        self.shared.check()?;
        let result = self.encoder.encode(frame, flush);
        self.shared.fatal(result)
    }

    pub fn encode_multi_bulk(&mut self, multi: &[Frame], flush: bool) -> Result<()> {
        self.shared.check()?;
        let result = self.encoder.encode_multi_bulk(multi, flush);
        self.shared.fatal(result)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.shared.check()?;
        let result = self.encoder.flush();
        self.shared.fatal(result)
    }

    /// Batching front end over this half.
    pub fn flush_encoder(&mut self) -> FlushEncoder<'_> {
        FlushEncoder::new(self)
    }

    pub fn write_timeout(&self) -> Duration {
        self.encoder.writer().get_ref().timeout
    }

    /// Zero disables the timeout.
    pub fn set_write_timeout(&mut self, timeout: Duration) {
        self.encoder.writer_mut().get_mut().timeout = timeout;
    }

    /// When the socket last accepted a write, if ever.
    pub fn last_write(&self) -> Option<Instant> {
        self.encoder.writer().get_ref().last_write
    }

    /// Bytes encoded but not yet flushed.
    pub fn buffered(&self) -> usize {
        self.encoder.buffered()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Close the whole connection.
    pub fn close(&self) {
        self.shared.close();
    }
}

/// A RESP connection.
pub struct Connection {
    rd: ReadHalf,
    wr: WriteHalf,
}

impl Connection {
    /// Wrap an established stream with read and write buffers of the given
    /// sizes (zero picks the default). Buffers come from the process buffer
    /// allocator.
    pub fn new(stream: TcpStream, rbuf: usize, wbuf: usize) -> Result<Self> {
        stream.set_nodelay(true)?;
        let shared = Arc::new(Shared {
            stream,
            closed: AtomicBool::new(false),
        });
        let reader = ConnReader {
            shared: Arc::clone(&shared),
            timeout: Duration::ZERO,
            has_deadline: false,
        };
        let writer = ConnWriter {
            shared: Arc::clone(&shared),
            timeout: Duration::ZERO,
            has_deadline: false,
            last_write: None,
        };
        let rd = ReadHalf {
            shared: Arc::clone(&shared),
            decoder: Decoder::with_capacity(rbuf, reader),
        };
        let wr = WriteHalf {
            shared,
            encoder: Encoder::with_capacity(wbuf, writer),
        };
        Ok(Self { rd, wr })
    }

    /// Connect to `addr`, trying every resolved address in turn. A zero
    /// `timeout` waits for the operating system's connect timeout.
    pub fn dial<A: ToSocketAddrs>(
        addr: A,
        timeout: Duration,
        rbuf: usize,
        wbuf: usize,
    ) -> Result<Self> {
        let mut last_err = None;
        for addr in addr.to_socket_addrs()? {
            let attempt = if timeout.is_zero() {
                TcpStream::connect(addr)
            } else {
                TcpStream::connect_timeout(&addr, timeout)
            };
            match attempt {
                Ok(stream) => {
                    debug!(%addr, "connected");
                    return Self::new(stream, rbuf, wbuf);
                }
                Err(e) => {
                    trace!(%addr, error = %e, "connect failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
            })
            .into())
    }

    pub fn decode(&mut self) -> Result<Frame> {
        self.rd.decode()
    }

    pub fn decode_multi_bulk(&mut self) -> Result<Vec<Frame>> {
        self.rd.decode_multi_bulk()
    }

    pub fn encode(&mut self, frame: &Frame, flush: bool) -> Result<()> {
        self.wr.encode(frame, flush)
    }

    pub fn encode_multi_bulk(&mut self, multi: &[Frame], flush: bool) -> Result<()> {
        self.wr.encode_multi_bulk(multi, flush)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.wr.flush()
    }

    /// Batching front end over the write side.
    pub fn flush_encoder(&mut self) -> FlushEncoder<'_> {
        self.wr.flush_encoder()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.rd.shared.stream.local_addr()?)
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.rd.shared.stream.peer_addr()?)
    }

    pub fn read_timeout(&self) -> Duration {
        self.rd.read_timeout()
    }

    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.rd.set_read_timeout(timeout);
    }

    pub fn write_timeout(&self) -> Duration {
        self.wr.write_timeout()
    }

    pub fn set_write_timeout(&mut self, timeout: Duration) {
        self.wr.set_write_timeout(timeout);
    }

    pub fn last_write(&self) -> Option<Instant> {
        self.wr.last_write()
    }

    /// Enable TCP keep-alive probing with period `period`, or disable it when
    /// `period` is zero.
    pub fn set_keepalive_period(&self, period: Duration) -> Result<()> {
        let sock = SockRef::from(&self.rd.shared.stream);
        if period.is_zero() {
            sock.set_keepalive(false)?;
        } else {
            let keepalive = TcpKeepalive::new().with_time(period).with_interval(period);
            sock.set_tcp_keepalive(&keepalive)?;
        }
        Ok(())
    }

    /// Shut down the read side only. Buffered output can still be flushed.
    pub fn close_read(&self) -> Result<()> {
        self.rd.shared.stream.shutdown(Shutdown::Read)?;
        Ok(())
    }

    /// Close the connection. Calling it again does nothing.
    pub fn close(&self) {
        if self.rd.shared.close() {
            trace!("connection closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.rd.shared.is_closed()
    }

    /// Separate the read and write sides so they can be driven from two
    /// threads. Closing either half closes the connection.
    pub fn into_split(self) -> (ReadHalf, WriteHalf) {
        (self.rd, self.wr)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("local", &self.rd.shared.stream.local_addr().ok())
            .field("peer", &self.rd.shared.stream.peer_addr().ok())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Bind a TCP listener with `SO_REUSEADDR`.
pub fn listen<A: ToSocketAddrs>(addr: A) -> Result<TcpListener> {
    let addr = addr.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
    })?;
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    Ok(socket.into())
}
