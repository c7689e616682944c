//! Batched flushing for pipelined writes.

use super::connection::WriteHalf;
use crate::error::Result;
use crate::protocols::resp::Frame;
use std::time::Duration;

/// Coalesces encoded frames into fewer socket writes.
///
/// Frames are encoded without flushing and counted. [`flush`](Self::flush)
/// only writes to the socket once more than `max_buffered` frames are pending
/// or more than `max_interval` has passed since the last socket write.
pub struct FlushEncoder<'a> {
    wr: &'a mut WriteHalf,
    max_buffered: usize,
    max_interval: Duration,
    nbuffered: usize,
}

impl<'a> FlushEncoder<'a> {
    /// A policy with both limits at zero: any pending frame is flushed.
    pub fn new(wr: &'a mut WriteHalf) -> Self {
        Self {
            wr,
            max_buffered: 0,
            max_interval: Duration::ZERO,
            nbuffered: 0,
        }
    }

    pub fn with_max_buffered(mut self, max_buffered: usize) -> Self {
        self.max_buffered = max_buffered;
        self
    }

    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    pub fn max_buffered(&self) -> usize {
        self.max_buffered
    }

    pub fn set_max_buffered(&mut self, max_buffered: usize) {
        self.max_buffered = max_buffered;
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    pub fn set_max_interval(&mut self, max_interval: Duration) {
        self.max_interval = max_interval;
    }

    /// Frames encoded since the last flush.
    pub fn pending(&self) -> usize {
        self.nbuffered
    }

    pub fn need_flush(&self) -> bool {
        if self.nbuffered == 0 {
            return false;
        }
        if self.nbuffered > self.max_buffered {
            return true;
        }
        match self.wr.last_write() {
            Some(at) => at.elapsed() > self.max_interval,
            None => true,
        }
    }

    /// Flush if the policy says so, or unconditionally when `force` is set.
    pub fn flush(&mut self, force: bool) -> Result<()> {
        if force || self.need_flush() {
            self.wr.flush()?;
            self.nbuffered = 0;
        }
        Ok(())
    }

    pub fn encode(&mut self, frame: &Frame) -> Result<()> {
        self.wr.encode(frame, false)?;
        self.nbuffered += 1;
        Ok(())
    }

    pub fn encode_multi_bulk(&mut self, multi: &[Frame]) -> Result<()> {
        self.wr.encode_multi_bulk(multi, false)?;
        self.nbuffered += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::{listen, Connection};
    use super::*;
    use std::io::Read;
    use std::net::TcpStream;
    use std::thread;

    fn pair() -> (Connection, TcpStream) {
        let listener = listen("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let conn = Connection::dial(addr, Duration::from_secs(1), 1024, 1024).unwrap();
        let (peer, _) = listener.accept().unwrap();
        (conn, peer)
    }

    #[test]
    fn test_flushes_after_max_buffered() {
        let (mut conn, mut peer) = pair();
        // Establish a last write so only the count threshold applies.
        conn.encode(&Frame::simple("hello"), true).unwrap();

        let mut fe = conn
            .flush_encoder()
            .with_max_buffered(2)
            .with_max_interval(Duration::from_secs(3600));
        for _ in 0..2 {
            fe.encode(&Frame::integer(1)).unwrap();
            fe.flush(false).unwrap();
        }
        assert_eq!(fe.pending(), 2);
        assert!(!fe.need_flush());

        fe.encode(&Frame::integer(1)).unwrap();
        assert!(fe.need_flush());
        fe.flush(false).unwrap();
        assert_eq!(fe.pending(), 0);

        let expected = b"+hello\r\n:1\r\n:1\r\n:1\r\n";
        let mut buf = vec![0u8; expected.len()];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(buf, expected);
    }

    #[test]
    fn test_flushes_after_max_interval() {
        let (mut conn, _peer) = pair();
        conn.encode(&Frame::simple("hello"), true).unwrap();

        let mut fe = conn
            .flush_encoder()
            .with_max_buffered(100)
            .with_max_interval(Duration::from_millis(20));
        fe.encode_multi_bulk(&[Frame::bulk("PING")]).unwrap();
        thread::sleep(Duration::from_millis(40));
        assert!(fe.need_flush());
        fe.flush(false).unwrap();
        assert_eq!(fe.pending(), 0);
    }

    #[test]
    fn test_first_write_flushes() {
        let (mut conn, _peer) = pair();
        let mut fe = conn
            .flush_encoder()
            .with_max_buffered(100)
            .with_max_interval(Duration::from_secs(3600));
        assert!(!fe.need_flush());
        fe.encode(&Frame::simple("OK")).unwrap();
        assert!(fe.need_flush());
    }

    #[test]
    fn test_force_flush() {
        let (mut conn, _peer) = pair();
        conn.encode(&Frame::simple("hello"), true).unwrap();
        let mut fe = conn
            .flush_encoder()
            .with_max_buffered(100)
            .with_max_interval(Duration::from_secs(3600));
        fe.encode(&Frame::simple("OK")).unwrap();
        fe.flush(false).unwrap();
        assert_eq!(fe.pending(), 1);
        fe.flush(true).unwrap();
        assert_eq!(fe.pending(), 0);
        assert_eq!(conn.flush_encoder().pending(), 0);
    }
}
