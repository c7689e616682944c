//! Error types shared by the buffered stream, codec and connection layers.
//!
//! `Error` is cloneable so that a stream wrapper can latch the first failure
//! and hand the same value back on every later call.

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Transport error.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Malformed RESP data. Always fatal: byte alignment with the peer is lost.
    #[error("protocol error: {0} (possible server error or unsupported concurrent read by application)")]
    Protocol(String),

    /// The underlying stream failed.
    #[error("i/o error: {0}")]
    Io(#[source] Arc<io::Error>),

    /// A read or write deadline expired.
    #[error("i/o timeout: {0}")]
    Timeout(#[source] Arc<io::Error>),

    /// The stream returned zero bytes: the peer closed it or made no progress.
    #[error("unexpected end of stream")]
    Eof,

    /// The sink accepted fewer bytes than requested.
    #[error("short write")]
    ShortWrite,

    /// No delimiter inside one full internal buffer. Recoverable.
    #[error("buffer full")]
    BufferFull,

    /// The connection was closed locally.
    #[error("connection closed")]
    Closed,
}

impl Error {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// True if a deadline expired. The caller may retry at a higher level.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// True for errors after which the connection can no longer be used.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Timeout(_) | Error::BufferFull)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            // Unix reports an expired SO_RCVTIMEO/SO_SNDTIMEO as EAGAIN.
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Error::Timeout(Arc::new(e)),
            io::ErrorKind::UnexpectedEof => Error::Eof,
            _ => Error::Io(Arc::new(e)),
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        let kind = match &e {
            Error::Io(inner) | Error::Timeout(inner) => inner.kind(),
            Error::Eof => io::ErrorKind::UnexpectedEof,
            Error::ShortWrite => io::ErrorKind::WriteZero,
            Error::Closed => io::ErrorKind::NotConnected,
            Error::Protocol(_) | Error::BufferFull => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        let err = Error::from(io::Error::new(io::ErrorKind::WouldBlock, "would block"));
        assert!(err.is_timeout());
        assert!(!err.is_fatal());

        let err = Error::from(io::Error::new(io::ErrorKind::TimedOut, "timed out"));
        assert!(err.is_timeout());

        let err = Error::from(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(!err.is_timeout());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_protocol_error_carries_hint() {
        let err = Error::protocol("bad resp type 0x21");
        let msg = err.to_string();
        assert!(msg.contains("bad resp type 0x21"));
        assert!(msg.contains("concurrent read"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_clone_keeps_kind() {
        let err = Error::from(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        match err.clone() {
            Error::Io(inner) => assert_eq!(inner.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
