//! RESP value model.

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in RESP.
pub const CRLF: &[u8] = b"\r\n";

/// RESP type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RespType {
    String = b'+',
    Error = b'-',
    Int = b':',
    BulkBytes = b'$',
    Array = b'*',
}

impl RespType {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<RespType> {
        match tag {
            b'+' => Some(RespType::String),
            b'-' => Some(RespType::Error),
            b':' => Some(RespType::Int),
            b'$' => Some(RespType::BulkBytes),
            b'*' => Some(RespType::Array),
            _ => None,
        }
    }
}

impl fmt::Display for RespType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RespType::String => "<string>",
            RespType::Error => "<error>",
            RespType::Int => "<int>",
            RespType::BulkBytes => "<bulkbytes>",
            RespType::Array => "<array>",
        };
        f.write_str(name)
    }
}

/// A RESP value.
///
/// Payloads are [`Bytes`] views. Values decoded from the same reader may share
/// backing blocks; call [`detach`](Frame::detach) before keeping a small value
/// around for a long time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Simple string: +OK\r\n
    Simple(Bytes),
    /// Error: -ERR message\r\n
    Error(Bytes),
    /// Integer: :1000\r\n
    Integer(i64),
    /// Bulk string: $5\r\nhello\r\n or $-1\r\n (null)
    Bulk(Option<Bytes>),
    /// Array: *2\r\n... or *-1\r\n (null)
    Array(Option<Vec<Frame>>),
}

impl Frame {
    pub fn simple<B: Into<Bytes>>(s: B) -> Frame {
        Frame::Simple(s.into())
    }

    pub fn error<B: Into<Bytes>>(s: B) -> Frame {
        Frame::Error(s.into())
    }

    pub fn integer(n: i64) -> Frame {
        Frame::Integer(n)
    }

    pub fn bulk<B: Into<Bytes>>(data: B) -> Frame {
        Frame::Bulk(Some(data.into()))
    }

    /// Null bulk string.
    pub fn null() -> Frame {
        Frame::Bulk(None)
    }

    pub fn array(frames: Vec<Frame>) -> Frame {
        Frame::Array(Some(frames))
    }

    pub fn null_array() -> Frame {
        Frame::Array(None)
    }

    /// A request: an array of bulk strings.
    pub fn command<I, B>(args: I) -> Frame
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Frame::array(args.into_iter().map(Frame::bulk).collect())
    }

    pub fn resp_type(&self) -> RespType {
        match self {
            Frame::Simple(_) => RespType::String,
            Frame::Error(_) => RespType::Error,
            Frame::Integer(_) => RespType::Int,
            Frame::Bulk(_) => RespType::BulkBytes,
            Frame::Array(_) => RespType::Array,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error(_))
    }

    /// True for a null bulk string or a null array.
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Bulk(None) | Frame::Array(None))
    }

    /// Payload of a simple string, error or non-null bulk string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Frame::Simple(b) | Frame::Error(b) | Frame::Bulk(Some(b)) => Some(&b[..]),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Frame::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Frame]> {
        match self {
            Frame::Array(Some(frames)) => Some(frames.as_slice()),
            _ => None,
        }
    }

    /// Copy every payload into its own allocation, so the value no longer
    /// keeps any shared decode block alive.
    pub fn detach(&self) -> Frame {
        match self {
            Frame::Simple(b) => Frame::Simple(Bytes::copy_from_slice(b)),
            Frame::Error(b) => Frame::Error(Bytes::copy_from_slice(b)),
            Frame::Integer(n) => Frame::Integer(*n),
            Frame::Bulk(b) => Frame::Bulk(b.as_deref().map(Bytes::copy_from_slice)),
            Frame::Array(frames) => {
                Frame::Array(frames.as_ref().map(|f| f.iter().map(Frame::detach).collect()))
            }
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

impl Frame {
    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "{}", String::from_utf8_lossy(s)),
            Frame::Error(s) => write!(f, "(error) {}", String::from_utf8_lossy(s)),
            Frame::Integer(n) => write!(f, "(integer) {n}"),
            Frame::Bulk(Some(data)) => write!(f, "\"{}\"", data.escape_ascii()),
            Frame::Bulk(None) | Frame::Array(None) => write!(f, "(nil)"),
            Frame::Array(Some(frames)) if frames.is_empty() => write!(f, "(empty array)"),
            Frame::Array(Some(frames)) => {
                for (i, frame) in frames.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                        write!(f, "{:indent$}", "")?;
                    }
                    let label = format!("{}) ", i + 1);
                    write!(f, "{label}")?;
                    frame.fmt_indented(f, indent + label.len())?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resp_type_tags() {
        for t in [
            RespType::String,
            RespType::Error,
            RespType::Int,
            RespType::BulkBytes,
            RespType::Array,
        ] {
            assert_eq!(RespType::from_tag(t.tag()), Some(t));
        }
        assert_eq!(RespType::from_tag(b'!'), None);
        assert_eq!(RespType::BulkBytes.to_string(), "<bulkbytes>");
    }

    #[test]
    fn test_command_builder() {
        let frame = Frame::command(["SET", "k", "v"]);
        assert_eq!(
            frame,
            Frame::array(vec![Frame::bulk("SET"), Frame::bulk("k"), Frame::bulk("v")])
        );
    }

    #[test]
    fn test_null_forms() {
        assert!(Frame::null().is_null());
        assert!(Frame::null_array().is_null());
        assert!(!Frame::array(vec![]).is_null());
        assert!(!Frame::bulk("").is_null());
    }

    #[test]
    fn test_detach_copies_payloads() {
        let shared = Bytes::from_static(b"hello world");
        let frame = Frame::array(vec![Frame::bulk(shared.slice(0..5)), Frame::null()]);
        let detached = frame.detach();
        assert_eq!(frame, detached);
        let original = frame.as_array().unwrap()[0].as_bytes().unwrap().as_ptr();
        let copied = detached.as_array().unwrap()[0].as_bytes().unwrap().as_ptr();
        assert_ne!(original, copied);
    }

    #[test]
    fn test_display() {
        assert_eq!(Frame::simple("OK").to_string(), "OK");
        assert_eq!(Frame::error("ERR x").to_string(), "(error) ERR x");
        assert_eq!(Frame::integer(-3).to_string(), "(integer) -3");
        assert_eq!(Frame::bulk("a\r\n").to_string(), "\"a\\r\\n\"");
        assert_eq!(Frame::null().to_string(), "(nil)");
        assert_eq!(
            Frame::array(vec![Frame::bulk("a"), Frame::integer(1)]).to_string(),
            "1) \"a\"\n2) (integer) 1"
        );
    }
}
