//! RESP encoder.

use super::frame::{Frame, RespType, CRLF};
use crate::bufio::Writer;
use crate::error::Result;
use bytes::Bytes;
use std::io::Write;

/// Encodes RESP frames into a [`Writer`].
///
/// Output is staged in the writer's buffer; pass `flush = true` (or call
/// [`flush`](Encoder::flush)) to push it to the sink.
pub struct Encoder<W> {
    wr: Writer<W>,
}

impl<W: Write> Encoder<W> {
    pub fn new(wr: W) -> Self {
        Self::with_writer(Writer::new(wr))
    }

    pub fn with_capacity(size: usize, wr: W) -> Self {
        Self::with_writer(Writer::with_capacity(size, wr))
    }

    pub fn with_writer(wr: Writer<W>) -> Self {
        Self { wr }
    }

    pub fn writer(&self) -> &Writer<W> {
        &self.wr
    }

    pub fn writer_mut(&mut self) -> &mut Writer<W> {
        &mut self.wr
    }

    /// Bytes staged and not yet flushed.
    pub fn buffered(&self) -> usize {
        self.wr.buffered()
    }

    pub fn encode(&mut self, frame: &Frame, flush: bool) -> Result<()> {
        self.encode_frame(frame)?;
        if flush {
            self.wr.flush()?;
        }
        Ok(())
    }

    /// Encode `multi` as one array of the given frames.
    pub fn encode_multi_bulk(&mut self, multi: &[Frame], flush: bool) -> Result<()> {
        self.wr.write_byte(RespType::Array.tag())?;
        self.encode_len(multi.len() as i64)?;
        for frame in multi {
            self.encode_frame(frame)?;
        }
        if flush {
            self.wr.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.wr.flush()
    }

    fn encode_frame(&mut self, frame: &Frame) -> Result<()> {
        self.wr.write_byte(frame.resp_type().tag())?;
        match frame {
            Frame::Simple(text) | Frame::Error(text) => self.encode_text(text),
            Frame::Integer(n) => self.encode_int(*n),
            Frame::Bulk(None) | Frame::Array(None) => self.encode_len(-1),
            Frame::Bulk(Some(data)) => {
                self.encode_len(data.len() as i64)?;
                self.wr.write(data)?;
                self.wr.write(CRLF)?;
                Ok(())
            }
            Frame::Array(Some(frames)) => {
                self.encode_len(frames.len() as i64)?;
                for frame in frames {
                    self.encode_frame(frame)?;
                }
                Ok(())
            }
        }
    }

    fn encode_text(&mut self, text: &[u8]) -> Result<()> {
        self.wr.write(text)?;
        self.wr.write(CRLF)?;
        Ok(())
    }

    fn encode_int(&mut self, n: i64) -> Result<()> {
        let mut digits = [0u8; 20];
        self.wr.write(format_int(n, &mut digits))?;
        self.wr.write(CRLF)?;
        Ok(())
    }

    fn encode_len(&mut self, n: i64) -> Result<()> {
        self.encode_int(n)
    }
}

/// Format `n` in decimal into the tail of `buf`.
fn format_int(n: i64, buf: &mut [u8; 20]) -> &[u8] {
    let mut pos = buf.len();
    let mut v = n.unsigned_abs();
    loop {
        pos -= 1;
        buf[pos] = b'0' + (v % 10) as u8;
        v /= 10;
        if v == 0 {
            break;
        }
    }
    if n < 0 {
        pos -= 1;
        buf[pos] = b'-';
    }
    &buf[pos..]
}

/// Encode a single frame into a fresh buffer.
pub fn encode_to_bytes(frame: &Frame) -> Result<Bytes> {
    let mut encoder = Encoder::new(Vec::new());
    encoder.encode(frame, true)?;
    Ok(Bytes::from(std::mem::take(encoder.wr.get_mut())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(frame: &Frame) -> Vec<u8> {
        encode_to_bytes(frame).unwrap().to_vec()
    }

    #[test]
    fn test_encode_scalars() {
        assert_eq!(encoded(&Frame::simple("OK")), b"+OK\r\n");
        assert_eq!(encoded(&Frame::error("ERR bad")), b"-ERR bad\r\n");
        assert_eq!(encoded(&Frame::integer(0)), b":0\r\n");
        assert_eq!(encoded(&Frame::integer(-42)), b":-42\r\n");
        assert_eq!(
            encoded(&Frame::integer(i64::MIN)),
            b":-9223372036854775808\r\n"
        );
        assert_eq!(
            encoded(&Frame::integer(i64::MAX)),
            b":9223372036854775807\r\n"
        );
    }

    #[test]
    fn test_encode_bulk() {
        assert_eq!(encoded(&Frame::bulk("hello")), b"$5\r\nhello\r\n");
        assert_eq!(encoded(&Frame::bulk("")), b"$0\r\n\r\n");
        assert_eq!(encoded(&Frame::null()), b"$-1\r\n");
    }

    #[test]
    fn test_encode_arrays() {
        assert_eq!(
            encoded(&Frame::command(["SET", "k", "v"])),
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n"
        );
        assert_eq!(encoded(&Frame::null_array()), b"*-1\r\n");
        assert_eq!(encoded(&Frame::array(vec![])), b"*0\r\n");
        assert_eq!(
            encoded(&Frame::array(vec![
                Frame::array(vec![Frame::integer(1)]),
                Frame::null()
            ])),
            b"*2\r\n*1\r\n:1\r\n$-1\r\n"
        );
    }

    #[test]
    fn test_encode_multi_bulk() {
        let mut encoder = Encoder::new(Vec::new());
        encoder
            .encode_multi_bulk(&[Frame::bulk("GET"), Frame::bulk("k")], false)
            .unwrap();
        assert!(encoder.writer().get_ref().is_empty());
        encoder.flush().unwrap();
        assert_eq!(
            encoder.writer().get_ref().as_slice(),
            b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n"
        );
    }

    #[test]
    fn test_encode_large_bulk_through_small_buffer() {
        let payload = vec![b'z'; 100];
        let mut encoder = Encoder::with_writer(Writer::with_buffer(
            crate::buffer::Slice::managed(16),
            Vec::new(),
        ));
        encoder.encode(&Frame::bulk(payload.clone()), true).unwrap();
        let mut expected = b"$100\r\n".to_vec();
        expected.extend_from_slice(&payload);
        expected.extend_from_slice(b"\r\n");
        assert_eq!(encoder.writer().get_ref(), &expected);
    }
}
