//! RESP decoder.
//!
//! Reads one frame at a time from a [`Reader`]. Any malformed input is a
//! fatal [`Error::Protocol`]: once a frame is misread the byte alignment with
//! the peer is gone, and the usual cause is a second reader consuming bytes
//! from the same connection.

use super::frame::{Frame, RespType};
use crate::bufio::Reader;
use crate::error::{Error, Result};
use bytes::Bytes;
use std::io::Read;

/// Largest accepted bulk string (512 MB, same as Redis).
pub const MAX_BULK_BYTES_LEN: i64 = 512 * 1024 * 1024;

/// Largest accepted array length.
pub const MAX_ARRAY_LEN: i64 = 1024 * 1024;

/// Deepest accepted array nesting.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Elements reserved up front for an array, whatever its declared length.
const MAX_PREALLOC: usize = 1024;

/// Decodes RESP frames from a byte source.
pub struct Decoder<R> {
    rd: Reader<R>,
}

impl<R: Read> Decoder<R> {
    /// Decoder with a default-sized read buffer.
    pub fn new(rd: R) -> Self {
        Self::with_reader(Reader::new(rd))
    }

    pub fn with_capacity(size: usize, rd: R) -> Self {
        Self::with_reader(Reader::with_capacity(size, rd))
    }

    pub fn with_reader(rd: Reader<R>) -> Self {
        Self { rd }
    }

    pub fn reader(&self) -> &Reader<R> {
        &self.rd
    }

    pub fn reader_mut(&mut self) -> &mut Reader<R> {
        &mut self.rd
    }

    /// Decode the next frame.
    pub fn decode(&mut self) -> Result<Frame> {
        self.decode_frame(0)
    }

    /// Decode a request: an array of non-null bulk strings, or an inline
    /// command line whose words become bulk strings.
    pub fn decode_multi_bulk(&mut self) -> Result<Vec<Frame>> {
        if self.rd.peek_byte()? != RespType::Array.tag() {
            return self.decode_inline();
        }
        self.rd.read_byte()?;
        let n = self.decode_len()?;
        if n <= 0 {
            return Err(Error::protocol("bad multi-bulk length"));
        }
        if n > MAX_ARRAY_LEN {
            return Err(Error::protocol("multi-bulk length too large"));
        }
        let mut multi = Vec::with_capacity((n as usize).min(MAX_PREALLOC));
        for _ in 0..n {
            match self.decode_frame(1)? {
                frame @ Frame::Bulk(Some(_)) => multi.push(frame),
                _ => return Err(Error::protocol("bad multi-bulk content, should be bulkbytes")),
            }
        }
        Ok(multi)
    }

    fn decode_frame(&mut self, depth: usize) -> Result<Frame> {
        let tag = self.rd.read_byte()?;
        match RespType::from_tag(tag) {
            Some(RespType::String) => Ok(Frame::Simple(self.decode_text()?)),
            Some(RespType::Error) => Ok(Frame::Error(self.decode_text()?)),
            Some(RespType::Int) => Ok(Frame::Integer(self.decode_int()?)),
            Some(RespType::BulkBytes) => self.decode_bulk(),
            Some(RespType::Array) => self.decode_array(depth),
            None => Err(Error::protocol(format!("bad resp type {tag:#04x}"))),
        }
    }

    /// A CRLF-terminated line as an owned buffer, CRLF removed.
    fn decode_text(&mut self) -> Result<Bytes> {
        let mut line = self.rd.read_bytes(b'\n')?;
        let len = strip_crlf(&line)?.len();
        line.truncate(len);
        Ok(line)
    }

    /// Parse a short CRLF-terminated line in place, copying only if it spans
    /// more than one buffer.
    fn with_line<T>(&mut self, parse: impl Fn(&[u8]) -> Result<T>) -> Result<T> {
        match self.rd.read_slice(b'\n') {
            Ok(line) => return parse(strip_crlf(line)?),
            Err(Error::BufferFull) => {}
            Err(err) => return Err(err),
        }
        let line = self.rd.read_bytes(b'\n')?;
        parse(strip_crlf(&line)?)
    }

    fn decode_int(&mut self) -> Result<i64> {
        self.with_line(parse_int)
    }

    fn decode_len(&mut self) -> Result<i64> {
        self.with_line(parse_len)
    }

    fn decode_bulk(&mut self) -> Result<Frame> {
        let n = self.decode_len()?;
        if n < 0 {
            return Ok(Frame::Bulk(None));
        }
        if n > MAX_BULK_BYTES_LEN {
            return Err(Error::protocol("bad bulk bytes length"));
        }
        let n = n as usize;
        let mut data = self.rd.read_full(n + 2)?;
        if &data[n..] != b"\r\n" {
            return Err(Error::protocol("bad bulk bytes, missing CRLF"));
        }
        data.truncate(n);
        Ok(Frame::Bulk(Some(data)))
    }

    fn decode_array(&mut self, depth: usize) -> Result<Frame> {
        let n = self.decode_len()?;
        if n < 0 {
            return Ok(Frame::Array(None));
        }
        if n > MAX_ARRAY_LEN {
            return Err(Error::protocol("bad array length"));
        }
        if depth >= MAX_NESTING_DEPTH {
            return Err(Error::protocol("array nesting too deep"));
        }
        let mut frames = Vec::with_capacity((n as usize).min(MAX_PREALLOC));
        for _ in 0..n {
            frames.push(self.decode_frame(depth + 1)?);
        }
        Ok(Frame::Array(Some(frames)))
    }

    fn decode_inline(&mut self) -> Result<Vec<Frame>> {
        let line = self.decode_text()?;
        Ok(line
            .split(|&b| b == b' ')
            .filter(|word| !word.is_empty())
            .map(|word| Frame::Bulk(Some(line.slice_ref(word))))
            .collect())
    }
}

/// Decode one frame from a complete in-memory buffer.
pub fn decode_from(data: &[u8]) -> Result<Frame> {
    Decoder::new(data).decode()
}

/// Decode every frame in `data`. A truncated trailing frame is an error.
pub fn decode_all(data: &[u8]) -> Result<Vec<Frame>> {
    let mut decoder = Decoder::new(data);
    let mut frames = Vec::new();
    loop {
        match decoder.rd.peek_byte() {
            Ok(_) => frames.push(decoder.decode()?),
            Err(Error::Eof) => return Ok(frames),
            Err(err) => return Err(err),
        }
    }
}

fn strip_crlf(line: &[u8]) -> Result<&[u8]> {
    match line.strip_suffix(b"\r\n") {
        Some(text) => Ok(text),
        None => Err(Error::protocol("bad CRLF end")),
    }
}

/// Signed decimal: optional leading `-`, then digits only.
fn parse_int(p: &[u8]) -> Result<i64> {
    let (negative, digits) = match p.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, p),
    };
    if digits.is_empty() {
        return Err(Error::protocol("malformed integer"));
    }
    let mut n: u64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(Error::protocol("illegal bytes in integer"));
        }
        n = n
            .checked_mul(10)
            .and_then(|n| n.checked_add(u64::from(b - b'0')))
            .ok_or_else(|| Error::protocol("integer overflow"))?;
    }
    if negative {
        if n > i64::MIN.unsigned_abs() {
            return Err(Error::protocol("integer overflow"));
        }
        Ok(0i64.wrapping_sub_unsigned(n))
    } else {
        i64::try_from(n).map_err(|_| Error::protocol("integer overflow"))
    }
}

/// Length: exactly `-1` (null) or digits only.
fn parse_len(p: &[u8]) -> Result<i64> {
    if p.is_empty() {
        return Err(Error::protocol("malformed length"));
    }
    if p == b"-1" {
        return Ok(-1);
    }
    let mut n: i64 = 0;
    for &b in p {
        if !b.is_ascii_digit() {
            return Err(Error::protocol("illegal bytes in length"));
        }
        n = n
            .checked_mul(10)
            .and_then(|n| n.checked_add(i64::from(b - b'0')))
            .ok_or_else(|| Error::protocol("length overflow"))?;
    }
    Ok(n)
}
