//! Buffered reader with a sticky error.

use super::chunk::SliceAlloc;
use super::DEFAULT_BUFFER_SIZE;
use crate::buffer::{self, Slice};
use crate::error::{Error, Result};
use bytes::{Bytes, BytesMut};
use std::io::{self, Read};

/// Largest output [`Reader::read_full`] commits ahead of the data.
pub const READ_FULL_STEP: usize = 1 << 20;

/// Result of scanning for a delimiter.
enum Scan {
    /// `buf[start..end]` holds the line including the delimiter.
    Found { start: usize, end: usize },
    /// No delimiter and no room left to read more.
    Full,
}

/// Buffered reader over a byte source.
///
/// The internal buffer is a fixed-size [`Slice`]; it is compacted before
/// each refill and never grows. The first error from the source is latched:
/// every later call returns it again without touching the source.
pub struct Reader<R> {
    rd: R,
    buf: Slice,
    /// Start of unread data.
    rpos: usize,
    /// End of valid data.
    wpos: usize,
    err: Option<Error>,
    slices: SliceAlloc,
}

impl<R: Read> Reader<R> {
    /// Reader with a [`DEFAULT_BUFFER_SIZE`] buffer.
    pub fn new(rd: R) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, rd)
    }

    /// Reader whose buffer comes from the process buffer allocator.
    pub fn with_capacity(size: usize, rd: R) -> Self {
        let size = if size == 0 { DEFAULT_BUFFER_SIZE } else { size };
        Self::with_buffer(buffer::make_slice(size), rd)
    }

    /// Reader over a caller-provided buffer. An empty buffer is replaced by a
    /// default-sized managed one.
    pub fn with_buffer(buf: Slice, rd: R) -> Self {
        let buf = if buf.is_empty() {
            Slice::managed(DEFAULT_BUFFER_SIZE)
        } else {
            buf
        };
        Self {
            rd,
            buf,
            rpos: 0,
            wpos: 0,
            err: None,
            slices: SliceAlloc::new(),
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.rd
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.rd
    }

    /// Bytes buffered but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.wpos - self.rpos
    }

    /// Size of the internal buffer.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// The latched error, if any.
    pub fn error(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    fn check(&self) -> Result<()> {
        match &self.err {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn latch(&mut self, err: Error) -> Error {
        self.err = Some(err.clone());
        err
    }

    /// Compact unread bytes to the front, then issue one read into the free
    /// space. An interrupted read adds nothing and is not an error.
    fn fill(&mut self) -> Result<()> {
        self.check()?;
        if self.rpos > 0 {
            self.buf.copy_within(self.rpos..self.wpos, 0);
            self.wpos -= self.rpos;
            self.rpos = 0;
        }
        match self.rd.read(&mut self.buf[self.wpos..]) {
            Ok(0) => Err(self.latch(Error::Eof)),
            Ok(n) => {
                self.wpos += n;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(()),
            Err(e) => Err(self.latch(e.into())),
        }
    }

    /// Read straight from the source into `dst`, skipping the buffer.
    fn read_direct(&mut self, dst: &mut [u8]) -> Result<usize> {
        match self.rd.read(dst) {
            Ok(0) => Err(self.latch(Error::Eof)),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(self.latch(e.into())),
        }
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        self.check()?;
        while self.buffered() == 0 {
            self.fill()?;
        }
        let c = self.buf[self.rpos];
        self.rpos += 1;
        Ok(c)
    }

    /// Next byte without consuming it.
    pub fn peek_byte(&mut self) -> Result<u8> {
        self.check()?;
        while self.buffered() == 0 {
            self.fill()?;
        }
        Ok(self.buf[self.rpos])
    }

    fn scan(&mut self, delim: u8) -> Result<Scan> {
        self.check()?;
        // Offset from rpos up to which the buffer is known not to hold delim.
        let mut searched = 0;
        loop {
            let window = &self.buf[self.rpos + searched..self.wpos];
            if let Some(index) = window.iter().position(|&b| b == delim) {
                let start = self.rpos;
                let end = start + searched + index + 1;
                self.rpos = end;
                return Ok(Scan::Found { start, end });
            }
            searched = self.buffered();
            if searched == self.buf.len() {
                return Ok(Scan::Full);
            }
            self.fill()?;
        }
    }

    /// Bytes up to and including `delim`, borrowed from the internal buffer.
    ///
    /// The returned slice is only valid until the next call on this reader.
    /// If the buffer fills up without a delimiter this returns
    /// [`Error::BufferFull`] and consumes nothing; the error is not latched,
    /// and [`read_bytes`](Self::read_bytes) can pick up the same line.
    pub fn read_slice(&mut self, delim: u8) -> Result<&[u8]> {
        match self.scan(delim)? {
            Scan::Found { start, end } => Ok(&self.buf[start..end]),
            Scan::Full => Err(Error::BufferFull),
        }
    }

    /// Bytes up to and including `delim` as an owned buffer.
    ///
    /// Lines longer than the internal buffer are reassembled: each full
    /// buffer is copied out and drained before reading on.
    pub fn read_bytes(&mut self, delim: u8) -> Result<Bytes> {
        let mut spilled = BytesMut::new();
        loop {
            match self.scan(delim)? {
                Scan::Found { start, end } => {
                    let last = &self.buf[start..end];
                    if spilled.is_empty() {
                        let mut out = self.slices.make(last.len());
                        out.copy_from_slice(last);
                        return Ok(out.freeze());
                    }
                    spilled.extend_from_slice(last);
                    return Ok(spilled.freeze());
                }
                Scan::Full => {
                    spilled.extend_from_slice(&self.buf[self.rpos..self.wpos]);
                    self.rpos = self.wpos;
                }
            }
        }
    }

    /// Exactly `n` bytes as an owned buffer.
    ///
    /// Above [`READ_FULL_STEP`] the output grows as data arrives, one step at
    /// a time, so a length header alone never commits the whole allocation.
    pub fn read_full(&mut self, n: usize) -> Result<Bytes> {
        self.check()?;
        if n == 0 {
            return Ok(Bytes::new());
        }
        if n > READ_FULL_STEP {
            return self.read_full_stepped(n);
        }
        let mut out = self.slices.make(n);
        let mut filled = 0;
        while filled < n {
            if self.buffered() == 0 {
                if n - filled >= self.buf.len() {
                    filled += self.read_direct(&mut out[filled..])?;
                } else {
                    self.fill()?;
                }
                continue;
            }
            let count = self.buffered().min(n - filled);
            out[filled..filled + count].copy_from_slice(&self.buf[self.rpos..self.rpos + count]);
            self.rpos += count;
            filled += count;
        }
        Ok(out.freeze())
    }

    fn read_full_stepped(&mut self, n: usize) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(READ_FULL_STEP);
        while out.len() < n {
            if out.len() == out.capacity() {
                out.reserve((n - out.len()).min(READ_FULL_STEP));
            }
            if self.buffered() == 0 {
                let want = (n - out.len()).min(out.capacity() - out.len());
                if want >= self.buf.len() {
                    let start = out.len();
                    out.resize(start + want, 0);
                    match self.read_direct(&mut out[start..]) {
                        Ok(got) => out.truncate(start + got),
                        Err(err) => return Err(err),
                    }
                } else {
                    self.fill()?;
                }
                continue;
            }
            let count = self.buffered().min(n - out.len());
            out.extend_from_slice(&self.buf[self.rpos..self.rpos + count]);
            self.rpos += count;
        }
        Ok(out.freeze())
    }
}

impl<R: Read> Read for Reader<R> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        if let Some(err) = &self.err {
            return match err {
                Error::Eof => Ok(0),
                err => Err(err.clone().into()),
            };
        }
        if dst.is_empty() {
            return Ok(0);
        }
        if self.buffered() == 0 {
            let result = if dst.len() >= self.buf.len() {
                self.read_direct(dst)
            } else {
                self.fill().map(|_| 0)
            };
            match result {
                Ok(0) if self.buffered() == 0 => return Err(io::ErrorKind::Interrupted.into()),
                Ok(0) => {}
                Ok(n) => return Ok(n),
                Err(Error::Eof) => return Ok(0),
                Err(err) => return Err(err.into()),
            }
        }
        let count = self.buffered().min(dst.len());
        dst[..count].copy_from_slice(&self.buf[self.rpos..self.rpos + count]);
        self.rpos += count;
        Ok(count)
    }
}
