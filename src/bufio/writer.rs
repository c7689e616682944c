//! Buffered writer with a sticky error.

use super::DEFAULT_BUFFER_SIZE;
use crate::buffer::{self, Slice};
use crate::error::{Error, Result};
use std::io::{self, Write};

/// Buffered writer over a byte sink.
///
/// Small writes are staged in a fixed-size [`Slice`]. A flush hands the whole
/// staged region to the sink in a single `write` call; accepting fewer bytes
/// is a short write and, like any sink error, is latched for good.
pub struct Writer<W> {
    wr: W,
    buf: Slice,
    wpos: usize,
    err: Option<Error>,
}

impl<W: Write> Writer<W> {
    pub fn new(wr: W) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, wr)
    }

    /// Writer whose buffer comes from the process buffer allocator.
    pub fn with_capacity(size: usize, wr: W) -> Self {
        let size = if size == 0 { DEFAULT_BUFFER_SIZE } else { size };
        Self::with_buffer(buffer::make_slice(size), wr)
    }

    /// Writer over a caller-provided buffer. An empty buffer is replaced by a
    /// default-sized managed one.
    pub fn with_buffer(buf: Slice, wr: W) -> Self {
        let buf = if buf.is_empty() {
            Slice::managed(DEFAULT_BUFFER_SIZE)
        } else {
            buf
        };
        Self {
            wr,
            buf,
            wpos: 0,
            err: None,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.wr
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.wr
    }

    /// Bytes staged and not yet flushed.
    pub fn buffered(&self) -> usize {
        self.wpos
    }

    /// Free space in the buffer.
    pub fn available(&self) -> usize {
        self.buf.len() - self.wpos
    }

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

    /// Write the staged bytes to the sink.
    pub fn flush(&mut self) -> Result<()> {
        self.check()?;
        if self.wpos == 0 {
            return Ok(());
        }
        match self.wr.write(&self.buf[..self.wpos]) {
            Ok(n) if n < self.wpos => Err(self.latch(Error::ShortWrite)),
            Ok(_) => {
                self.wpos = 0;
                Ok(())
            }
            Err(e) => Err(self.latch(e.into())),
        }
    }

    /// Stage `data`, flushing as needed. Returns `data.len()` on success.
    ///
    /// With an empty buffer, input at least as large as the buffer goes to the
    /// sink directly.
    pub fn write(&mut self, mut data: &[u8]) -> Result<usize> {
        self.check()?;
        let total = data.len();
        while !data.is_empty() {
            if self.wpos == 0 && data.len() >= self.buf.len() {
                let n = match self.wr.write(data) {
                    Ok(0) => return Err(self.latch(Error::ShortWrite)),
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(self.latch(e.into())),
                };
                data = &data[n..];
                continue;
            }
            let n = self.available().min(data.len());
            self.buf[self.wpos..self.wpos + n].copy_from_slice(&data[..n]);
            self.wpos += n;
            data = &data[n..];
            if !data.is_empty() {
                self.flush()?;
            }
        }
        Ok(total)
    }

    pub fn write_byte(&mut self, c: u8) -> Result<()> {
        self.check()?;
        if self.available() == 0 {
            self.flush()?;
        }
        self.buf[self.wpos] = c;
        self.wpos += 1;
        Ok(())
    }

    pub fn write_str(&mut self, s: &str) -> Result<usize> {
        self.write(s.as_bytes())
    }
}

impl<W: Write> Write for Writer<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        Writer::write(self, data).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Writer::flush(self).map_err(io::Error::from)
    }
}
