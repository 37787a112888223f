//! Spectoda binary codec
//!
//! Cursor based [`Reader`] and [`Writer`] over flat byte buffers. All
//! multi-byte integers are little-endian. Supported integer widths are
//! 1, 2, 4, 6 and 8 bytes; 6-byte fields carry 48-bit network timestamps.
//!
//! Reads and writes are bounds checked and fail with
//! [`Error::ReadOutOfRange`], [`Error::PeekOutOfRange`] or
//! [`Error::WriteOutOfRange`]. Cursor moves (`forward`, `back`) clamp
//! silently instead.

use crate::types::{Label, Mac};
use crate::{Error, Result};
use bytes::Bytes;

fn check_width(size: usize) -> Result<()> {
    match size {
        1 | 2 | 4 | 6 | 8 => Ok(()),
        other => Err(Error::UnsupportedWidth(other)),
    }
}

/// Accumulate `bytes` little-endian into a u64
#[inline]
fn accumulate(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Sign-extend the low `size` bytes of `raw`
#[inline]
fn sign_extend(raw: u64, size: usize) -> i64 {
    if size >= 8 {
        return raw as i64;
    }
    let bits = size * 8;
    let sign_bit = 1u64 << (bits - 1);
    if raw & sign_bit != 0 {
        (raw | (u64::MAX << bits)) as i64
    } else {
        raw as i64
    }
}

// ============================================================================
// READER
// ============================================================================

/// Cursor over an immutable byte buffer
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Create a reader positioned at the start of `buf`
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Remaining unread bytes
    pub fn available(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Current cursor position
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Total buffer length
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if the underlying buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Move the cursor forward, clamped to the end of the buffer
    pub fn forward(&mut self, n: usize) {
        self.pos = self.pos.saturating_add(n).min(self.buf.len());
    }

    /// Move the cursor back, clamped to the start of the buffer
    pub fn back(&mut self, n: usize) {
        self.pos = self.pos.saturating_sub(n);
    }

    fn span(&self, size: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(size)?;
        self.buf.get(self.pos..end)
    }

    fn read_span(&mut self, size: usize) -> Result<&'a [u8]> {
        let span = self.span(size).ok_or(Error::ReadOutOfRange {
            offset: self.pos,
            requested: size,
            available: self.available(),
        })?;
        self.pos += size;
        Ok(span)
    }

    /// Peek an unsigned integer of `size` bytes without moving the cursor
    pub fn peek_uint(&self, size: usize) -> Result<u64> {
        check_width(size)?;
        self.span(size)
            .map(accumulate)
            .ok_or(Error::PeekOutOfRange {
                offset: self.pos,
                requested: size,
                available: self.available(),
            })
    }

    /// Peek a signed integer of `size` bytes without moving the cursor
    pub fn peek_int(&self, size: usize) -> Result<i64> {
        Ok(sign_extend(self.peek_uint(size)?, size))
    }

    /// Read an unsigned integer of `size` bytes
    pub fn read_uint(&mut self, size: usize) -> Result<u64> {
        check_width(size)?;
        self.read_span(size).map(accumulate)
    }

    /// Read a signed (two's complement) integer of `size` bytes
    pub fn read_int(&mut self, size: usize) -> Result<i64> {
        check_width(size)?;
        Ok(sign_extend(self.read_span(size).map(accumulate)?, size))
    }

    /// Peek the next flag byte
    pub fn peek_flag(&self) -> Result<u8> {
        self.peek_uint(1).map(|v| v as u8)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_uint(1).map(|v| v as u8)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.read_int(1).map(|v| v as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_uint(2).map(|v| v as u16)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.read_int(2).map(|v| v as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_uint(4).map(|v| v as u32)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_int(4).map(|v| v as i32)
    }

    /// Read a 48-bit unsigned value (network timestamps)
    pub fn read_u48(&mut self) -> Result<u64> {
        self.read_uint(6)
    }

    /// Read a 48-bit signed value
    pub fn read_i48(&mut self) -> Result<i64> {
        self.read_int(6)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_uint(8)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.read_int(8)
    }

    /// Read `n` bytes into an owned copy
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.read_span(n).map(<[u8]>::to_vec)
    }

    /// Read a fixed-length string field of `n` bytes.
    ///
    /// The value stops at the first NUL byte but the cursor always advances
    /// by the full `n` bytes.
    pub fn read_string(&mut self, n: usize) -> Result<String> {
        let span = self.read_span(n)?;
        let end = span.iter().position(|&b| b == 0).unwrap_or(span.len());
        Ok(String::from_utf8_lossy(&span[..end]).into_owned())
    }

    /// Read a 5-byte label field
    pub fn read_label(&mut self) -> Result<Label> {
        let span = self.read_span(Label::SIZE)?;
        let mut raw = [0u8; Label::SIZE];
        raw.copy_from_slice(span);
        Ok(Label::from_raw(raw))
    }

    /// Read a 6-byte MAC address
    pub fn read_mac(&mut self) -> Result<Mac> {
        let span = self.read_span(Mac::SIZE)?;
        let mut raw = [0u8; Mac::SIZE];
        raw.copy_from_slice(span);
        Ok(Mac(raw))
    }

    /// Unread remainder of the buffer, without moving the cursor
    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

// ============================================================================
// WRITER
// ============================================================================

/// Cursor over a fixed-capacity, pre-allocated byte buffer
#[derive(Debug, Clone)]
pub struct Writer {
    buf: Vec<u8>,
    pos: usize,
}

impl Writer {
    /// Create a writer able to hold `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity],
            pos: 0,
        }
    }

    /// Maximum number of bytes the writer can hold
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of bytes written so far
    pub fn written(&self) -> usize {
        self.pos
    }

    /// View of the bytes actually written
    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    /// Consume the writer, returning the written bytes
    pub fn into_bytes(mut self) -> Bytes {
        self.buf.truncate(self.pos);
        Bytes::from(self.buf)
    }

    /// Rewind to the start, reusing the buffer
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    fn reserve_span(&mut self, size: usize) -> Result<&mut [u8]> {
        let end = self
            .pos
            .checked_add(size)
            .filter(|&end| end <= self.buf.len())
            .ok_or(Error::WriteOutOfRange {
                offset: self.pos,
                requested: size,
                capacity: self.buf.len(),
            })?;
        let start = self.pos;
        self.pos = end;
        Ok(&mut self.buf[start..end])
    }

    /// Write the low `size` bytes of `value`, low byte first
    pub fn write_uint(&mut self, value: u64, size: usize) -> Result<()> {
        check_width(size)?;
        let le = value.to_le_bytes();
        self.reserve_span(size)?.copy_from_slice(&le[..size]);
        Ok(())
    }

    /// Write `value` as a two's complement integer of `size` bytes
    pub fn write_int(&mut self, value: i64, size: usize) -> Result<()> {
        self.write_uint(value as u64, size)
    }

    /// Write a single protocol flag byte
    pub fn write_flag(&mut self, flag: u8) -> Result<()> {
        self.write_uint(u64::from(flag), 1)
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_uint(u64::from(value), 1)
    }

    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_int(i64::from(value), 1)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_uint(u64::from(value), 2)
    }

    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        self.write_int(i64::from(value), 2)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_uint(u64::from(value), 4)
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_int(i64::from(value), 4)
    }

    pub fn write_u48(&mut self, value: u64) -> Result<()> {
        self.write_uint(value, 6)
    }

    pub fn write_i48(&mut self, value: i64) -> Result<()> {
        self.write_int(value, 6)
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_uint(value, 8)
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_int(value, 8)
    }

    /// Write exactly `size` bytes: `bytes` truncated or zero padded to fit
    pub fn write_bytes(&mut self, bytes: &[u8], size: usize) -> Result<()> {
        let span = self.reserve_span(size)?;
        let n = bytes.len().min(size);
        span[..n].copy_from_slice(&bytes[..n]);
        span[n..].fill(0);
        Ok(())
    }

    /// Write `s` into a `len`-byte field. No terminator is appended.
    pub fn write_string(&mut self, s: &str, len: usize) -> Result<()> {
        self.write_bytes(s.as_bytes(), len)
    }

    /// Write a 5-byte label field
    pub fn write_label(&mut self, label: &Label) -> Result<()> {
        self.write_bytes(label.as_raw(), Label::SIZE)
    }

    /// Write a 6-byte MAC address
    pub fn write_mac(&mut self, mac: &Mac) -> Result<()> {
        self.write_bytes(&mac.0, Mac::SIZE)
    }
}
