//! Bounds checked access to octet buffers.
//!
//! The [`Reader`] and [`Writer`] are the only places that index into packet buffers. Everything
//! above them asks for a number of bytes or an integer of some width and gets an error instead of
//! a panic when the buffer does not cooperate.
//!
//! [`Reader`]: struct.Reader.html
//! [`Writer`]: struct.Writer.html
use core::ops::Range;

use byteorder::{ByteOrder, LittleEndian, NetworkEndian};

use super::{Endian, Error, Result};

/// A read position within a borrowed buffer.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buffer: &'a [u8],
    position: usize,
}

/// A growing output buffer with an optional hard limit.
#[derive(Debug, Clone, Default)]
pub struct Writer {
    buffer: Vec<u8>,
    limit: Option<usize>,
}

/// Check that an unsigned value is representable in `width` octets.
pub(crate) fn fits_uint(value: u64, width: usize) -> bool {
    width >= 8 || value >> (8 * width) == 0
}

/// Check that a signed value is representable in `width` octets, two's complement.
pub(crate) fn fits_int(value: i64, width: usize) -> bool {
    if width == 0 {
        return value == 0;
    }
    if width >= 8 {
        return true;
    }

    let bits = 8 * width as u32;
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << (bits - 1)) - 1;
    min <= value && value <= max
}

fn valid_width(width: usize) -> Result<()> {
    match width {
        1..=8 => Ok(()),
        _ => Err(Error::InvalidSchema),
    }
}

impl<'a> Reader<'a> {
    /// Start reading at the beginning of `buffer`.
    pub fn new(buffer: &'a [u8]) -> Self {
        Reader {
            buffer,
            position: 0,
        }
    }

    /// The number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.position
    }

    /// The number of bytes left.
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    /// Take the next `len` bytes.
    ///
    /// Returns `Err(Error::Truncated)` and leaves the position unchanged if fewer bytes remain.
    pub fn read(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::Truncated);
        }

        let start = self.position;
        self.position += len;
        Ok(&self.buffer[start..self.position])
    }

    /// Read an unsigned integer of `width` octets.
    pub fn read_uint(&mut self, width: usize, order: Endian) -> Result<u64> {
        valid_width(width)?;
        let bytes = self.read(width)?;
        Ok(match order {
            Endian::Big => NetworkEndian::read_uint(bytes, width),
            Endian::Little => LittleEndian::read_uint(bytes, width),
        })
    }

    /// Read a sign-extended integer of `width` octets.
    pub fn read_int(&mut self, width: usize, order: Endian) -> Result<i64> {
        valid_width(width)?;
        let bytes = self.read(width)?;
        Ok(match order {
            Endian::Big => NetworkEndian::read_int(bytes, width),
            Endian::Little => LittleEndian::read_int(bytes, width),
        })
    }

    /// Consume all remaining bytes.
    pub fn rest(&mut self) -> &'a [u8] {
        let start = self.position;
        self.position = self.buffer.len();
        &self.buffer[start..]
    }
}

impl Writer {
    /// An unbounded writer.
    pub fn new() -> Self {
        Writer::default()
    }

    /// A writer that refuses to grow beyond `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Writer {
            buffer: Vec::new(),
            limit: Some(limit),
        }
    }

    /// The number of bytes written so far.
    pub fn position(&self) -> usize {
        self.buffer.len()
    }

    /// The configured hard limit, if any.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    fn reserve(&mut self, len: usize) -> Result<()> {
        let wanted = self.buffer.len()
            .checked_add(len)
            .ok_or(Error::CapacityExceeded)?;
        match self.limit {
            Some(limit) if wanted > limit => Err(Error::CapacityExceeded),
            _ => Ok(()),
        }
    }

    /// Append raw bytes.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())?;
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Append an unsigned integer of `width` octets.
    ///
    /// Returns `Err(Error::InvalidFieldValue)` if the value needs more octets.
    pub fn write_uint(&mut self, value: u64, width: usize, order: Endian) -> Result<()> {
        let at = self.position();
        self.reserve(width)?;
        self.buffer.resize(at + width, 0);
        match self.patch_uint(at, value, width, order) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.buffer.truncate(at);
                Err(err)
            },
        }
    }

    /// Append a two's complement integer of `width` octets.
    pub fn write_int(&mut self, value: i64, width: usize, order: Endian) -> Result<()> {
        valid_width(width)?;
        if !fits_int(value, width) {
            return Err(Error::InvalidFieldValue);
        }

        let mut raw = [0; 8];
        match order {
            Endian::Big => NetworkEndian::write_int(&mut raw[..width], value, width),
            Endian::Little => LittleEndian::write_int(&mut raw[..width], value, width),
        }
        self.write(&raw[..width])
    }

    /// Overwrite bytes that were already written.
    ///
    /// Returns `Err(Error::Truncated)` if the range was not written yet.
    pub fn patch(&mut self, at: usize, bytes: &[u8]) -> Result<()> {
        let end = at.checked_add(bytes.len()).ok_or(Error::Truncated)?;
        match self.buffer.get_mut(at..end) {
            Some(slot) => Ok(slot.copy_from_slice(bytes)),
            None => Err(Error::Truncated),
        }
    }

    /// Overwrite an unsigned integer of `width` octets at `at`.
    pub fn patch_uint(&mut self, at: usize, value: u64, width: usize, order: Endian) -> Result<()> {
        valid_width(width)?;
        if !fits_uint(value, width) {
            return Err(Error::InvalidFieldValue);
        }

        let mut raw = [0; 8];
        match order {
            Endian::Big => NetworkEndian::write_uint(&mut raw[..width], value, width),
            Endian::Little => LittleEndian::write_uint(&mut raw[..width], value, width),
        }
        self.patch(at, &raw[..width])
    }

    /// A range of the bytes written so far.
    ///
    /// Returns `Err(Error::Truncated)` if the range was not written yet.
    pub fn slice(&self, range: Range<usize>) -> Result<&[u8]> {
        self.buffer.get(range).ok_or(Error::Truncated)
    }

    /// All bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer, returning the written bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

#[cfg(test)]
mod test {
    use super::*;

    static BYTES: [u8; 7] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0xff];

    #[test]
    fn read_in_order() {
        let mut reader = Reader::new(&BYTES);
        assert_eq!(reader.read_uint(1, Endian::Big), Ok(0x01));
        assert_eq!(reader.read_uint(2, Endian::Big), Ok(0x0203));
        assert_eq!(reader.read_uint(2, Endian::Little), Ok(0x0504));
        assert_eq!(reader.remaining(), 2);
        assert_eq!(reader.read_int(2, Endian::Big), Ok(0x06ff));
        assert_eq!(reader.remaining(), 0);
        assert!(reader.rest().is_empty());
    }

    #[test]
    fn read_signed() {
        let mut reader = Reader::new(&BYTES[6..]);
        assert_eq!(reader.read_int(1, Endian::Big), Ok(-1));
    }

    #[test]
    fn read_truncated() {
        let mut reader = Reader::new(&BYTES[..3]);
        assert_eq!(reader.read(2), Ok(&BYTES[..2]));
        assert_eq!(reader.read_uint(2, Endian::Big), Err(Error::Truncated));
        // A failed read does not consume anything.
        assert_eq!(reader.position(), 2);
        assert_eq!(reader.rest(), &BYTES[2..3]);
    }

    #[test]
    fn write_and_patch() {
        let mut writer = Writer::new();
        writer.write_uint(0x01, 1, Endian::Big).unwrap();
        writer.write_uint(0, 2, Endian::Big).unwrap();
        writer.write_uint(0x0504, 2, Endian::Little).unwrap();
        writer.write_int(0x06ff, 2, Endian::Big).unwrap();
        writer.patch_uint(1, 0x0203, 2, Endian::Big).unwrap();
        assert_eq!(writer.as_slice(), &BYTES[..]);
        assert_eq!(writer.slice(1..3), Ok(&BYTES[1..3]));
        assert_eq!(writer.slice(5..9), Err(Error::Truncated));
        assert_eq!(writer.patch(6, &[0, 0]), Err(Error::Truncated));
    }

    #[test]
    fn write_out_of_range() {
        let mut writer = Writer::new();
        assert_eq!(writer.write_uint(0x100, 1, Endian::Big), Err(Error::InvalidFieldValue));
        assert_eq!(writer.write_int(128, 1, Endian::Big), Err(Error::InvalidFieldValue));
        assert_eq!(writer.write_int(-129, 1, Endian::Big), Err(Error::InvalidFieldValue));
        assert_eq!(writer.position(), 0);
        writer.write_int(-128, 1, Endian::Big).unwrap();
        assert_eq!(writer.as_slice(), &[0x80]);
    }

    #[test]
    fn zero_width() {
        assert!(fits_int(0, 0));
        assert!(!fits_int(-1, 0));
        assert!(fits_uint(0, 0));
        assert!(!fits_uint(1, 0));
        assert_eq!(Writer::new().write_int(0, 0, Endian::Big), Err(Error::InvalidSchema));
    }

    #[test]
    fn write_limit() {
        let mut writer = Writer::with_limit(3);
        writer.write(&[1, 2]).unwrap();
        assert_eq!(writer.write(&[3, 4]), Err(Error::CapacityExceeded));
        assert_eq!(writer.write_uint(3, 2, Endian::Big), Err(Error::CapacityExceeded));
        writer.write(&[3]).unwrap();
        assert_eq!(writer.into_inner(), vec![1, 2, 3]);
    }
}
