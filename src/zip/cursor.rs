//! Bounds-checked little-endian reader over a byte slice.
//!
//! Every read checks the remaining length first and reports an
//! [`OutOfBounds`] instead of panicking, so malformed or truncated network
//! data never takes the process down.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::error::OutOfBounds;

pub struct ByteCursor<'a> {
    inner: Cursor<&'a [u8]>,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            inner: Cursor::new(data),
        }
    }

    /// Cursor positioned at `pos` within `data`.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        let mut cursor = Self::new(data);
        cursor.inner.set_position(pos as u64);
        cursor
    }

    pub fn position(&self) -> usize {
        self.inner.position() as usize
    }

    pub fn len(&self) -> usize {
        self.inner.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remaining(&self) -> usize {
        self.len().saturating_sub(self.position())
    }

    fn out_of_bounds(&self, needed: usize) -> OutOfBounds {
        OutOfBounds {
            offset: self.position(),
            needed,
            len: self.len(),
        }
    }

    fn ensure(&self, needed: usize) -> Result<(), OutOfBounds> {
        if self.remaining() < needed {
            return Err(self.out_of_bounds(needed));
        }
        Ok(())
    }

    pub fn u16(&mut self) -> Result<u16, OutOfBounds> {
        self.ensure(2)?;
        self.inner
            .read_u16::<LittleEndian>()
            .map_err(|_| self.out_of_bounds(2))
    }

    pub fn u32(&mut self) -> Result<u32, OutOfBounds> {
        self.ensure(4)?;
        self.inner
            .read_u32::<LittleEndian>()
            .map_err(|_| self.out_of_bounds(4))
    }

    pub fn u64(&mut self) -> Result<u64, OutOfBounds> {
        self.ensure(8)?;
        self.inner
            .read_u64::<LittleEndian>()
            .map_err(|_| self.out_of_bounds(8))
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], OutOfBounds> {
        self.ensure(n)?;
        let data: &'a [u8] = *self.inner.get_ref();
        let start = self.position();
        self.inner.set_position((start + n) as u64);
        Ok(&data[start..start + n])
    }

    pub fn skip(&mut self, n: usize) -> Result<(), OutOfBounds> {
        self.ensure(n)?;
        self.inner.set_position((self.position() + n) as u64);
        Ok(())
    }

    /// Consume a 4-byte signature, returning whether it matched.
    pub fn signature(&mut self, expected: &[u8]) -> Result<bool, OutOfBounds> {
        Ok(self.bytes(expected.len())? == expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u16_at(data: &[u8], pos: usize) -> Option<u16> {
        ByteCursor::at(data, pos).u16().ok()
    }

    fn u32_at(data: &[u8], pos: usize) -> Option<u32> {
        ByteCursor::at(data, pos).u32().ok()
    }

    #[test]
    fn reads_little_endian_fields() {
        let data = [0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 1, 0, 0, 0, 0, 0, 0, 0];
        let mut c = ByteCursor::new(&data);
        assert_eq!(c.u16().unwrap(), 0x1234);
        assert_eq!(c.u32().unwrap(), 0x12345678);
        assert_eq!(c.u64().unwrap(), 1);
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn out_of_bounds_does_not_advance() {
        let data = [1u8, 2, 3];
        let mut c = ByteCursor::new(&data);
        let err = c.u32().unwrap_err();
        assert_eq!(
            err,
            OutOfBounds {
                offset: 0,
                needed: 4,
                len: 3
            }
        );
        assert_eq!(c.position(), 0);
        assert_eq!(c.bytes(2).unwrap(), &[1, 2]);
        assert!(c.skip(2).is_err());
        assert!(c.skip(1).is_ok());
    }

    #[test]
    fn cursor_past_end() {
        let data = [0u8; 4];
        let c = ByteCursor::at(&data, 10);
        assert_eq!(c.remaining(), 0);
        assert_eq!(u16_at(&data, 3), None);
        assert_eq!(u32_at(&data, 0), Some(0));
    }

    #[test]
    fn signature_check() {
        let mut c = ByteCursor::new(b"PK\x01\x02rest");
        assert!(c.signature(b"PK\x01\x02").unwrap());
        assert!(!c.signature(b"PK\x01\x02").unwrap());
    }
}
