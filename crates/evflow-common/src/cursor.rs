use crate::types::FlowError;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

/// Archive headers, sub-files and file tails are padded to this.
pub const SECTOR_SIZE: u32 = 0x800;
/// Label targets and strings start on this boundary.
pub const CODE_ALIGNMENT: u32 = 8;

pub fn align_up(value: u32, alignment: u32) -> u32 {
    match value % alignment {
        0 => value,
        rest => value + (alignment - rest),
    }
}

/// Read side of the codec: a position over a borrowed byte slice.
pub struct ByteCursor<'a> {
    inner: Cursor<&'a [u8]>,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            inner: Cursor::new(data),
        }
    }

    pub fn at(data: &'a [u8], position: u32) -> Self {
        let mut cursor = Self::new(data);
        cursor.seek(position);
        cursor
    }

    pub fn data(&self) -> &'a [u8] {
        *self.inner.get_ref()
    }

    pub fn len(&self) -> u32 {
        self.inner.get_ref().len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.inner.get_ref().is_empty()
    }

    pub fn position(&self) -> u32 {
        self.inner.position() as u32
    }

    pub fn seek(&mut self, position: u32) {
        self.inner.set_position(position as u64);
    }

    pub fn is_at_end(&self) -> bool {
        self.position() >= self.len()
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.data().get(self.position() as usize).copied()
    }

    pub fn read_u8(&mut self) -> Result<u8, FlowError> {
        let at = self.position();
        self.inner.read_u8().map_err(|_| FlowError::UnexpectedEof(at))
    }

    pub fn read_u16_le(&mut self) -> Result<u16, FlowError> {
        let at = self.position();
        self.inner
            .read_u16::<LittleEndian>()
            .map_err(|_| FlowError::UnexpectedEof(at))
    }

    pub fn read_u16_be(&mut self) -> Result<u16, FlowError> {
        let at = self.position();
        self.inner
            .read_u16::<BigEndian>()
            .map_err(|_| FlowError::UnexpectedEof(at))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, FlowError> {
        let at = self.position();
        self.inner
            .read_u32::<LittleEndian>()
            .map_err(|_| FlowError::UnexpectedEof(at))
    }

    pub fn read_u32_be(&mut self) -> Result<u32, FlowError> {
        let at = self.position();
        self.inner
            .read_u32::<BigEndian>()
            .map_err(|_| FlowError::UnexpectedEof(at))
    }

    /// Reads a little-endian u32 at `offset` without moving.
    pub fn u32_le_at(&self, offset: u32) -> Result<u32, FlowError> {
        ByteCursor::at(self.data(), offset).read_u32_le()
    }
}

/// Write side: an owned buffer that grows on demand and can be
/// overwritten in place (header copies, back-patching).
#[derive(Default)]
pub struct ByteWriter {
    inner: Cursor<Vec<u8>>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from existing bytes, positioned at the end.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let end = bytes.len() as u64;
        let mut inner = Cursor::new(bytes);
        inner.set_position(end);
        Self { inner }
    }

    pub fn position(&self) -> u32 {
        self.inner.position() as u32
    }

    pub fn seek(&mut self, position: u32) {
        self.inner.set_position(position as u64);
    }

    pub fn len(&self) -> u32 {
        self.inner.get_ref().len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.inner.get_ref().is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.inner.get_ref()
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), FlowError> {
        Ok(self.inner.write_u8(value)?)
    }

    pub fn write_u16_le(&mut self, value: u16) -> Result<(), FlowError> {
        Ok(self.inner.write_u16::<LittleEndian>(value)?)
    }

    pub fn write_u16_be(&mut self, value: u16) -> Result<(), FlowError> {
        Ok(self.inner.write_u16::<BigEndian>(value)?)
    }

    pub fn write_u32_le(&mut self, value: u32) -> Result<(), FlowError> {
        Ok(self.inner.write_u32::<LittleEndian>(value)?)
    }

    pub fn write_u32_be(&mut self, value: u32) -> Result<(), FlowError> {
        Ok(self.inner.write_u32::<BigEndian>(value)?)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), FlowError> {
        Ok(self.inner.write_all(bytes)?)
    }

    /// Overwrites a little-endian u32 at `offset`, leaving the position alone.
    pub fn patch_u32_le(&mut self, offset: u32, value: u32) -> Result<(), FlowError> {
        let back = self.position();
        self.seek(offset);
        self.write_u32_le(value)?;
        self.seek(back);
        Ok(())
    }

    pub fn patch_u16_le(&mut self, offset: u32, value: u16) -> Result<(), FlowError> {
        let back = self.position();
        self.seek(offset);
        self.write_u16_le(value)?;
        self.seek(back);
        Ok(())
    }

    /// Zero-fills from the current position up to the next multiple of `alignment`.
    pub fn pad_to(&mut self, alignment: u32) -> Result<(), FlowError> {
        let target = align_up(self.position(), alignment);
        while self.position() < target {
            self.write_u8(0)?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(0x801, SECTOR_SIZE), 0x1000);
    }

    #[test]
    fn test_mixed_endianness_reads() {
        let data = [0xFF, 0x01, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_u16_be().unwrap(), 0xFF01);
        assert_eq!(cursor.read_u16_le().unwrap(), 0x1234);
        assert_eq!(cursor.read_u32_le().unwrap(), 0x12345678);
        assert!(cursor.is_at_end());
        assert!(matches!(cursor.read_u8(), Err(FlowError::UnexpectedEof(8))));
    }

    #[test]
    fn test_patch_keeps_position() {
        let mut writer = ByteWriter::new();
        writer.write_u32_le(0).unwrap();
        writer.write_u8(0xFF).unwrap();
        writer.patch_u32_le(0, 0xDEADBEEF).unwrap();
        assert_eq!(writer.position(), 5);
        writer.pad_to(CODE_ALIGNMENT).unwrap();
        assert_eq!(hex::encode(writer.into_inner()), "efbeaddeff000000");
    }
}
