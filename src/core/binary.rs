//! # Binary Codec
//!
//! Cursor-based reader and append-only writer for the binary encoding of
//! primitive values: fixed-width integers, IEEE-754 floats, booleans,
//! length-prefixed strings and length-prefixed arrays.
//!
//! ## Wire Format
//! ```text
//! Boolean  [1]            nonzero = true
//! UInt8    [1]
//! Int16    [2]            byte-order dependent
//! Int32    [4]            byte-order dependent
//! Float    [4]            IEEE-754, swapped as one unit
//! Double   [8]            IEEE-754, swapped as one unit
//! String   [len(4)][len]  len = 0xFFFFFFFF means null
//! Array    [len(4)][...]  len = 0xFFFFFFFF means null (decodes empty)
//! ```
//!
//! Every read validates the remaining width before touching the buffer. On
//! failure the cursor position is unspecified and the reader must be dropped.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{ProtocolError, Result};

/// Length sentinel for null strings and null arrays
pub const NULL_LENGTH: u32 = 0xFFFF_FFFF;

/// Byte order used for every value wider than one byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    LittleEndian,
    BigEndian,
}

/// Decoder over a borrowed byte buffer
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    offset: usize,
    order: ByteOrder,
}

impl<'a> BinaryReader<'a> {
    /// Create a little-endian reader positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_byte_order(data, ByteOrder::LittleEndian)
    }

    pub fn with_byte_order(data: &'a [u8], order: ByteOrder) -> Self {
        Self {
            data,
            offset: 0,
            order,
        }
    }

    /// Current cursor position in bytes from the start of the buffer
    pub fn position(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Switch byte order; only affects subsequent multi-byte reads
    pub fn set_byte_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    pub fn is_little_endian(&self) -> bool {
        self.order == ByteOrder::LittleEndian
    }

    fn ensure(&self, requested: usize) -> Result<()> {
        let remaining = self.remaining();
        if requested > remaining {
            return Err(ProtocolError::DecodeRange {
                requested,
                remaining,
            });
        }
        Ok(())
    }

    /// Borrow the next `len` bytes and advance past them
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len)?;
        let bytes = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    pub fn read_boolean(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut bytes = self.take(1)?;
        Ok(bytes.get_u8())
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let mut bytes = self.take(2)?;
        Ok(match self.order {
            ByteOrder::LittleEndian => bytes.get_i16_le(),
            ByteOrder::BigEndian => bytes.get_i16(),
        })
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut bytes = self.take(2)?;
        Ok(match self.order {
            ByteOrder::LittleEndian => bytes.get_u16_le(),
            ByteOrder::BigEndian => bytes.get_u16(),
        })
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let mut bytes = self.take(4)?;
        Ok(match self.order {
            ByteOrder::LittleEndian => bytes.get_i32_le(),
            ByteOrder::BigEndian => bytes.get_i32(),
        })
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut bytes = self.take(4)?;
        Ok(match self.order {
            ByteOrder::LittleEndian => bytes.get_u32_le(),
            ByteOrder::BigEndian => bytes.get_u32(),
        })
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let mut bytes = self.take(4)?;
        Ok(match self.order {
            ByteOrder::LittleEndian => bytes.get_f32_le(),
            ByteOrder::BigEndian => bytes.get_f32(),
        })
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let mut bytes = self.take(8)?;
        Ok(match self.order {
            ByteOrder::LittleEndian => bytes.get_f64_le(),
            ByteOrder::BigEndian => bytes.get_f64(),
        })
    }

    /// Read a length-prefixed byte string.
    ///
    /// Returns `None` for the null sentinel, which is distinct from an empty
    /// string. The bytes are returned raw; no text validation happens here.
    pub fn read_string(&mut self) -> Result<Option<Vec<u8>>> {
        let length = self.read_u32()?;
        if length == NULL_LENGTH {
            return Ok(None);
        }
        Ok(Some(self.take(length as usize)?.to_vec()))
    }

    /// Read a length-prefixed array, calling `element` once per entry in order.
    ///
    /// A null array decodes to an empty vector.
    pub fn read_array<T, F>(&mut self, mut element: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        let length = self.read_u32()?;
        if length == NULL_LENGTH {
            return Ok(Vec::new());
        }

        // Capacity is bounded by the bytes left; the loop itself is only bounded
        // when every element consumes input, which callers must guarantee.
        let mut items = Vec::with_capacity((length as usize).min(self.remaining()));
        for _ in 0..length {
            items.push(element(self)?);
        }
        Ok(items)
    }
}

/// Encoder appending to an owned buffer
#[derive(Debug, Clone, Default)]
pub struct BinaryWriter {
    buf: BytesMut,
    order: ByteOrder,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_byte_order(order: ByteOrder) -> Self {
        Self {
            buf: BytesMut::new(),
            order,
        }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    pub fn set_byte_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> BytesMut {
        self.buf
    }

    pub fn write_boolean(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_i16(&mut self, value: i16) {
        match self.order {
            ByteOrder::LittleEndian => self.buf.put_i16_le(value),
            ByteOrder::BigEndian => self.buf.put_i16(value),
        }
    }

    pub fn write_u16(&mut self, value: u16) {
        match self.order {
            ByteOrder::LittleEndian => self.buf.put_u16_le(value),
            ByteOrder::BigEndian => self.buf.put_u16(value),
        }
    }

    pub fn write_i32(&mut self, value: i32) {
        match self.order {
            ByteOrder::LittleEndian => self.buf.put_i32_le(value),
            ByteOrder::BigEndian => self.buf.put_i32(value),
        }
    }

    pub fn write_u32(&mut self, value: u32) {
        match self.order {
            ByteOrder::LittleEndian => self.buf.put_u32_le(value),
            ByteOrder::BigEndian => self.buf.put_u32(value),
        }
    }

    pub fn write_f32(&mut self, value: f32) {
        match self.order {
            ByteOrder::LittleEndian => self.buf.put_f32_le(value),
            ByteOrder::BigEndian => self.buf.put_f32(value),
        }
    }

    pub fn write_f64(&mut self, value: f64) {
        match self.order {
            ByteOrder::LittleEndian => self.buf.put_f64_le(value),
            ByteOrder::BigEndian => self.buf.put_f64(value),
        }
    }

    /// Write a length-prefixed byte string, or the null sentinel for `None`
    pub fn write_string(&mut self, value: Option<&[u8]>) -> Result<()> {
        match value {
            None => self.write_u32(NULL_LENGTH),
            Some(bytes) => {
                self.write_u32(encodable_length(bytes.len())?);
                self.buf.put_slice(bytes);
            }
        }
        Ok(())
    }

    /// Write a length-prefixed array, or the null sentinel for `None`
    pub fn write_array<T, F>(&mut self, items: Option<&[T]>, mut element: F) -> Result<()>
    where
        F: FnMut(&mut Self, &T) -> Result<()>,
    {
        let Some(items) = items else {
            self.write_u32(NULL_LENGTH);
            return Ok(());
        };

        self.write_u32(encodable_length(items.len())?);
        for item in items {
            element(self, item)?;
        }
        Ok(())
    }
}

fn encodable_length(len: usize) -> Result<u32> {
    match u32::try_from(len) {
        Ok(length) if length != NULL_LENGTH => Ok(length),
        _ => Err(ProtocolError::OversizedPacket(len)),
    }
}
