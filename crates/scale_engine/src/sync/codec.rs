use thiserror::Error;

use crate::identifier::Identifier;

pub const MAX_STRING_LEN: usize = 32767;

const VAR_U32_MAX_BYTES: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("unexpected end of packet: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd { needed: usize, remaining: usize },
    #[error("varint is longer than 5 bytes")]
    VarIntTooLong,
    #[error("string of {len} bytes exceeds the 32767 byte limit")]
    StringTooLong { len: usize },
    #[error("invalid UTF-8 string in packet")]
    InvalidUtf8,
    #[error("invalid identifier in packet: {raw}")]
    InvalidIdentifier { raw: String },
    #[error("packet has {count} unexpected trailing bytes")]
    TrailingBytes { count: usize },
    #[error("modifier count {count} exceeds remaining packet length")]
    TooManyModifiers { count: u32 },
}

#[derive(Debug, Default, Clone)]
pub struct PacketWriter {
    bytes: Vec<u8>,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_f32(&mut self, value: f32) {
        self.bytes.extend_from_slice(&value.to_bits().to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_var_u32(&mut self, mut value: u32) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.bytes.push(byte);
                return;
            }
            self.bytes.push(byte | 0x80);
        }
    }

    pub fn write_string(&mut self, value: &str) -> Result<(), WireError> {
        let bytes = value.as_bytes();
        if bytes.len() > MAX_STRING_LEN {
            return Err(WireError::StringTooLong { len: bytes.len() });
        }
        self.write_var_u32(bytes.len() as u32);
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }

    pub fn write_identifier(&mut self, id: &Identifier) -> Result<(), WireError> {
        self.write_string(&id.to_string())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    pub fn read_f32(&mut self) -> Result<f32, WireError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_var_u32(&mut self) -> Result<u32, WireError> {
        let mut value = 0u32;
        for index in 0..VAR_U32_MAX_BYTES {
            let byte = self.read_exact(1)?[0];
            value |= u32::from(byte & 0x7f) << (7 * index);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(WireError::VarIntTooLong)
    }

    pub fn read_string(&mut self) -> Result<String, WireError> {
        let len = self.read_var_u32()? as usize;
        if len > MAX_STRING_LEN {
            return Err(WireError::StringTooLong { len });
        }
        let raw = self.read_exact(len)?;
        std::str::from_utf8(raw)
            .map(str::to_string)
            .map_err(|_| WireError::InvalidUtf8)
    }

    pub fn read_identifier(&mut self) -> Result<Identifier, WireError> {
        let raw = self.read_string()?;
        Identifier::parse(&raw).map_err(|_| WireError::InvalidIdentifier { raw })
    }

    pub fn finish(self) -> Result<(), WireError> {
        match self.remaining() {
            0 => Ok(()),
            count => Err(WireError::TrailingBytes { count }),
        }
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_exact(N)?);
        Ok(out)
    }

    fn read_exact(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let end = self.cursor.saturating_add(len);
        if end > self.bytes.len() {
            return Err(WireError::UnexpectedEnd {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let out = &self.bytes[self.cursor..end];
        self.cursor = end;
        Ok(out)
    }
}
