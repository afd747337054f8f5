//! Frame headers for the TrEE generic service.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use thiserror::Error;

use super::constants::{INPUT_HEADER_SIZE, OUTPUT_HEADER_SIZE};

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Generic service input header (16 bytes / 0x10).
///
/// Precedes the command bytes on the first submission and the RPC answer on
/// every later one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct InputHeader {
    pub frame_type: u32,
    /// Common to a command and all of its RPC responses.
    pub key: u32,
    /// Bytes of meaningful payload; the frame itself is usually larger.
    pub input_data_size: u32,
    /// Bytes the sender expects back.
    pub output_data_size: u32,
}

impl InputHeader {
    pub const SIZE: usize = INPUT_HEADER_SIZE;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        self.write_into(&mut buf);
        buf
    }

    /// Serialize into the first `SIZE` bytes of `dst`.
    pub fn encode_into(&self, dst: &mut [u8]) -> Result<(), HeaderError> {
        if dst.len() < Self::SIZE {
            return Err(HeaderError::BufferTooSmall {
                expected: Self::SIZE,
                actual: dst.len(),
            });
        }
        let mut cursor = Cursor::new(&mut dst[..Self::SIZE]);
        cursor.write_u32::<LittleEndian>(self.frame_type)?;
        cursor.write_u32::<LittleEndian>(self.key)?;
        cursor.write_u32::<LittleEndian>(self.input_data_size)?;
        cursor.write_u32::<LittleEndian>(self.output_data_size)?;
        Ok(())
    }

    fn write_into(&self, buf: &mut Vec<u8>) {
        // Writes into a Vec cannot fail.
        let _ = buf.write_u32::<LittleEndian>(self.frame_type);
        let _ = buf.write_u32::<LittleEndian>(self.key);
        let _ = buf.write_u32::<LittleEndian>(self.input_data_size);
        let _ = buf.write_u32::<LittleEndian>(self.output_data_size);
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < Self::SIZE {
            return Err(HeaderError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        Ok(Self {
            frame_type: cursor.read_u32::<LittleEndian>()?,
            key: cursor.read_u32::<LittleEndian>()?,
            input_data_size: cursor.read_u32::<LittleEndian>()?,
            output_data_size: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// Generic service output header (8 bytes).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct OutputHeader {
    pub frame_type: u32,
    /// RPC type chosen by the TA. Meaningless on completion.
    pub rpc_type: u32,
}

impl OutputHeader {
    pub const SIZE: usize = OUTPUT_HEADER_SIZE;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        let _ = buf.write_u32::<LittleEndian>(self.frame_type);
        let _ = buf.write_u32::<LittleEndian>(self.rpc_type);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < Self::SIZE {
            return Err(HeaderError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        Ok(Self {
            frame_type: cursor.read_u32::<LittleEndian>()?,
            rpc_type: cursor.read_u32::<LittleEndian>()?,
        })
    }
}
