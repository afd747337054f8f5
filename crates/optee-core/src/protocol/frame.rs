//! Typed input/output frames.
//!
//! A frame is one owned header-plus-payload buffer handed to the driver.
//! Both frames are sized up front so that any RPC the TA issues fits without
//! reallocation, and the input frame is reused in place for every RPC answer.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use super::constants::*;
use super::header::{HeaderError, InputHeader, OutputHeader};

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Failed to allocate {size} byte frame")]
    AllocationFailed { size: usize },

    #[error("{what} of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge {
        what: &'static str,
        size: usize,
        limit: usize,
    },

    #[error("Header error: {0}")]
    Header(#[from] HeaderError),
}

/// Input frame type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    Command,
    RpcResponse,
}

impl InputType {
    pub const fn as_u32(self) -> u32 {
        match self {
            InputType::Command => INPUT_TYPE_COMMAND,
            InputType::RpcResponse => INPUT_TYPE_RPC_RESPONSE,
        }
    }

    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            INPUT_TYPE_COMMAND => Some(InputType::Command),
            INPUT_TYPE_RPC_RESPONSE => Some(InputType::RpcResponse),
            _ => None,
        }
    }
}

/// Output frame type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    CommandCompleted,
    RpcCommand,
}

impl OutputType {
    pub const fn as_u32(self) -> u32 {
        match self {
            OutputType::CommandCompleted => OUTPUT_TYPE_COMMAND_COMPLETED,
            OutputType::RpcCommand => OUTPUT_TYPE_RPC_COMMAND,
        }
    }

    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            OUTPUT_TYPE_COMMAND_COMPLETED => Some(OutputType::CommandCompleted),
            OUTPUT_TYPE_RPC_COMMAND => Some(OutputType::RpcCommand),
            _ => None,
        }
    }
}

fn allocate_zeroed(size: usize) -> Result<Vec<u8>, FrameError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| FrameError::AllocationFailed { size })?;
    buf.resize(size, 0);
    Ok(buf)
}

fn wire_size(what: &'static str, size: usize) -> Result<u32, FrameError> {
    u32::try_from(size).map_err(|_| FrameError::PayloadTooLarge {
        what,
        size,
        limit: u32::MAX as usize,
    })
}

/// Frame sent to the driver: input header followed by command or RPC bytes.
///
/// Invariant: `len() >= MIN_COMMAND_INPUT_SIZE`.
#[derive(Debug)]
pub struct InputFrame {
    buf: Vec<u8>,
}

impl InputFrame {
    const TYPE_OFFSET: usize = 0;
    const KEY_OFFSET: usize = 4;
    const INPUT_SIZE_OFFSET: usize = 8;
    const OUTPUT_SIZE_OFFSET: usize = 12;

    /// Build the frame for a new command.
    ///
    /// The frame is `max(header + input, MIN_COMMAND_INPUT_SIZE)` bytes.
    pub fn for_command(key: u32, input: &[u8], output_capacity: usize) -> Result<Self, FrameError> {
        let input_data_size = wire_size("Command input", input.len())?;
        let output_data_size = wire_size("Command output", output_capacity)?;

        let size = (INPUT_HEADER_SIZE + input.len()).max(MIN_COMMAND_INPUT_SIZE);
        let mut buf = allocate_zeroed(size)?;

        InputHeader {
            frame_type: InputType::Command.as_u32(),
            key,
            input_data_size,
            output_data_size,
        }
        .encode_into(&mut buf)?;
        buf[INPUT_HEADER_SIZE..INPUT_HEADER_SIZE + input.len()].copy_from_slice(input);

        Ok(Self { buf })
    }

    /// Re-tag the frame as the answer to an RPC, after `written` bytes were
    /// placed in [`rpc_output_mut`](Self::rpc_output_mut). The key is kept.
    pub fn prepare_rpc_response(&mut self, written: usize) -> Result<(), FrameError> {
        if written > MAX_RPC_OUTPUT_SIZE {
            return Err(FrameError::PayloadTooLarge {
                what: "RPC output",
                size: written,
                limit: MAX_RPC_OUTPUT_SIZE,
            });
        }
        self.write_field(Self::TYPE_OFFSET, InputType::RpcResponse.as_u32());
        self.write_field(Self::INPUT_SIZE_OFFSET, written as u32);
        self.write_field(Self::OUTPUT_SIZE_OFFSET, MAX_RPC_OUTPUT_SIZE as u32);
        Ok(())
    }

    /// Region the RPC handler writes its answer into.
    pub fn rpc_output_mut(&mut self) -> &mut [u8] {
        &mut self.buf[INPUT_HEADER_SIZE..INPUT_HEADER_SIZE + MAX_RPC_OUTPUT_SIZE]
    }

    pub fn header(&self) -> InputHeader {
        InputHeader {
            frame_type: self.read_field(Self::TYPE_OFFSET),
            key: self.key(),
            input_data_size: self.input_data_size(),
            output_data_size: self.output_data_size(),
        }
    }

    pub fn frame_type(&self) -> Option<InputType> {
        InputType::from_u32(self.read_field(Self::TYPE_OFFSET))
    }

    pub fn key(&self) -> u32 {
        self.read_field(Self::KEY_OFFSET)
    }

    pub fn input_data_size(&self) -> u32 {
        self.read_field(Self::INPUT_SIZE_OFFSET)
    }

    pub fn output_data_size(&self) -> u32 {
        self.read_field(Self::OUTPUT_SIZE_OFFSET)
    }

    /// Meaningful payload bytes, as declared by `InputDataSize`.
    pub fn data(&self) -> &[u8] {
        let payload = &self.buf[INPUT_HEADER_SIZE..];
        let len = (self.input_data_size() as usize).min(payload.len());
        &payload[..len]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn read_field(&self, offset: usize) -> u32 {
        LittleEndian::read_u32(&self.buf[offset..offset + 4])
    }

    fn write_field(&mut self, offset: usize, value: u32) {
        LittleEndian::write_u32(&mut self.buf[offset..offset + 4], value);
    }
}

/// Frame filled by the driver: output header followed by result or RPC bytes.
///
/// Invariant: `len() >= MIN_COMMAND_OUTPUT_SIZE`.
#[derive(Debug)]
pub struct OutputFrame {
    buf: Vec<u8>,
}

impl OutputFrame {
    /// Allocate `max(header + capacity, MIN_COMMAND_OUTPUT_SIZE)` bytes.
    pub fn for_capacity(output_capacity: usize) -> Result<Self, FrameError> {
        wire_size("Command output", output_capacity)?;
        let size = OUTPUT_HEADER_SIZE
            .saturating_add(output_capacity)
            .max(MIN_COMMAND_OUTPUT_SIZE);
        Ok(Self {
            buf: allocate_zeroed(size)?,
        })
    }

    pub fn header(&self) -> Result<OutputHeader, HeaderError> {
        OutputHeader::from_bytes(&self.buf)
    }

    pub fn raw_type(&self) -> u32 {
        LittleEndian::read_u32(&self.buf[0..4])
    }

    pub fn frame_type(&self) -> Option<OutputType> {
        OutputType::from_u32(self.raw_type())
    }

    pub fn rpc_type(&self) -> u32 {
        LittleEndian::read_u32(&self.buf[4..8])
    }

    /// Payload actually produced, given the driver's reported bytes-written.
    ///
    /// Never extends past the end of the frame.
    pub fn payload(&self, bytes_written: usize) -> &[u8] {
        let payload = &self.buf[OUTPUT_HEADER_SIZE..];
        let len = bytes_written
            .saturating_sub(OUTPUT_HEADER_SIZE)
            .min(payload.len());
        &payload[..len]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_command_rounds_up() {
        let frame = InputFrame::for_command(9, &[1, 2, 3, 4], 64).unwrap();
        assert_eq!(frame.len(), MIN_COMMAND_INPUT_SIZE);
        assert_eq!(frame.frame_type(), Some(InputType::Command));
        assert_eq!(frame.key(), 9);
        assert_eq!(frame.input_data_size(), 4);
        assert_eq!(frame.output_data_size(), 64);
        assert_eq!(frame.data(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_large_command_keeps_exact_size() {
        let input = vec![0xAB; 20 * 1024];
        let frame = InputFrame::for_command(1, &input, 0).unwrap();
        assert_eq!(frame.len(), INPUT_HEADER_SIZE + input.len());
        assert_eq!(frame.data(), &input[..]);
    }

    #[test]
    fn test_empty_command() {
        let frame = InputFrame::for_command(1, &[], 0).unwrap();
        assert_eq!(frame.len(), MIN_COMMAND_INPUT_SIZE);
        assert!(frame.data().is_empty());
    }

    #[test]
    fn test_prepare_rpc_response_keeps_key() {
        let mut frame = InputFrame::for_command(0x55AA, b"cmd", 16).unwrap();
        frame.rpc_output_mut()[..2].copy_from_slice(b"ok");
        frame.prepare_rpc_response(2).unwrap();

        let header = frame.header();
        assert_eq!(header.frame_type, INPUT_TYPE_RPC_RESPONSE);
        assert_eq!(header.key, 0x55AA);
        assert_eq!(header.input_data_size, 2);
        assert_eq!(header.output_data_size, MAX_RPC_OUTPUT_SIZE as u32);
        assert_eq!(frame.data(), b"ok");
    }

    #[test]
    fn test_prepare_rpc_response_rejects_overflow() {
        let mut frame = InputFrame::for_command(1, &[], 0).unwrap();
        assert!(matches!(
            frame.prepare_rpc_response(MAX_RPC_OUTPUT_SIZE + 1),
            Err(FrameError::PayloadTooLarge { .. })
        ));
        assert_eq!(frame.frame_type(), Some(InputType::Command));
    }

    #[test]
    fn test_output_frame_sizes() {
        assert_eq!(OutputFrame::for_capacity(64).unwrap().len(), MIN_COMMAND_OUTPUT_SIZE);
        assert_eq!(
            OutputFrame::for_capacity(64 * 1024).unwrap().len(),
            OUTPUT_HEADER_SIZE + 64 * 1024
        );
    }

    #[test]
    fn test_output_payload_is_bounded() {
        let mut frame = OutputFrame::for_capacity(0).unwrap();
        frame.as_mut_bytes()[..4].copy_from_slice(&OUTPUT_TYPE_COMMAND_COMPLETED.to_le_bytes());
        assert_eq!(frame.frame_type(), Some(OutputType::CommandCompleted));
        assert_eq!(frame.payload(OUTPUT_HEADER_SIZE + 40).len(), 40);
        assert_eq!(frame.payload(4).len(), 0);
        assert_eq!(frame.payload(usize::MAX).len(), frame.len() - OUTPUT_HEADER_SIZE);
    }

    #[test]
    fn test_unknown_type_tags() {
        assert_eq!(OutputType::from_u32(0), None);
        assert_eq!(OutputType::from_u32(0xCAAACAAC), None);
        assert_eq!(InputType::from_u32(0xCDCDCDCE), Some(InputType::RpcResponse));
    }
}
