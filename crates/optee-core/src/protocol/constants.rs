//! Protocol constants for the TrEE generic service.
//!
//! Derived from the `TrEEGenService.h` frame layout exchanged with the
//! OP-TEE miniport through `IOCTL_TR_EXECUTE_FUNCTION`.

// ============================================================================
// Frame Type Tags
// ============================================================================

/// Input frame: a new command for the TA.
pub const INPUT_TYPE_COMMAND: u32 = 0xCDCDCDCD;

/// Input frame: the answer to an RPC the TA issued mid-command.
pub const INPUT_TYPE_RPC_RESPONSE: u32 = INPUT_TYPE_COMMAND + 1;

/// Output frame: the TA function has completed.
pub const OUTPUT_TYPE_COMMAND_COMPLETED: u32 = 0xCAAACAAA;

/// Output frame: the TA made an RPC and awaits a response.
pub const OUTPUT_TYPE_RPC_COMMAND: u32 = OUTPUT_TYPE_COMMAND_COMPLETED + 1;

// ============================================================================
// Size Constants
// ============================================================================

/// Input header: Type, Key, InputDataSize, OutputDataSize (4 DWORDs).
pub const INPUT_HEADER_SIZE: usize = 16;

/// Output header: Type, RpcType (2 DWORDs).
pub const OUTPUT_HEADER_SIZE: usize = 8;

/// Largest RPC transfer in either direction, header included.
pub const RPC_PAYLOAD_MAX_SIZE: usize = 12 * 1024;

/// Largest RPC request the TA can place after an output header.
pub const MAX_RPC_INPUT_SIZE: usize = RPC_PAYLOAD_MAX_SIZE - OUTPUT_HEADER_SIZE;

/// Largest RPC answer we can place after an input header.
pub const MAX_RPC_OUTPUT_SIZE: usize = RPC_PAYLOAD_MAX_SIZE - INPUT_HEADER_SIZE;

/// Smallest input frame: must hold the largest RPC answer.
pub const MIN_COMMAND_INPUT_SIZE: usize = INPUT_HEADER_SIZE + MAX_RPC_OUTPUT_SIZE;

/// Smallest output frame: must hold the largest RPC request.
pub const MIN_COMMAND_OUTPUT_SIZE: usize = OUTPUT_HEADER_SIZE + MAX_RPC_INPUT_SIZE;

/// Response envelope: a single `BytesWritten` field (u64).
pub const RESPONSE_ENVELOPE_SIZE: usize = 8;

// ============================================================================
// Device Control
// ============================================================================

pub const FILE_DEVICE_UNKNOWN: u32 = 0x0000_0022;
pub const METHOD_BUFFERED: u32 = 0;
pub const FILE_ANY_ACCESS: u32 = 0;

/// Build a device-control code the way `CTL_CODE` does.
#[inline]
pub const fn ctl_code(device_type: u32, function: u32, method: u32, access: u32) -> u32 {
    (device_type << 16) | (access << 14) | (function << 2) | method
}

/// Function number of the execute-function request.
pub const TR_EXECUTE_FUNCTION: u32 = 0x801;

/// Default `IOCTL_TR_EXECUTE_FUNCTION` code. Overridable through `ClientConfig`.
pub const IOCTL_TR_EXECUTE_FUNCTION: u32 = ctl_code(
    FILE_DEVICE_UNKNOWN,
    TR_EXECUTE_FUNCTION,
    METHOD_BUFFERED,
    FILE_ANY_ACCESS,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_frames_hold_max_rpc() {
        assert_eq!(MIN_COMMAND_INPUT_SIZE, RPC_PAYLOAD_MAX_SIZE);
        assert_eq!(MIN_COMMAND_OUTPUT_SIZE, RPC_PAYLOAD_MAX_SIZE);
        assert!(MIN_COMMAND_INPUT_SIZE - INPUT_HEADER_SIZE >= MAX_RPC_OUTPUT_SIZE);
        assert!(MIN_COMMAND_OUTPUT_SIZE - OUTPUT_HEADER_SIZE >= MAX_RPC_INPUT_SIZE);
    }

    #[test]
    fn test_ctl_code_layout() {
        assert_eq!(ctl_code(FILE_DEVICE_UNKNOWN, 0x800, METHOD_BUFFERED, FILE_ANY_ACCESS), 0x0022_2000);
        assert_eq!(IOCTL_TR_EXECUTE_FUNCTION, 0x0022_2004);
    }
}
