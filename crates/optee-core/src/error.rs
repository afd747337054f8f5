//! Invocation error type.

use thiserror::Error;

use crate::protocol::FrameError;
use crate::rpc::RpcError;
use crate::transport::TransportError;

/// Why a command invocation failed.
///
/// Every variant aborts the transaction; no output is returned.
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Unrecognized output frame type {value:#010X}")]
    UnknownResponseType { value: u32 },

    #[error("RPC {rpc_type:#x} requested but no RPC handler was supplied")]
    MissingRpcHandler { rpc_type: u32 },

    #[error("RPC handler failed for type {rpc_type:#x}: {source}")]
    RpcFailed {
        rpc_type: u32,
        #[source]
        source: RpcError,
    },

    #[error("RPC handler for type {rpc_type:#x} wrote {written} bytes into a {capacity} byte buffer")]
    RpcOutputOverflow {
        rpc_type: u32,
        written: usize,
        capacity: usize,
    },
}
