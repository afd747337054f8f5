//! RPC capability supplied by the caller.
//!
//! While a command is in flight the TA may call back into the normal world
//! (file access, time, shared memory and so on). The transport does not
//! interpret those requests: it hands each one to an [`RpcHandler`] and
//! sends back whatever the handler writes.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Unsupported RPC type {rpc_type:#x}")]
    Unsupported { rpc_type: u32 },

    #[error("RPC failed: {0}")]
    Failed(String),
}

/// Answers RPC requests issued by the TA during one command.
///
/// Any state the handler needs is owned by the implementor.
pub trait RpcHandler {
    /// Handle one RPC.
    ///
    /// `input` is the request the TA sent. The answer goes into the front of
    /// `output`; return how many bytes were written. Returning an error, or a
    /// length larger than `output.len()`, aborts the whole command.
    fn handle(&mut self, rpc_type: u32, input: &[u8], output: &mut [u8]) -> Result<usize, RpcError>;
}

impl<F> RpcHandler for F
where
    F: FnMut(u32, &[u8], &mut [u8]) -> Result<usize, RpcError>,
{
    fn handle(&mut self, rpc_type: u32, input: &[u8], output: &mut [u8]) -> Result<usize, RpcError> {
        self(rpc_type, input, output)
    }
}
