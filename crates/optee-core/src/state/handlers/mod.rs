//! Response handlers - what to do with each output frame type.
//!
//! - `completed`: copy the command result out to the caller
//! - `rpc`: relay a TA RPC to the caller's handler and re-tag the input frame

mod completed;
mod rpc;

use crate::error::InvokeError;
use crate::events::{TeeEvent, TeeObserver};
use crate::protocol::OutputType;
use crate::rpc::RpcHandler;
use crate::state::machine::{Transaction, TransactionState};
use tracing::warn;

pub use completed::handle_completed;
pub use rpc::handle_rpc;

/// Result of handling one driver response.
#[derive(Debug, PartialEq, Eq)]
pub enum HandleResult {
    /// The command completed with this many output bytes.
    Complete { output_len: usize },
    /// An RPC was answered; submit the input frame again.
    Resubmit,
}

/// Classify the output frame and act on it.
///
/// `bytes_written` has already been validated by the transport.
pub fn handle_response<O, H>(
    txn: &mut Transaction<'_, O>,
    bytes_written: usize,
    output: &mut [u8],
    rpc: Option<&mut H>,
) -> Result<HandleResult, InvokeError>
where
    O: TeeObserver + ?Sized,
    H: RpcHandler + ?Sized,
{
    let raw_type = txn.output().raw_type();
    txn.emit(TeeEvent::ResponseReceived {
        key: txn.key(),
        raw_type,
        bytes_written,
    });

    match OutputType::from_u32(raw_type) {
        Some(OutputType::CommandCompleted) => handle_completed(txn, bytes_written, output),
        Some(OutputType::RpcCommand) => {
            txn.goto_state(TransactionState::RpcPending);
            handle_rpc(txn, bytes_written, rpc)
        }
        None => {
            warn!(key = %txn.key(), raw_type = %format!("{:#010X}", raw_type), "Unknown output frame type");
            Err(InvokeError::UnknownResponseType { value: raw_type })
        }
    }
}
