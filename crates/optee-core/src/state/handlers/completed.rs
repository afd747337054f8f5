//! Command completion.

use crate::error::InvokeError;
use crate::events::{TeeEvent, TeeObserver};
use crate::state::machine::{Transaction, TransactionState};

use super::HandleResult;

/// CommandCompleted - copy the result into `output`.
///
/// The reported size is clamped to the caller's declared capacity; anything
/// beyond it is discarded.
pub fn handle_completed<O: TeeObserver + ?Sized>(
    txn: &mut Transaction<'_, O>,
    bytes_written: usize,
    output: &mut [u8],
) -> Result<HandleResult, InvokeError> {
    let capacity = txn.output_capacity().min(output.len());
    let payload = txn.output().payload(bytes_written);
    let output_len = payload.len().min(capacity);
    if output_len > 0 {
        output[..output_len].copy_from_slice(&payload[..output_len]);
    }

    txn.goto_state(TransactionState::Completed);
    txn.emit(TeeEvent::Completed {
        key: txn.key(),
        output_len,
        round_trips: txn.round_trips(),
    });
    Ok(HandleResult::Complete { output_len })
}
