//! RPC relay.

use crate::error::InvokeError;
use crate::events::{TeeEvent, TeeObserver};
use crate::rpc::RpcHandler;
use crate::state::machine::{Transaction, TransactionState};
use tracing::error;

use super::HandleResult;

/// RpcCommand - pass the TA's request to `rpc` and stage its answer.
///
/// The handler reads from the output frame payload and writes into the input
/// frame payload. On success the input frame is re-tagged as an RPC response
/// under the same key, ready to be submitted again.
pub fn handle_rpc<O, H>(
    txn: &mut Transaction<'_, O>,
    bytes_written: usize,
    rpc: Option<&mut H>,
) -> Result<HandleResult, InvokeError>
where
    O: TeeObserver + ?Sized,
    H: RpcHandler + ?Sized,
{
    let key = txn.key();
    let rpc_type = txn.output().rpc_type();

    let Some(handler) = rpc else {
        error!(key = %key, rpc_type = %format!("{:#x}", rpc_type), "RPC request with no handler");
        return Err(InvokeError::MissingRpcHandler { rpc_type });
    };

    let input_len = txn.output().payload(bytes_written).len();
    txn.emit(TeeEvent::RpcDispatched {
        key,
        rpc_type,
        input_len,
    });

    let (input_frame, output_frame) = txn.frames_mut();
    let rpc_input = output_frame.payload(bytes_written);
    let rpc_output = input_frame.rpc_output_mut();
    let capacity = rpc_output.len();

    let written = handler
        .handle(rpc_type, rpc_input, rpc_output)
        .map_err(|source| InvokeError::RpcFailed { rpc_type, source })?;
    if written > capacity {
        return Err(InvokeError::RpcOutputOverflow {
            rpc_type,
            written,
            capacity,
        });
    }
    input_frame.prepare_rpc_response(written)?;

    txn.emit(TeeEvent::RpcAnswered {
        key,
        rpc_type,
        output_len: written,
    });
    txn.goto_state(TransactionState::Submitted);
    Ok(HandleResult::Resubmit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::key::TransactionKey;
    use crate::protocol::*;
    use crate::rpc::RpcError;

    fn rpc_txn<'o>(observer: &'o NullObserver, rpc_type: u32, payload: &[u8]) -> Transaction<'o, NullObserver> {
        let mut txn = Transaction::begin(TransactionKey::from_raw(0x42), b"command", 32, observer).unwrap();
        let (_, out) = txn.frames_mut();
        let header = OutputHeader {
            frame_type: OUTPUT_TYPE_RPC_COMMAND,
            rpc_type,
        };
        out.as_mut_bytes()[..OUTPUT_HEADER_SIZE].copy_from_slice(&header.to_bytes());
        out.as_mut_bytes()[OUTPUT_HEADER_SIZE..OUTPUT_HEADER_SIZE + payload.len()].copy_from_slice(payload);
        txn.goto_state(TransactionState::RpcPending);
        txn
    }

    #[test]
    fn test_relay_stages_answer() {
        let observer = NullObserver;
        let mut txn = rpc_txn(&observer, 3, &[9; 20]);
        let mut seen = None;
        let mut handler = |ty: u32, input: &[u8], output: &mut [u8]| {
            seen = Some((ty, input.len(), output.len()));
            output[..8].copy_from_slice(b"answered");
            Ok::<usize, RpcError>(8)
        };

        let result = handle_rpc(&mut txn, OUTPUT_HEADER_SIZE + 20, Some(&mut handler)).unwrap();
        assert_eq!(result, HandleResult::Resubmit);
        assert_eq!(seen, Some((3, 20, MAX_RPC_OUTPUT_SIZE)));

        let header = txn.input().header();
        assert_eq!(header.frame_type, INPUT_TYPE_RPC_RESPONSE);
        assert_eq!(header.key, 0x42);
        assert_eq!(header.input_data_size, 8);
        assert_eq!(header.output_data_size, MAX_RPC_OUTPUT_SIZE as u32);
        assert_eq!(txn.input().data(), b"answered");
        assert_eq!(txn.state(), TransactionState::Submitted);
    }

    #[test]
    fn test_missing_handler() {
        let observer = NullObserver;
        let mut txn = rpc_txn(&observer, 5, &[]);
        let err = handle_rpc::<_, dyn RpcHandler>(&mut txn, OUTPUT_HEADER_SIZE, None).unwrap_err();
        assert!(matches!(err, InvokeError::MissingRpcHandler { rpc_type: 5 }));
        assert_eq!(txn.input().frame_type(), Some(InputType::Command));
    }

    #[test]
    fn test_handler_failure_leaves_frame_untouched() {
        let observer = NullObserver;
        let mut txn = rpc_txn(&observer, 6, &[1, 2]);
        let mut handler = |ty: u32, _: &[u8], _: &mut [u8]| Err::<usize, RpcError>(RpcError::Unsupported { rpc_type: ty });

        let err = handle_rpc(&mut txn, OUTPUT_HEADER_SIZE + 2, Some(&mut handler)).unwrap_err();
        assert!(matches!(err, InvokeError::RpcFailed { rpc_type: 6, .. }));
        assert_eq!(txn.input().frame_type(), Some(InputType::Command));
        assert_eq!(txn.state(), TransactionState::RpcPending);
    }

    #[test]
    fn test_handler_overstating_length() {
        let observer = NullObserver;
        let mut txn = rpc_txn(&observer, 1, &[]);
        let mut handler = |_: u32, _: &[u8], output: &mut [u8]| Ok::<usize, RpcError>(output.len() + 1);

        let err = handle_rpc(&mut txn, OUTPUT_HEADER_SIZE, Some(&mut handler)).unwrap_err();
        assert!(matches!(err, InvokeError::RpcOutputOverflow { .. }));
    }
}
