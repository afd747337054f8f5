//! Command invocation - drives one TA function call to completion.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::InvokeError;
use crate::events::{TeeEvent, TeeObserver, TracingObserver};
use crate::key::TransactionKey;
use crate::protocol::IOCTL_TR_EXECUTE_FUNCTION;
use crate::rpc::RpcHandler;
use crate::state::handlers::{HandleResult, handle_response};
use crate::state::machine::Transaction;
use crate::transport::{TeeDevice, submit};

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Path of the TrEE service device.
    pub device_path: Option<String>,
    /// Device-control code of the execute-function request.
    pub ioctl_code: u32,
    /// Output buffer size used when none is given.
    pub output_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            device_path: None,
            ioctl_code: IOCTL_TR_EXECUTE_FUNCTION,
            output_capacity: 4096,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// A TA function call: function code plus opaque input bytes.
#[derive(Debug, Clone, Copy)]
pub struct CommandRequest<'a> {
    pub function_code: u32,
    pub input: &'a [u8],
}

impl<'a> CommandRequest<'a> {
    pub fn new(function_code: u32, input: &'a [u8]) -> Self {
        Self {
            function_code,
            input,
        }
    }
}

/// Invokes TA functions on a shared device.
///
/// Each call runs on the calling thread and blocks until the TA completes or
/// the invocation fails. Concurrent calls on one invoker are independent:
/// every call has its own key, frames and completion signal.
pub struct CommandInvoker<D: TeeDevice, O: TeeObserver = TracingObserver> {
    device: D,
    observer: Arc<O>,
}

impl<D: TeeDevice> CommandInvoker<D, TracingObserver> {
    /// Create an invoker that logs through tracing.
    pub fn new(device: D) -> Self {
        Self::with_observer(device, Arc::new(TracingObserver))
    }
}

impl<D: TeeDevice, O: TeeObserver> CommandInvoker<D, O> {
    /// Create an invoker with a custom observer.
    pub fn with_observer(device: D, observer: Arc<O>) -> Self {
        Self { device, observer }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Invoke a function that is not expected to issue RPCs.
    ///
    /// Returns the number of bytes written to `output`. Any RPC from the TA
    /// fails the call.
    pub fn invoke(&self, request: &CommandRequest<'_>, output: &mut [u8]) -> Result<usize, InvokeError> {
        self.run::<dyn RpcHandler>(request, output, None)
    }

    /// Invoke a function, answering its RPCs with `handler`.
    pub fn invoke_with_rpc<H: RpcHandler + ?Sized>(
        &self,
        request: &CommandRequest<'_>,
        output: &mut [u8],
        handler: &mut H,
    ) -> Result<usize, InvokeError> {
        self.run(request, output, Some(handler))
    }

    #[instrument(
        skip_all,
        fields(
            function_code = %format!("{:#x}", request.function_code),
            input_len = request.input.len(),
            output_capacity = output.len()
        )
    )]
    fn run<H: RpcHandler + ?Sized>(
        &self,
        request: &CommandRequest<'_>,
        output: &mut [u8],
        mut rpc: Option<&mut H>,
    ) -> Result<usize, InvokeError> {
        let key = TransactionKey::generate();
        let observer = self.observer.as_ref();
        let fail = |e: InvokeError| {
            observer.on_event(&TeeEvent::Failed {
                key,
                message: e.to_string(),
            });
            e
        };

        let mut txn = Transaction::begin(key, request.input, output.len(), observer)
            .map_err(|e| fail(e.into()))?;
        txn.emit(TeeEvent::TransactionStarted {
            key,
            function_code: request.function_code,
            input_len: request.input.len(),
            output_capacity: output.len(),
        });

        let mut channel = match self.device.open_channel() {
            Ok(channel) => channel,
            Err(e) => {
                txn.fail();
                return Err(fail(e.into()));
            }
        };

        loop {
            txn.record_submission();
            let (input_frame, output_frame) = txn.frames_mut();
            let bytes_written = match submit(&mut channel, request.function_code, input_frame, output_frame) {
                Ok(n) => n,
                Err(e) => {
                    txn.fail();
                    return Err(fail(e.into()));
                }
            };

            match handle_response(&mut txn, bytes_written, output, rpc.as_deref_mut()) {
                Ok(HandleResult::Complete { output_len }) => return Ok(output_len),
                Ok(HandleResult::Resubmit) => continue,
                Err(e) => {
                    txn.fail();
                    return Err(fail(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::protocol::*;
    use crate::rpc::RpcError;
    use crate::transport::{MockDevice, MockReply, TransportError};

    fn invoker(mock: &MockDevice) -> CommandInvoker<MockDevice, NullObserver> {
        CommandInvoker::with_observer(mock.clone(), Arc::new(NullObserver))
    }

    #[test]
    fn test_direct_completion() {
        let mock = MockDevice::new();
        mock.queue_reply(MockReply::completed(b"result"));

        let mut output = [0u8; 16];
        let n = invoker(&mock)
            .invoke(&CommandRequest::new(0x20, b"input"), &mut output)
            .unwrap();

        assert_eq!(n, 6);
        assert_eq!(&output[..6], b"result");

        let submissions = mock.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].function_code, 0x20);
        assert_eq!(submissions[0].input.len(), MIN_COMMAND_INPUT_SIZE);
        assert_eq!(submissions[0].output_len, MIN_COMMAND_OUTPUT_SIZE);
        let header = submissions[0].header();
        assert_eq!(header.frame_type, INPUT_TYPE_COMMAND);
        assert_eq!(header.input_data_size, 5);
        assert_eq!(header.output_data_size, 16);
        assert_eq!(&submissions[0].input[INPUT_HEADER_SIZE..INPUT_HEADER_SIZE + 5], b"input");
    }

    #[test]
    fn test_rpc_round_trips_share_key() {
        let mock = MockDevice::new();
        mock.queue_reply(MockReply::rpc(1, b"first"));
        mock.queue_reply(MockReply::rpc(2, b"second"));
        mock.queue_reply(MockReply::completed(b"ok"));

        let mut calls = Vec::new();
        let mut handler = |ty: u32, input: &[u8], output: &mut [u8]| {
            calls.push((ty, input.to_vec()));
            output[0] = ty as u8;
            Ok::<usize, RpcError>(1)
        };

        let mut output = [0u8; 4];
        let n = invoker(&mock)
            .invoke_with_rpc(&CommandRequest::new(1, &[]), &mut output, &mut handler)
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(calls, vec![(1, b"first".to_vec()), (2, b"second".to_vec())]);

        let headers: Vec<_> = mock.submissions().iter().map(|s| s.header()).collect();
        assert_eq!(headers.len(), 3);
        assert!(headers.iter().all(|h| h.key == headers[0].key));
        assert_eq!(headers[1].frame_type, INPUT_TYPE_RPC_RESPONSE);
        assert_eq!(headers[2].input_data_size, 1);
        assert_eq!(headers[2].output_data_size, MAX_RPC_OUTPUT_SIZE as u32);
    }

    #[test]
    fn test_channel_failure_after_allocation() {
        let mock = MockDevice::new();
        mock.fail_next_channel(1450);

        let mut output = [0u8; 4];
        let err = invoker(&mock)
            .invoke(&CommandRequest::new(1, &[]), &mut output)
            .unwrap_err();
        assert!(matches!(
            err,
            InvokeError::Transport(TransportError::SignalCreationFailed { code: 1450 })
        ));
        assert_eq!(mock.submission_count(), 0);
    }

    #[test]
    fn test_each_invocation_gets_a_new_key() {
        let mock = MockDevice::new();
        mock.queue_reply(MockReply::completed(&[]));
        mock.queue_reply(MockReply::completed(&[]));

        let invoker = invoker(&mock);
        let mut output = [0u8; 0];
        invoker.invoke(&CommandRequest::new(1, &[]), &mut output).unwrap();
        invoker.invoke(&CommandRequest::new(1, &[]), &mut output).unwrap();

        let submissions = mock.submissions();
        assert_ne!(submissions[0].header().key, submissions[1].header().key);
        assert_eq!(mock.channels_opened(), 2);
        assert_eq!(mock.channels_closed(), 2);
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let dir = std::env::temp_dir().join(format!("optee-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("client.toml");

        let config = ClientConfig {
            device_path: Some(r"\\.\TrEEGenService".to_string()),
            ioctl_code: 0x0022_2008,
            output_capacity: 512,
        };
        config.save_to_file(&path).unwrap();
        let loaded = ClientConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.device_path, config.device_path);
        assert_eq!(loaded.ioctl_code, 0x0022_2008);
        assert_eq!(loaded.output_capacity, 512);

        std::fs::write(&path, "output_capacity = 64\n").unwrap();
        let partial = ClientConfig::load_from_file(&path).unwrap();
        assert_eq!(partial.ioctl_code, IOCTL_TR_EXECUTE_FUNCTION);
        assert!(partial.device_path.is_none());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
