//! Event system for transaction diagnostics.
//!
//! Allows callers to watch command invocations (submissions, RPCs,
//! completion, failure) without tying the core to a particular log sink.

use std::fmt;

use crate::key::TransactionKey;
use crate::protocol::InputType;

/// Events emitted while a command is in flight.
#[derive(Debug, Clone)]
pub enum TeeEvent {
    /// Frames allocated, about to submit the command.
    TransactionStarted {
        key: TransactionKey,
        function_code: u32,
        input_len: usize,
        output_capacity: usize,
    },
    /// An input frame is being handed to the driver.
    Submitted {
        key: TransactionKey,
        round_trip: u32,
        input_type: InputType,
    },
    /// The driver returned an output frame.
    ResponseReceived {
        key: TransactionKey,
        raw_type: u32,
        bytes_written: usize,
    },
    /// An RPC request is being passed to the caller's handler.
    RpcDispatched {
        key: TransactionKey,
        rpc_type: u32,
        input_len: usize,
    },
    /// The handler answered an RPC.
    RpcAnswered {
        key: TransactionKey,
        rpc_type: u32,
        output_len: usize,
    },
    /// The TA function completed.
    Completed {
        key: TransactionKey,
        output_len: usize,
        round_trips: u32,
    },
    /// The invocation failed.
    Failed { key: TransactionKey, message: String },
    /// Both frames were released.
    Released { key: TransactionKey, round_trips: u32 },
}

impl fmt::Display for TeeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeeEvent::TransactionStarted { key, function_code, .. } => {
                write!(f, "[{key}] start function {function_code:#x}")
            }
            TeeEvent::Submitted { key, round_trip, input_type } => {
                write!(f, "[{key}] submit #{round_trip} ({input_type:?})")
            }
            TeeEvent::ResponseReceived { key, raw_type, bytes_written } => {
                write!(f, "[{key}] response {raw_type:#010x}, {bytes_written} bytes")
            }
            TeeEvent::RpcDispatched { key, rpc_type, input_len } => {
                write!(f, "[{key}] RPC {rpc_type:#x} in={input_len}")
            }
            TeeEvent::RpcAnswered { key, rpc_type, output_len } => {
                write!(f, "[{key}] RPC {rpc_type:#x} out={output_len}")
            }
            TeeEvent::Completed { key, output_len, round_trips } => {
                write!(f, "[{key}] completed, {output_len} bytes after {round_trips} submissions")
            }
            TeeEvent::Failed { key, message } => write!(f, "[{key}] failed: {message}"),
            TeeEvent::Released { key, .. } => write!(f, "[{key}] released"),
        }
    }
}

/// Observer trait for receiving transaction events.
///
/// Implementations are shared across threads invoking on the same device.
pub trait TeeObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &TeeEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl TeeObserver for NullObserver {
    fn on_event(&self, _event: &TeeEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl TeeObserver for TracingObserver {
    fn on_event(&self, event: &TeeEvent) {
        match event {
            TeeEvent::TransactionStarted {
                key,
                function_code,
                input_len,
                output_capacity,
            } => {
                tracing::debug!(
                    key = %key,
                    function_code = %format!("{:#x}", function_code),
                    input_len,
                    output_capacity,
                    "Invoking TA function"
                );
            }
            TeeEvent::Submitted {
                key,
                round_trip,
                input_type,
            } => {
                tracing::trace!(key = %key, round_trip, input_type = ?input_type, "Submitting frame");
            }
            TeeEvent::ResponseReceived {
                key,
                raw_type,
                bytes_written,
            } => {
                tracing::trace!(
                    key = %key,
                    raw_type = %format!("{:#010X}", raw_type),
                    bytes_written,
                    "Response received"
                );
            }
            TeeEvent::RpcDispatched {
                key,
                rpc_type,
                input_len,
            } => {
                tracing::debug!(key = %key, rpc_type = %format!("{:#x}", rpc_type), input_len, "RPC request");
            }
            TeeEvent::RpcAnswered {
                key,
                rpc_type,
                output_len,
            } => {
                tracing::debug!(key = %key, rpc_type = %format!("{:#x}", rpc_type), output_len, "RPC answered");
            }
            TeeEvent::Completed {
                key,
                output_len,
                round_trips,
            } => {
                tracing::debug!(key = %key, output_len, round_trips, "Command completed");
            }
            TeeEvent::Failed { key, message } => {
                tracing::error!(key = %key, "Command failed: {}", message);
            }
            TeeEvent::Released { key, round_trips } => {
                tracing::trace!(key = %key, round_trips, "Frames released");
            }
        }
    }
}
