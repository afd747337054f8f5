//! OP-TEE Core: client transport for invoking Trusted Application functions.
//!
//! This crate drives the TrEE generic service protocol: a TA function call
//! is submitted to the OP-TEE driver through a single device-control request,
//! and the TA may call back into the normal world (RPC) any number of times
//! before the command completes. Every round-trip reuses the same pair of
//! frames and the same transaction key.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, frame headers, typed input/output frames
//! - **Transport**: Device-control abstraction (Win32, mock) and submission
//! - **State**: Transaction state machine and response handlers
//! - **RPC**: Caller-supplied handler for TA callbacks
//! - **Events**: Observer pattern for diagnostics
//! - **Session**: High-level invoker and client configuration
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(windows)]
//! # fn main() -> anyhow::Result<()> {
//! use optee_core::session::{CommandInvoker, CommandRequest};
//! use optee_core::transport::WindowsDevice;
//! use optee_core::protocol::IOCTL_TR_EXECUTE_FUNCTION;
//!
//! let device = WindowsDevice::open(r"\\.\TrEEGenService", IOCTL_TR_EXECUTE_FUNCTION)?;
//! let invoker = CommandInvoker::new(device);
//!
//! let mut output = [0u8; 256];
//! let n = invoker.invoke(&CommandRequest::new(1, b"ping"), &mut output)?;
//! println!("{:?}", &output[..n]);
//! # Ok(())
//! # }
//! # #[cfg(not(windows))]
//! # fn main() {}
//! ```

pub mod error;
pub mod events;
pub mod key;
pub mod protocol;
pub mod rpc;
pub mod session;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use error::InvokeError;
pub use events::{NullObserver, TeeEvent, TeeObserver, TracingObserver};
pub use key::TransactionKey;
pub use protocol::{FrameError, InputFrame, OutputFrame};
pub use rpc::{RpcError, RpcHandler};
pub use session::{ClientConfig, CommandInvoker, CommandRequest};
pub use state::TransactionState;
pub use transport::{MockDevice, MockReply, TeeDevice, TransportError};
#[cfg(windows)]
pub use transport::WindowsDevice;
