//! Device-control transport abstraction.
//!
//! Defines the `TeeDevice` / `ServiceChannel` traits the invocation core
//! submits frames through, allowing different implementations
//! (Win32 device handle, mock, etc.).

use crate::protocol::RESPONSE_ENVELOPE_SIZE;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open device {path}: {message}")]
    OpenFailed { path: String, message: String },

    #[error("Failed to create completion event (error {code})")]
    SignalCreationFailed { code: u32 },

    #[error("Device control submission failed (error {code})")]
    SubmitFailed { code: u32 },

    #[error("Waiting for completion failed (error {code})")]
    WaitFailed { code: u32 },

    #[error("Frame of {size} bytes is too large to submit")]
    FrameTooLarge { size: usize },

    #[error("Response envelope is {actual} bytes, expected {expected}")]
    ResponseSizeMismatch { expected: usize, actual: usize },

    #[error("Driver reported {bytes_written} bytes written, expected at least {minimum}")]
    ResponseTooShort { bytes_written: u64, minimum: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fixed response envelope: one little-endian `BytesWritten` field.
pub type ResponseEnvelope = [u8; RESPONSE_ENVELOPE_SIZE];

/// One execute-function request: the frame pair for a single round-trip.
#[derive(Debug)]
pub struct ServiceRequest<'a> {
    pub function_code: u32,
    /// Input frame, read by the driver.
    pub input: &'a [u8],
    /// Output frame, filled by the driver.
    pub output: &'a mut [u8],
}

/// A per-invocation submission path to the driver.
///
/// Owns the completion signal used to wait on overlapped requests, so it is
/// created at the start of an invocation and dropped at its end.
pub trait ServiceChannel {
    /// Submit one request and block until the driver completes it.
    ///
    /// Returns the number of bytes the driver placed in `response`.
    fn execute(
        &mut self,
        request: ServiceRequest<'_>,
        response: &mut ResponseEnvelope,
    ) -> Result<usize, TransportError>;
}

/// Abstract TrEE service device.
///
/// The device handle is shared between concurrent invocations; each one
/// opens its own channel.
pub trait TeeDevice: Send + Sync {
    type Channel<'a>: ServiceChannel
    where
        Self: 'a;

    /// Acquire a channel (and its completion signal) for one invocation.
    fn open_channel(&self) -> Result<Self::Channel<'_>, TransportError>;
}
