//! Mock TrEE device for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use byteorder::{ByteOrder, LittleEndian};

use super::traits::{ResponseEnvelope, ServiceChannel, ServiceRequest, TeeDevice, TransportError};
use crate::protocol::{
    InputHeader, OUTPUT_TYPE_COMMAND_COMPLETED, OUTPUT_TYPE_RPC_COMMAND, OutputHeader,
    RESPONSE_ENVELOPE_SIZE,
};

/// Win32 `ERROR_NO_MORE_ITEMS`, returned once the reply queue runs dry.
pub const MOCK_QUEUE_EXHAUSTED: u32 = 259;

/// One scripted driver reaction to a submission.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Fill the output frame and the response envelope.
    Frame {
        /// Bytes copied to the start of the output frame (header included).
        frame: Vec<u8>,
        /// `BytesWritten` reported in the envelope.
        bytes_written: u64,
        /// Length the driver claims to have written into the envelope.
        envelope_len: usize,
    },
    /// `DeviceIoControl` fails outright.
    SubmitError(u32),
    /// The request went pending and the wait failed.
    WaitError(u32),
}

impl MockReply {
    /// Output frame with an arbitrary type tag.
    pub fn raw(frame_type: u32, rpc_type: u32, payload: &[u8]) -> Self {
        let mut frame = OutputHeader {
            frame_type,
            rpc_type,
        }
        .to_bytes();
        frame.extend_from_slice(payload);
        Self::Frame {
            bytes_written: frame.len() as u64,
            frame,
            envelope_len: RESPONSE_ENVELOPE_SIZE,
        }
    }

    /// The TA finished and returned `payload`.
    pub fn completed(payload: &[u8]) -> Self {
        Self::raw(OUTPUT_TYPE_COMMAND_COMPLETED, 0, payload)
    }

    /// The TA issued RPC `rpc_type` with `payload` as its input.
    pub fn rpc(rpc_type: u32, payload: &[u8]) -> Self {
        Self::raw(OUTPUT_TYPE_RPC_COMMAND, rpc_type, payload)
    }

    /// Override the reported `BytesWritten`.
    pub fn with_bytes_written(mut self, value: u64) -> Self {
        if let Self::Frame { bytes_written, .. } = &mut self {
            *bytes_written = value;
        }
        self
    }

    /// Override the envelope length returned by the device-control call.
    pub fn with_envelope_len(mut self, value: usize) -> Self {
        if let Self::Frame { envelope_len, .. } = &mut self {
            *envelope_len = value;
        }
        self
    }
}

/// A captured submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub function_code: u32,
    /// Copy of the whole input frame.
    pub input: Vec<u8>,
    /// Size of the output frame offered to the driver.
    pub output_len: usize,
}

impl Submission {
    pub fn header(&self) -> InputHeader {
        InputHeader::from_bytes(&self.input).unwrap_or_default()
    }
}

/// Mock device for unit testing the invocation logic.
#[derive(Clone, Default)]
pub struct MockDevice {
    /// Queued replies, consumed one per submission.
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    /// Captured submissions.
    submissions: Arc<Mutex<Vec<Submission>>>,
    /// Error code for the next `open_channel`, if it should fail.
    channel_failure: Arc<Mutex<Option<u32>>>,
    channels_opened: Arc<Mutex<usize>>,
    channels_closed: Arc<Mutex<usize>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next submission.
    pub fn queue_reply(&self, reply: MockReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Make the next `open_channel` fail as if event creation failed.
    pub fn fail_next_channel(&self, code: u32) {
        *self.channel_failure.lock().unwrap() = Some(code);
    }

    /// Get all captured submissions.
    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    /// Replies that were queued but never consumed.
    pub fn pending_replies(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    pub fn channels_opened(&self) -> usize {
        *self.channels_opened.lock().unwrap()
    }

    pub fn channels_closed(&self) -> usize {
        *self.channels_closed.lock().unwrap()
    }
}

impl TeeDevice for MockDevice {
    type Channel<'a> = MockChannel<'a>;

    fn open_channel(&self) -> Result<MockChannel<'_>, TransportError> {
        if let Some(code) = self.channel_failure.lock().unwrap().take() {
            return Err(TransportError::SignalCreationFailed { code });
        }
        *self.channels_opened.lock().unwrap() += 1;
        Ok(MockChannel { device: self })
    }
}

/// Channel handed out by [`MockDevice`].
pub struct MockChannel<'a> {
    device: &'a MockDevice,
}

impl ServiceChannel for MockChannel<'_> {
    fn execute(
        &mut self,
        request: ServiceRequest<'_>,
        response: &mut ResponseEnvelope,
    ) -> Result<usize, TransportError> {
        self.device.submissions.lock().unwrap().push(Submission {
            function_code: request.function_code,
            input: request.input.to_vec(),
            output_len: request.output.len(),
        });

        let reply = self
            .device
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(TransportError::SubmitFailed {
                code: MOCK_QUEUE_EXHAUSTED,
            })?;

        match reply {
            MockReply::Frame {
                frame,
                bytes_written,
                envelope_len,
            } => {
                let n = frame.len().min(request.output.len());
                request.output[..n].copy_from_slice(&frame[..n]);
                LittleEndian::write_u64(response, bytes_written);
                Ok(envelope_len)
            }
            MockReply::SubmitError(code) => Err(TransportError::SubmitFailed { code }),
            MockReply::WaitError(code) => Err(TransportError::WaitFailed { code }),
        }
    }
}

impl Drop for MockChannel<'_> {
    fn drop(&mut self) {
        *self.device.channels_closed.lock().unwrap() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OUTPUT_HEADER_SIZE;

    #[test]
    fn test_mock_reply_queue() {
        let mock = MockDevice::new();
        mock.queue_reply(MockReply::rpc(5, b"abc"));
        mock.queue_reply(MockReply::completed(b"done"));

        let mut channel = mock.open_channel().unwrap();
        let mut output = vec![0u8; 64];
        let mut envelope = [0u8; RESPONSE_ENVELOPE_SIZE];

        let n = channel
            .execute(
                ServiceRequest {
                    function_code: 1,
                    input: b"in",
                    output: &mut output,
                },
                &mut envelope,
            )
            .unwrap();
        assert_eq!(n, RESPONSE_ENVELOPE_SIZE);
        assert_eq!(LittleEndian::read_u64(&envelope), (OUTPUT_HEADER_SIZE + 3) as u64);
        let header = OutputHeader::from_bytes(&output).unwrap();
        assert_eq!(header.frame_type, OUTPUT_TYPE_RPC_COMMAND);
        assert_eq!(header.rpc_type, 5);
        assert_eq!(mock.pending_replies(), 1);
    }

    #[test]
    fn test_mock_exhausted_queue() {
        let mock = MockDevice::new();
        let mut channel = mock.open_channel().unwrap();
        let mut output = [0u8; 16];
        let mut envelope = [0u8; RESPONSE_ENVELOPE_SIZE];

        let err = channel
            .execute(
                ServiceRequest {
                    function_code: 0,
                    input: &[],
                    output: &mut output,
                },
                &mut envelope,
            )
            .unwrap_err();
        assert!(matches!(err, TransportError::SubmitFailed { code: MOCK_QUEUE_EXHAUSTED }));
        assert_eq!(mock.submission_count(), 1);
    }

    #[test]
    fn test_mock_channel_lifecycle() {
        let mock = MockDevice::new();
        {
            let _channel = mock.open_channel().unwrap();
            assert_eq!(mock.channels_opened(), 1);
            assert_eq!(mock.channels_closed(), 0);
        }
        assert_eq!(mock.channels_closed(), 1);

        mock.fail_next_channel(8);
        assert!(matches!(
            mock.open_channel(),
            Err(TransportError::SignalCreationFailed { code: 8 })
        ));
        assert_eq!(mock.channels_opened(), 1);
        assert!(mock.open_channel().is_ok());
    }
}
