//! Frame submission and response envelope validation.

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, instrument};

use super::traits::{ResponseEnvelope, ServiceChannel, ServiceRequest, TransportError};
use crate::protocol::{InputFrame, OUTPUT_HEADER_SIZE, OutputFrame, RESPONSE_ENVELOPE_SIZE};

/// Submit the frame pair and wait for the driver.
///
/// Returns the bytes-written value reported in the response envelope, which
/// is always at least one output header.
#[instrument(level = "debug", skip(channel, input, output), fields(key = input.key()))]
pub fn submit<C: ServiceChannel + ?Sized>(
    channel: &mut C,
    function_code: u32,
    input: &InputFrame,
    output: &mut OutputFrame,
) -> Result<usize, TransportError> {
    let mut envelope: ResponseEnvelope = [0; RESPONSE_ENVELOPE_SIZE];
    let request = ServiceRequest {
        function_code,
        input: input.as_bytes(),
        output: output.as_mut_bytes(),
    };

    let returned = channel.execute(request, &mut envelope)?;
    if returned != RESPONSE_ENVELOPE_SIZE {
        return Err(TransportError::ResponseSizeMismatch {
            expected: RESPONSE_ENVELOPE_SIZE,
            actual: returned,
        });
    }

    let bytes_written = LittleEndian::read_u64(&envelope);
    if bytes_written < OUTPUT_HEADER_SIZE as u64 {
        return Err(TransportError::ResponseTooShort {
            bytes_written,
            minimum: OUTPUT_HEADER_SIZE,
        });
    }

    debug!(bytes_written, "Submission complete");
    Ok(usize::try_from(bytes_written).unwrap_or(usize::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OutputType;
    use crate::transport::mock::{MockDevice, MockReply};
    use crate::transport::traits::TeeDevice;

    fn frames() -> (InputFrame, OutputFrame) {
        (
            InputFrame::for_command(3, b"hello", 32).unwrap(),
            OutputFrame::for_capacity(32).unwrap(),
        )
    }

    #[test]
    fn test_submit_returns_bytes_written() {
        let mock = MockDevice::new();
        mock.queue_reply(MockReply::completed(&[7; 12]));
        let (input, mut output) = frames();

        let mut channel = mock.open_channel().unwrap();
        let written = submit(&mut channel, 0x10, &input, &mut output).unwrap();

        assert_eq!(written, OUTPUT_HEADER_SIZE + 12);
        assert_eq!(output.frame_type(), Some(OutputType::CommandCompleted));
        assert_eq!(mock.submissions()[0].function_code, 0x10);
    }

    #[test]
    fn test_submit_rejects_wrong_envelope_size() {
        let mock = MockDevice::new();
        mock.queue_reply(MockReply::completed(&[]).with_envelope_len(4));
        let (input, mut output) = frames();

        let mut channel = mock.open_channel().unwrap();
        let err = submit(&mut channel, 0, &input, &mut output).unwrap_err();
        assert!(matches!(
            err,
            TransportError::ResponseSizeMismatch {
                expected: 8,
                actual: 4
            }
        ));
    }

    #[test]
    fn test_submit_rejects_short_bytes_written() {
        let mock = MockDevice::new();
        mock.queue_reply(MockReply::completed(&[]).with_bytes_written(7));
        let (input, mut output) = frames();

        let mut channel = mock.open_channel().unwrap();
        let err = submit(&mut channel, 0, &input, &mut output).unwrap_err();
        assert!(matches!(err, TransportError::ResponseTooShort { bytes_written: 7, .. }));
    }

    #[test]
    fn test_submit_propagates_driver_error() {
        let mock = MockDevice::new();
        mock.queue_reply(MockReply::SubmitError(31));
        let (input, mut output) = frames();

        let mut channel = mock.open_channel().unwrap();
        let err = submit(&mut channel, 0, &input, &mut output).unwrap_err();
        assert!(matches!(err, TransportError::SubmitFailed { code: 31 }));
    }
}
