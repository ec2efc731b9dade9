use log::trace;

use crate::error::{DecodeError, PathwayError, ResponseField};
use crate::types::{Command, PathwayState, Response, ResultCode, TestState, TestTime};

// Fixed byte offsets of the response record
pub const LENGTH_OFFSET: usize = 0;
pub const TIMESTAMP_OFFSET: usize = 4;
pub const COMMAND_OFFSET: usize = 8;
pub const SYSTEM_STATE_OFFSET: usize = 9;
pub const TEST_STATE_OFFSET: usize = 10;
pub const RESULT_OFFSET: usize = 11;
pub const TEST_TIME_OFFSET: usize = 13;
pub const ERROR_MESSAGE_OFFSET: usize = 17;

/// Element count of a response that carries no error message. Anything above
/// this means bytes 17+ hold the message text.
pub const BARE_RESPONSE_ELEMENTS: u32 = 13;

/// Pack a 32-bit word into its wire image.
///
/// The firmware assembles each word by splitting the MSB-first bit pattern
/// into four bytes and then transmitting those bytes in reversed order. This
/// two-stage construction is what the device expects on the wire; keep it,
/// don't restate it through an endianness helper.
pub fn pack_u32(value: u32) -> [u8; 4] {
    let mut word = [0u8; 4];
    for (i, byte) in word.iter_mut().enumerate() {
        let mut packed = 0u8;
        for bit in 0..8 {
            packed = (packed << 1) | (((value >> (31 - (8 * i + bit))) & 1) as u8);
        }
        *byte = packed;
    }
    word.reverse();
    word
}

/// Inverse of [`pack_u32`]: walk the wire bytes in reversed order and drain
/// each byte MSB-first back into the word.
pub fn unpack_u32(word: [u8; 4]) -> u32 {
    let mut value = 0u32;
    for &byte in word.iter().rev() {
        for bit in (0..8).rev() {
            value = (value << 1) | u32::from((byte >> bit) & 1);
        }
    }
    value
}

/// Two-byte variant of [`pack_u32`], used for the result field.
pub fn pack_u16(value: u16) -> [u8; 2] {
    let mut word = [0u8; 2];
    for (i, byte) in word.iter_mut().enumerate() {
        let mut packed = 0u8;
        for bit in 0..8 {
            packed = (packed << 1) | (((value >> (15 - (8 * i + bit))) & 1) as u8);
        }
        *byte = packed;
    }
    word.reverse();
    word
}

/// Two-byte variant of [`unpack_u32`].
pub fn unpack_u16(word: [u8; 2]) -> u16 {
    let mut value = 0u16;
    for &byte in word.iter().rev() {
        for bit in (0..8).rev() {
            value = (value << 1) | u16::from((byte >> bit) & 1);
        }
    }
    value
}

/// Encode an outbound command frame.
///
/// Layout: `[length][timestamp][command][protocol?]` where the length prefix
/// counts the elements that follow it - 5 for a bare command, 9 when a
/// protocol number is attached. `timestamp` is epoch seconds, captured by the
/// caller at encode time.
///
/// # Errors
/// `InvalidArgument` when `TEST_PROGRAM` is encoded without a positive
/// protocol number. A number passed with any other command is ignored.
pub fn encode_command(
    command: Command,
    protocol_number: Option<u32>,
    timestamp: u32,
) -> Result<Vec<u8>, PathwayError> {
    let protocol_number = match (command, protocol_number) {
        (Command::TestProgram, None) => {
            return Err(PathwayError::InvalidArgument(
                "TEST_PROGRAM command requires a protocol number".to_string(),
            ));
        }
        (Command::TestProgram, Some(0)) => {
            return Err(PathwayError::InvalidArgument(
                "protocol number must be positive".to_string(),
            ));
        }
        (Command::TestProgram, Some(number)) => Some(number),
        _ => None,
    };

    let mut elements = Vec::with_capacity(9);
    elements.extend_from_slice(&pack_u32(timestamp));
    elements.push(command.code());
    if let Some(number) = protocol_number {
        elements.extend_from_slice(&pack_u32(number));
    }

    let mut frame = Vec::with_capacity(4 + elements.len());
    frame.extend_from_slice(&pack_u32(elements.len() as u32));
    frame.extend_from_slice(&elements);

    trace!("encoded {command} frame: {frame:02x?}");
    Ok(frame)
}

/// Extract a fixed-width field, failing with the field name and the full raw
/// buffer when the response is too short to hold it.
fn field_bytes<const N: usize>(
    data: &[u8],
    offset: usize,
    field: ResponseField,
) -> Result<[u8; N], DecodeError> {
    match data.get(offset..offset + N) {
        Some(slice) => {
            let mut bytes = [0u8; N];
            bytes.copy_from_slice(slice);
            Ok(bytes)
        }
        None => Err(DecodeError::Truncated {
            field,
            needed: offset + N,
            got: data.len(),
            raw: data.to_vec(),
        }),
    }
}

/// Decode a raw response buffer into a [`Response`].
///
/// Every field is extracted at its fixed offset; the record is only built
/// once all of them parsed, so callers never see a partial response. The
/// error message is extracted only when the device claims more than
/// [`BARE_RESPONSE_ELEMENTS`] elements - otherwise the field is genuinely
/// absent, not empty.
pub fn decode_response(data: &[u8]) -> Result<Response, DecodeError> {
    let response_length = unpack_u32(field_bytes::<4>(
        data,
        LENGTH_OFFSET,
        ResponseField::ResponseLength,
    )?);
    let time_stamp = unpack_u32(field_bytes::<4>(
        data,
        TIMESTAMP_OFFSET,
        ResponseField::TimeStamp,
    )?);

    let command_byte = field_bytes::<1>(data, COMMAND_OFFSET, ResponseField::CommandId)?[0];
    let command_id = Command::from_code(command_byte).ok_or_else(|| DecodeError::UnknownCode {
        field: ResponseField::CommandId,
        code: u16::from(command_byte),
        raw: data.to_vec(),
    })?;

    let state_byte = field_bytes::<1>(data, SYSTEM_STATE_OFFSET, ResponseField::PathwayState)?[0];
    let pathway_state =
        PathwayState::from_code(state_byte).ok_or_else(|| DecodeError::UnknownCode {
            field: ResponseField::PathwayState,
            code: u16::from(state_byte),
            raw: data.to_vec(),
        })?;

    let test_byte = field_bytes::<1>(data, TEST_STATE_OFFSET, ResponseField::TestState)?[0];
    let test_state = TestState::from_code(test_byte).ok_or_else(|| DecodeError::UnknownCode {
        field: ResponseField::TestState,
        code: u16::from(test_byte),
        raw: data.to_vec(),
    })?;

    let result_code = unpack_u16(field_bytes::<2>(data, RESULT_OFFSET, ResponseField::Result)?);
    let result = ResultCode::from_code(result_code).ok_or_else(|| DecodeError::UnknownCode {
        field: ResponseField::Result,
        code: result_code,
        raw: data.to_vec(),
    })?;

    let test_time = TestTime::from_millis(unpack_u32(field_bytes::<4>(
        data,
        TEST_TIME_OFFSET,
        ResponseField::TestTime,
    )?));

    let error_message = if response_length > BARE_RESPONSE_ELEMENTS {
        match data.get(ERROR_MESSAGE_OFFSET..) {
            Some(tail) if !tail.is_empty() => Some(
                String::from_utf8_lossy(tail)
                    .trim_end_matches('\0')
                    .to_string(),
            ),
            _ => {
                return Err(DecodeError::Truncated {
                    field: ResponseField::ErrorMessage,
                    needed: ERROR_MESSAGE_OFFSET + 1,
                    got: data.len(),
                    raw: data.to_vec(),
                });
            }
        }
    } else {
        None
    };

    Ok(Response {
        response_length,
        time_stamp,
        command_id,
        pathway_state,
        test_state,
        result,
        test_time,
        error_message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{ByteOrder, LittleEndian};

    /// Build a well-formed response buffer the way a stub device would.
    fn response_buf(
        response_length: u32,
        command: Command,
        pathway_state: PathwayState,
        test_state: TestState,
        result: ResultCode,
        test_time_ms: u32,
        error_message: &[u8],
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&pack_u32(response_length));
        buf.extend_from_slice(&pack_u32(1_700_000_000));
        buf.push(command.code());
        buf.push(pathway_state.code());
        buf.push(test_state.code());
        buf.extend_from_slice(&pack_u16(result.code()));
        buf.extend_from_slice(&pack_u32(test_time_ms));
        buf.extend_from_slice(error_message);
        buf
    }

    #[test]
    fn test_word_packing_round_trips() {
        for value in [0u32, 1, 5, 0x0102_0304, 1_700_000_000, u32::MAX] {
            assert_eq!(unpack_u32(pack_u32(value)), value);
        }
        for value in [0u16, 1, 4096, 8192, 16384, u16::MAX] {
            assert_eq!(unpack_u16(pack_u16(value)), value);
        }
    }

    #[test]
    fn test_word_packing_matches_device_byte_images() {
        assert_eq!(pack_u32(5), [5, 0, 0, 0]);
        assert_eq!(pack_u32(0x0102_0304), [4, 3, 2, 1]);
        assert_eq!(pack_u16(4096), [0, 16]);

        // The staged MSB-first split plus byte reversal must land on the
        // exact byte image the firmware reads off the wire.
        for value in [0u32, 9, 100, 0xdead_beef, u32::MAX] {
            let mut reference = [0u8; 4];
            LittleEndian::write_u32(&mut reference, value);
            assert_eq!(pack_u32(value), reference);
        }
    }

    #[test]
    fn test_encode_bare_command() {
        let frame = encode_command(Command::Status, None, 1_700_000_000).unwrap();
        assert_eq!(frame.len(), 9);
        assert_eq!(unpack_u32(frame[0..4].try_into().unwrap()), 5);
        assert_eq!(unpack_u32(frame[4..8].try_into().unwrap()), 1_700_000_000);
        assert_eq!(frame[8], Command::Status.code());
    }

    #[test]
    fn test_encode_test_program_carries_protocol_number() {
        let frame = encode_command(Command::TestProgram, Some(100), 1_700_000_000).unwrap();
        assert_eq!(frame.len(), 13);
        assert_eq!(unpack_u32(frame[0..4].try_into().unwrap()), 9);
        assert_eq!(frame[8], Command::TestProgram.code());
        assert_eq!(unpack_u32(frame[9..13].try_into().unwrap()), 100);
    }

    #[test]
    fn test_encode_test_program_requires_protocol_number() {
        assert!(matches!(
            encode_command(Command::TestProgram, None, 0),
            Err(PathwayError::InvalidArgument(_))
        ));
        assert!(matches!(
            encode_command(Command::TestProgram, Some(0), 0),
            Err(PathwayError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_encode_ignores_protocol_number_for_other_commands() {
        let frame = encode_command(Command::Start, Some(100), 0).unwrap();
        assert_eq!(frame.len(), 9);
        assert_eq!(unpack_u32(frame[0..4].try_into().unwrap()), 5);
    }

    #[test]
    fn test_decode_round_trips_encoded_command() {
        // Synthetic echo: a device response whose command and protocol
        // payload mirror what encode produced.
        let frame = encode_command(Command::TestProgram, Some(42), 1_700_000_000).unwrap();
        let echoed_command = Command::from_code(frame[8]).unwrap();
        let echoed_protocol = unpack_u32(frame[9..13].try_into().unwrap());
        assert_eq!(echoed_command, Command::TestProgram);
        assert_eq!(echoed_protocol, 42);

        let buf = response_buf(
            13,
            echoed_command,
            PathwayState::Ready,
            TestState::Idle,
            ResultCode::Ok,
            0,
            b"",
        );
        let response = decode_response(&buf).unwrap();
        assert_eq!(response.command_id, Command::TestProgram);
        assert_eq!(response.time_stamp, 1_700_000_000);
    }

    #[test]
    fn test_decode_full_record() {
        let buf = response_buf(
            13,
            Command::Status,
            PathwayState::Test,
            TestState::Running,
            ResultCode::SafetyWarning,
            3_661_001,
            b"",
        );
        assert_eq!(buf.len(), 17);

        let response = decode_response(&buf).unwrap();
        assert_eq!(response.response_length, 13);
        assert_eq!(response.pathway_state, PathwayState::Test);
        assert_eq!(response.test_state, TestState::Running);
        assert_eq!(response.result, ResultCode::SafetyWarning);
        assert_eq!(response.test_time.to_string(), "01:01:01.001");
        assert_eq!(response.error_message, None);
    }

    #[test]
    fn test_decode_error_message_present_only_above_bare_length() {
        let buf = response_buf(
            20,
            Command::Start,
            PathwayState::Idle,
            TestState::Idle,
            ResultCode::IllegalState,
            0,
            b"not ready\0\0",
        );
        let response = decode_response(&buf).unwrap();
        assert_eq!(response.error_message.as_deref(), Some("not ready"));

        let bare = response_buf(
            13,
            Command::Start,
            PathwayState::Idle,
            TestState::Idle,
            ResultCode::Ok,
            0,
            b"",
        );
        assert_eq!(decode_response(&bare).unwrap().error_message, None);
    }

    #[test]
    fn test_decode_unknown_command_names_the_field() {
        let mut buf = response_buf(
            13,
            Command::Status,
            PathwayState::Idle,
            TestState::Idle,
            ResultCode::Ok,
            0,
            b"",
        );
        buf[COMMAND_OFFSET] = 0x2a;

        let err = decode_response(&buf).unwrap_err();
        assert_eq!(err.field(), ResponseField::CommandId);
        assert!(matches!(err, DecodeError::UnknownCode { code: 0x2a, .. }));
    }

    #[test]
    fn test_decode_unknown_result_names_the_field() {
        let mut buf = response_buf(
            13,
            Command::Status,
            PathwayState::Idle,
            TestState::Idle,
            ResultCode::Ok,
            0,
            b"",
        );
        buf[RESULT_OFFSET..RESULT_OFFSET + 2].copy_from_slice(&pack_u16(7));

        let err = decode_response(&buf).unwrap_err();
        assert_eq!(err.field(), ResponseField::Result);
    }

    #[test]
    fn test_decode_truncated_buffer_names_the_field() {
        let buf = response_buf(
            13,
            Command::Status,
            PathwayState::Idle,
            TestState::Idle,
            ResultCode::Ok,
            0,
            b"",
        );

        let err = decode_response(&buf[..10]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Truncated {
                field: ResponseField::TestState,
                needed: 11,
                got: 10,
                ..
            }
        ));

        let err = decode_response(&[]).unwrap_err();
        assert_eq!(err.field(), ResponseField::ResponseLength);
    }
}
