use thiserror::Error;

/// Names the part of a device response a decode failure points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseField {
    ResponseLength,
    TimeStamp,
    CommandId,
    PathwayState,
    TestState,
    Result,
    TestTime,
    ErrorMessage,
}

impl ResponseField {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseField::ResponseLength => "response_length",
            ResponseField::TimeStamp => "time_stamp",
            ResponseField::CommandId => "command_id",
            ResponseField::PathwayState => "pathway_state",
            ResponseField::TestState => "test_state",
            ResponseField::Result => "result",
            ResponseField::TestTime => "test_time",
            ResponseField::ErrorMessage => "error_message",
        }
    }
}

impl std::fmt::Display for ResponseField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A response that does not match the expected wire layout.
///
/// Carries the raw bytes alongside the failing field so a protocol drift on
/// the firmware side can be diagnosed from the error alone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("response truncated at {field}: need {needed} bytes, got {got} (raw: {raw:02x?})")]
    Truncated {
        field: ResponseField,
        needed: usize,
        got: usize,
        raw: Vec<u8>,
    },
    #[error("unknown {field} code {code} (raw: {raw:02x?})")]
    UnknownCode {
        field: ResponseField,
        code: u16,
        raw: Vec<u8>,
    },
}

impl DecodeError {
    /// The field the decoder was reading when it failed.
    pub fn field(&self) -> ResponseField {
        match self {
            DecodeError::Truncated { field, .. } | DecodeError::UnknownCode { field, .. } => *field,
        }
    }
}

#[derive(Error, Debug)]
pub enum PathwayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection timeout")]
    Timeout,
    #[error("Cannot establish connection to {address}: {reason}")]
    Connect { address: String, reason: String },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Malformed response: {0}")]
    Decode(#[from] DecodeError),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}
