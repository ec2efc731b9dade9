use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::error::PathwayError;

/// Named commands understood by the Pathway device.
///
/// Each command maps to a stable one-byte code on the wire. Only
/// [`Command::TestProgram`] carries a payload (the 32-bit protocol number of
/// the test program to load).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Status,
    TestProgram,
    Start,
    Pause,
    Trigger,
    Stop,
    Abort,
    Yes,
    No,
}

impl Command {
    /// Wire code of this command.
    pub fn code(self) -> u8 {
        match self {
            Command::Status => 0,
            Command::TestProgram => 1,
            Command::Start => 2,
            Command::Pause => 3,
            Command::Trigger => 4,
            Command::Stop => 5,
            Command::Abort => 6,
            Command::Yes => 7,
            Command::No => 8,
        }
    }

    /// Map a wire code back to a command, `None` for unknown codes.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Command::Status),
            1 => Some(Command::TestProgram),
            2 => Some(Command::Start),
            3 => Some(Command::Pause),
            4 => Some(Command::Trigger),
            5 => Some(Command::Stop),
            6 => Some(Command::Abort),
            7 => Some(Command::Yes),
            8 => Some(Command::No),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Command::Status => "STATUS",
            Command::TestProgram => "TEST_PROGRAM",
            Command::Start => "START",
            Command::Pause => "PAUSE",
            Command::Trigger => "TRIGGER",
            Command::Stop => "STOP",
            Command::Abort => "ABORT",
            Command::Yes => "YES",
            Command::No => "NO",
        }
    }
}

impl std::str::FromStr for Command {
    type Err = PathwayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STATUS" => Ok(Command::Status),
            "TEST_PROGRAM" => Ok(Command::TestProgram),
            "START" => Ok(Command::Start),
            "PAUSE" => Ok(Command::Pause),
            "TRIGGER" => Ok(Command::Trigger),
            "STOP" => Ok(Command::Stop),
            "ABORT" => Ok(Command::Abort),
            "YES" => Ok(Command::Yes),
            "NO" => Ok(Command::No),
            _ => Err(PathwayError::InvalidArgument(format!(
                "unknown command name: {s}"
            ))),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device lifecycle state, byte 9 of every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PathwayState {
    Idle,
    Ready,
    Test,
}

impl PathwayState {
    pub fn code(self) -> u8 {
        match self {
            PathwayState::Idle => 0,
            PathwayState::Ready => 1,
            PathwayState::Test => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PathwayState::Idle),
            1 => Some(PathwayState::Ready),
            2 => Some(PathwayState::Test),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PathwayState::Idle => "IDLE",
            PathwayState::Ready => "READY",
            PathwayState::Test => "TEST",
        }
    }
}

impl std::fmt::Display for PathwayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Test lifecycle state, byte 10 of every response.
///
/// Independent of [`PathwayState`]; the device reports both axes in every
/// response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestState {
    Idle,
    Running,
    Paused,
    Ready,
}

impl TestState {
    pub fn code(self) -> u8 {
        match self {
            TestState::Idle => 0,
            TestState::Running => 1,
            TestState::Paused => 2,
            TestState::Ready => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TestState::Idle),
            1 => Some(TestState::Running),
            2 => Some(TestState::Paused),
            3 => Some(TestState::Ready),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TestState::Idle => "IDLE",
            TestState::Running => "RUNNING",
            TestState::Paused => "PAUSED",
            TestState::Ready => "READY",
        }
    }
}

impl std::fmt::Display for TestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result code reported by the device, bytes 11-12 of every response.
///
/// The device is the authority on whether an action was legal or safe, so
/// these ride in [`Response::result`] as data rather than being raised as
/// errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResultCode {
    #[serde(rename = "RESULT_OK")]
    Ok,
    #[serde(rename = "RESULT_ILLEGAL_ARG")]
    IllegalArg,
    #[serde(rename = "RESULT_ILLEGAL_STATE")]
    IllegalState,
    #[serde(rename = "RESULT_ILLEGAL_TEST_STATE")]
    IllegalTestState,
    #[serde(rename = "RESULT_DEVICE_COMM_ERROR")]
    DeviceCommError,
    #[serde(rename = "RESULT_SAFETY_WARNING")]
    SafetyWarning,
    #[serde(rename = "RESULT_SAFETY_ERROR")]
    SafetyError,
}

impl ResultCode {
    pub fn code(self) -> u16 {
        match self {
            ResultCode::Ok => 0,
            ResultCode::IllegalArg => 1,
            ResultCode::IllegalState => 2,
            ResultCode::IllegalTestState => 3,
            ResultCode::DeviceCommError => 4096,
            ResultCode::SafetyWarning => 8192,
            ResultCode::SafetyError => 16384,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(ResultCode::Ok),
            1 => Some(ResultCode::IllegalArg),
            2 => Some(ResultCode::IllegalState),
            3 => Some(ResultCode::IllegalTestState),
            4096 => Some(ResultCode::DeviceCommError),
            8192 => Some(ResultCode::SafetyWarning),
            16384 => Some(ResultCode::SafetyError),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResultCode::Ok => "RESULT_OK",
            ResultCode::IllegalArg => "RESULT_ILLEGAL_ARG",
            ResultCode::IllegalState => "RESULT_ILLEGAL_STATE",
            ResultCode::IllegalTestState => "RESULT_ILLEGAL_TEST_STATE",
            ResultCode::DeviceCommError => "RESULT_DEVICE_COMM_ERROR",
            ResultCode::SafetyWarning => "RESULT_SAFETY_WARNING",
            ResultCode::SafetyError => "RESULT_SAFETY_ERROR",
        }
    }

    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Milliseconds since device power-on, bytes 13-16 of every response.
///
/// Renders as zero-padded `HH:MM:SS.mmm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestTime(u32);

impl TestTime {
    pub fn from_millis(millis: u32) -> Self {
        Self(millis)
    }

    pub fn as_millis(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for TestTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hours = self.0 / 3_600_000;
        let mins = (self.0 % 3_600_000) / 60_000;
        let secs = (self.0 % 60_000) / 1_000;
        let msecs = self.0 % 1_000;
        write!(f, "{hours:02}:{mins:02}:{secs:02}.{msecs:03}")
    }
}

impl Serialize for TestTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A decoded response record from the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    /// Element count the device claims to have sent after the length prefix.
    pub response_length: u32,
    /// Device-reported epoch seconds.
    pub time_stamp: u32,
    /// Echo of the command this response answers.
    pub command_id: Command,
    pub pathway_state: PathwayState,
    pub test_state: TestState,
    pub result: ResultCode,
    pub test_time: TestTime,
    /// Only present when the device sent one; `None` means the response
    /// carried no error message at all, which is distinct from an empty one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Response {
    /// Device timestamp as UTC wall-clock time.
    pub fn time_stamp_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(i64::from(self.time_stamp), 0).unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// Value of a watchable field, as the string the device name tables use.
    pub fn field_value(&self, field: WatchField) -> &'static str {
        match field {
            WatchField::PathwayState => self.pathway_state.as_str(),
            WatchField::TestState => self.test_state.as_str(),
            WatchField::Result => self.result.as_str(),
            WatchField::CommandId => self.command_id.as_str(),
        }
    }
}

/// Response fields that can be watched by the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchField {
    PathwayState,
    TestState,
    Result,
    CommandId,
}

impl WatchField {
    pub fn as_str(self) -> &'static str {
        match self {
            WatchField::PathwayState => "pathway_state",
            WatchField::TestState => "test_state",
            WatchField::Result => "result",
            WatchField::CommandId => "command_id",
        }
    }
}

impl std::str::FromStr for WatchField {
    type Err = PathwayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pathway_state" => Ok(WatchField::PathwayState),
            "test_state" => Ok(WatchField::TestState),
            "result" => Ok(WatchField::Result),
            "command_id" => Ok(WatchField::CommandId),
            _ => Err(PathwayError::InvalidArgument(format!(
                "unknown watchable field: {s}"
            ))),
        }
    }
}

impl std::fmt::Display for WatchField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_codes_are_stable() {
        assert_eq!(Command::Status.code(), 0);
        assert_eq!(Command::TestProgram.code(), 1);
        assert_eq!(Command::Start.code(), 2);
        assert_eq!(Command::Pause.code(), 3);
        assert_eq!(Command::Trigger.code(), 4);
        assert_eq!(Command::Stop.code(), 5);
        assert_eq!(Command::Abort.code(), 6);
        assert_eq!(Command::Yes.code(), 7);
        assert_eq!(Command::No.code(), 8);
    }

    #[test]
    fn test_code_tables_round_trip() {
        for code in 0..=8 {
            let command = Command::from_code(code).unwrap();
            assert_eq!(command.code(), code);
        }
        assert_eq!(Command::from_code(9), None);

        for code in 0..=2 {
            assert_eq!(PathwayState::from_code(code).unwrap().code(), code);
        }
        assert_eq!(PathwayState::from_code(3), None);

        for code in 0..=3 {
            assert_eq!(TestState::from_code(code).unwrap().code(), code);
        }
        assert_eq!(TestState::from_code(4), None);

        for code in [0, 1, 2, 3, 4096, 8192, 16384] {
            assert_eq!(ResultCode::from_code(code).unwrap().code(), code);
        }
        assert_eq!(ResultCode::from_code(5), None);
    }

    #[test]
    fn test_command_from_name() {
        assert_eq!("TEST_PROGRAM".parse::<Command>().unwrap(), Command::TestProgram);
        assert_eq!("status".parse::<Command>().unwrap(), Command::Status);
        assert!(matches!(
            "RESET".parse::<Command>(),
            Err(PathwayError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_test_time_formatting() {
        assert_eq!(TestTime::from_millis(3_661_001).to_string(), "01:01:01.001");
        assert_eq!(TestTime::from_millis(0).to_string(), "00:00:00.000");
        assert_eq!(TestTime::from_millis(59_999).to_string(), "00:00:59.999");
        assert_eq!(TestTime::from_millis(86_400_000).to_string(), "24:00:00.000");
    }

    #[test]
    fn test_watch_field_names() {
        assert_eq!("test_state".parse::<WatchField>().unwrap(), WatchField::TestState);
        assert_eq!(WatchField::PathwayState.as_str(), "pathway_state");
        assert!("response_length".parse::<WatchField>().is_err());
    }
}
