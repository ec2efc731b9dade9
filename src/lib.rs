pub mod error;
pub mod medoc;
pub mod types;

pub use error::{DecodeError, PathwayError, ResponseField};
pub use medoc::client::{MAX_CALL_ATTEMPTS, RESPONSE_FORMAT_ERROR};
pub use medoc::{ConnectionConfig, PathwayClient, PathwayClientBuilder, protocol};
pub use types::{
    Command, PathwayState, Response, ResultCode, TestState, TestTime, WatchField,
};
