//! Conversions between request-level errors and provider error types

use crate::providers::apireq::{
    error::ErrorKind as ReqwestErrorKind, JsonStreamError, ReqwestError,
};
use crate::providers::{Error, ErrorKind};

impl From<JsonStreamError> for Error {
    fn from(value: JsonStreamError) -> Self {
        let kind = match &value {
            JsonStreamError::DeserializationFailed { .. }
            | JsonStreamError::UnsupportedSseField(_)
            | JsonStreamError::ResponseExceededBuffer(_) => ErrorKind::UnexpectedResponse,
            JsonStreamError::StreamFailed(err) => kind_of(err),
        };

        Error::from_source(kind, Box::new(value))
    }
}

fn kind_of(err: &ReqwestError) -> ErrorKind {
    match err.kind() {
        ReqwestErrorKind::ConnectFailed => ErrorKind::Connection,
        ReqwestErrorKind::DecodingFailed | ReqwestErrorKind::RedirectPolicyViolated => {
            ErrorKind::UnexpectedResponse
        }
        ReqwestErrorKind::TimedOut => ErrorKind::TimedOut,
        ReqwestErrorKind::BuilderFailed => ErrorKind::InvalidConfiguration,
        ReqwestErrorKind::UnknownReqwestError => ErrorKind::UnspecifiedError,
    }
}

impl From<ReqwestError> for Error {
    fn from(value: ReqwestError) -> Self {
        Error::from_source(kind_of(&value), Box::new(value))
    }
}
