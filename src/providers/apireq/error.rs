//! Wrapper around Reqwest's error type to facilitate exclusive matching

use std::error::Error as StdError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    ConnectFailed,
    DecodingFailed,
    RedirectPolicyViolated,
    TimedOut,
    BuilderFailed,
    UnknownReqwestError,
}

impl ErrorKind {
    fn classify(err: &reqwest::Error) -> ErrorKind {
        if err.is_timeout() {
            ErrorKind::TimedOut
        } else if err.is_connect() {
            ErrorKind::ConnectFailed
        } else if err.is_decode() {
            ErrorKind::DecodingFailed
        } else if err.is_redirect() {
            ErrorKind::RedirectPolicyViolated
        } else if err.is_builder() {
            ErrorKind::BuilderFailed
        } else {
            ErrorKind::UnknownReqwestError
        }
    }
}

#[derive(Debug)]
pub(crate) struct Error {
    kind: ErrorKind,
    source: reqwest::Error,
}

impl From<reqwest::Error> for Error {
    fn from(source: reqwest::Error) -> Self {
        Error {
            kind: ErrorKind::classify(&source),
            source,
        }
    }
}

impl Error {
    pub(crate) fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            ErrorKind::ConnectFailed => "connection failed",
            ErrorKind::DecodingFailed => "decoding failed",
            ErrorKind::RedirectPolicyViolated => "redirect policy violated",
            ErrorKind::TimedOut => "timed out",
            ErrorKind::BuilderFailed => "the request could not be built",
            ErrorKind::UnknownReqwestError => "request failed",
        };

        write!(f, "{} ({})", what, self.source)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.source)
    }
}
