use std::io;

use anyhow::anyhow;
use rmp::{
    decode::{DecodeStringError, MarkerReadError, NumValueReadError, ValueReadError},
    encode::{RmpWriteErr, ValueWriteError},
};

/// Status of a failed connection, kept on the connection and returned by
/// [`crate::Connection::error`].
#[derive(Clone, Debug, thiserror::Error)]
#[error("{msg}")]
pub struct ConnectionError {
    pub msg: String,
    /// OS error code, when the failure came from a syscall.
    pub errno: Option<i32>,
}

impl ConnectionError {
    pub(crate) fn new(msg: impl Into<String>, errno: Option<i32>) -> Self {
        Self {
            msg: msg.into(),
            errno,
        }
    }
}

impl From<&io::Error> for ConnectionError {
    fn from(value: &io::Error) -> Self {
        Self::new(value.to_string(), value.raw_os_error())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to connect to Tarantool: {0}")]
    Connect(#[source] io::Error),
    #[error("Connect timeout")]
    ConnectTimeout,
    #[error("Wait deadline expired")]
    Timeout,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Connection failed: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("MessagePack encoding error: {0}")]
    Encode(#[from] EncodingError),
    #[error("MessagePack decoding error: {0}")]
    Decode(#[from] DecodingError),
}

/// Errors raised while encoding a request into the output buffer.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("MessagePack write error: {0}")]
    MessagePack(#[source] anyhow::Error),
    #[error("Failed to serialize tuple: {0}")]
    Serialize(#[from] rmp_serde::encode::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl<E> From<ValueWriteError<E>> for EncodingError
where
    E: RmpWriteErr + Send + Sync,
{
    fn from(v: ValueWriteError<E>) -> Self {
        Self::MessagePack(v.into())
    }
}

/// Errors raised while decoding server data.
#[derive(Debug, thiserror::Error)]
pub enum DecodingError {
    #[error("MessagePack decoding error: {0}")]
    MessagePack(#[source] anyhow::Error),
    #[error("Type mismatch, expected '{expected}', actual '{actual}'")]
    TypeMismatch {
        expected: &'static str,
        actual: String,
    },
    #[error("Missing key '{0}' in response")]
    MissingKey(&'static str),
    #[error("Corrupt frame size prefix")]
    CorruptSizePrefix,
    #[error("Malformed server greeting")]
    BadGreeting,
}

impl DecodingError {
    pub(crate) fn type_mismatch(expected: &'static str, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected,
            actual: actual.into(),
        }
    }

    pub(crate) fn missing_key(key: &'static str) -> Self {
        Self::MissingKey(key)
    }
}

impl From<ValueReadError> for DecodingError {
    fn from(v: ValueReadError) -> Self {
        Self::MessagePack(v.into())
    }
}

impl From<rmpv::decode::Error> for DecodingError {
    fn from(v: rmpv::decode::Error) -> Self {
        Self::MessagePack(v.into())
    }
}

impl From<NumValueReadError> for DecodingError {
    fn from(v: NumValueReadError) -> Self {
        Self::MessagePack(v.into())
    }
}

impl From<DecodeStringError<'_>> for DecodingError {
    fn from(v: DecodeStringError<'_>) -> Self {
        Self::MessagePack(anyhow!("{}", v))
    }
}

impl From<MarkerReadError> for DecodingError {
    fn from(v: MarkerReadError) -> Self {
        Self::MessagePack(v.0.into())
    }
}
