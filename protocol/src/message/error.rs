//! Error types for the message codec.

use thiserror::Error;

/// Why a `client` or `server` parameter could not be encoded or decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// A message is missing `ver`, `cmd` or `idk` and cannot be encoded.
    #[error("incomplete message: ver, cmd and idk are required")]
    IncompleteMessage,

    #[error("empty input")]
    EmptyInput,

    #[error("invalid base64url encoding: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("decoded message is not valid UTF-8")]
    InvalidUtf8,

    /// A non-empty line without `=`.
    #[error("invalid field '{0}', should be in the form key=value")]
    MalformedField(String),

    #[error("duplicate key '{0}'")]
    DuplicateKey(String),

    #[error("missing required parameter '{0}'")]
    MissingRequiredParameter(&'static str),

    #[error("required value 'tif' is invalid: '{0}'")]
    InvalidTif(String),
}
