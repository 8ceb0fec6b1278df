use std::fmt::{self, Debug, Display, Formatter};
use std::io;
use std::path::PathBuf;

use derive_more::Display;

/// A boxed error type used by validation rules and the host transport.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A set of internal failures that can terminate an upload request.
///
/// Constraint violations and validation findings are not errors of this type; they
/// are collected as [`ValidationError`](crate::ValidationError) entries and reported
/// together. This type covers failures the request cannot recover from.
#[derive(Display)]
#[non_exhaustive]
pub enum Error {
    /// The request carries no `Content-Type` header.
    #[display(fmt = "Content-Type header is missing")]
    MissingContentType,

    /// The `Content-Type` header is not `multipart/form-data`.
    #[display(fmt = "Content-Type is not multipart/form-data")]
    NoMultipart,

    /// Failed to convert the `Content-Type` to [`mime::Mime`] type.
    #[display(fmt = "Failed to convert Content-Type to `mime::Mime` type: {}", _0)]
    DecodeContentType(mime::FromStrError),

    /// No boundary found in `Content-Type` header.
    #[display(fmt = "multipart boundary not found in Content-Type")]
    NoBoundary,

    /// The multipart stream could not be read or parsed.
    #[display(fmt = "{}", _0)]
    StreamReadFailed(multer::Error),

    /// The multipart stream was not fully received in time.
    #[display(fmt = "Timed out receiving the multipart stream after {} ms", millis)]
    TimedOut { millis: u128 },

    /// A validation rule failed to run, as opposed to reporting a finding.
    #[display(fmt = "{}", _0)]
    ValidationFailed(BoxError),

    /// The upload directory for a field could not be created.
    #[display(fmt = "Failed to create upload directory for {}: {}", field_name, cause)]
    CreateDirFailed {
        field_name: String,
        path: PathBuf,
        cause: io::Error,
    },

    /// A buffered file could not be written to its destination.
    #[display(fmt = "Failed to write file {} for {}: {}", file_name, field_name, cause)]
    WriteFileFailed {
        field_name: String,
        file_name: String,
        path: PathBuf,
        cause: io::Error,
    },

    /// The error report could not be encoded as JSON.
    #[display(fmt = "failed to encode error report as JSON: {}", _0)]
    EncodeReport(serde_json::Error),

    /// The upload session ended without taking a terminal action.
    #[display(fmt = "upload session ended without a response")]
    NoResponse,
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::DecodeContentType(err) => Some(err),
            Error::StreamReadFailed(err) => Some(err),
            Error::ValidationFailed(err) => Some(err.as_ref()),
            Error::CreateDirFailed { cause, .. } | Error::WriteFileFailed { cause, .. } => Some(cause),
            Error::EncodeReport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<multer::Error> for Error {
    fn from(err: multer::Error) -> Self {
        Error::StreamReadFailed(err)
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string().eq(&other.to_string())
    }
}

impl Eq for Error {}
