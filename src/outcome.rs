use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::{Response, StatusCode};

use crate::constants;
use crate::field_map::FieldMap;
use crate::persist::SavedFile;
use crate::report::{ErrorReport, ValidationError};

/// The single terminal action taken for an upload request.
#[derive(Debug)]
pub enum Outcome {
    /// Everything passed and the files were saved; continue with the next stage.
    Continue(Accepted),
    /// The request was answered with an error report.
    Reject(Rejection),
}

impl Outcome {
    pub fn is_continue(&self) -> bool {
        matches!(self, Outcome::Continue(_))
    }

    pub fn accepted(self) -> Option<Accepted> {
        match self {
            Outcome::Continue(accepted) => Some(accepted),
            Outcome::Reject(_) => None,
        }
    }

    pub fn rejection(self) -> Option<Rejection> {
        match self {
            Outcome::Reject(rejection) => Some(rejection),
            Outcome::Continue(_) => None,
        }
    }
}

/// The rewritten body and the saved files of an accepted request.
#[derive(Debug)]
pub struct Accepted {
    /// Scalar fields plus, for every file field, the saved file name or names.
    pub body: FieldMap,
    pub files: Vec<SavedFile>,
}

/// An error response: `400` for validation findings and file constraint violations,
/// `500` for internal failures and `408` for a stalled stream.
#[derive(Debug)]
pub struct Rejection {
    pub status: StatusCode,
    pub report: ErrorReport,
    /// The failure to forward to the host's error channel, if any.
    pub cause: Option<crate::Error>,
}

impl Rejection {
    pub(crate) fn invalid(errors: Vec<ValidationError>) -> Rejection {
        Rejection {
            status: StatusCode::BAD_REQUEST,
            report: ErrorReport::new(errors),
            cause: None,
        }
    }

    pub(crate) fn failed(status: StatusCode, entry: ValidationError, cause: crate::Error) -> Rejection {
        Rejection {
            status,
            report: ErrorReport::new(vec![entry]),
            cause: Some(cause),
        }
    }

    /// Renders the `{"errors": [...]}` JSON response.
    pub fn to_response(&self) -> crate::Result<Response<Bytes>> {
        let body = self.report.to_json()?;

        let mut res = Response::new(Bytes::from(body));
        *res.status_mut() = self.status;
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(constants::JSON_CONTENT_TYPE),
        );

        Ok(res)
    }
}
