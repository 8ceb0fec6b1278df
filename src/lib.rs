//! A streaming `multipart/form-data` upload middleware.
//!
//! An [`Uploader`] consumes a multipart body as it streams in, splitting it into
//! scalar fields and files. Files are checked against the [`UploadOption`] of their
//! field (count, type and size) before and while they are buffered. Once the stream
//! ends the collected fields are run through the [`ValidationRules`], and only if
//! nothing was reported are the files saved to their upload directory, with the saved
//! names written back into the body.
//!
//! Every request ends in exactly one [`Outcome`]: either [`Outcome::Continue`] with
//! the rewritten body, or [`Outcome::Reject`] carrying a `{ "errors": [...] }` report.
//!
//! # Examples
//!
//! ```
//! use form_uploader::{rules, Outcome, UploadOption, UploadOptions, Uploader, ValidationRules};
//!
//! # async fn run(req: http::Request<futures_util::stream::Empty<Result<bytes::Bytes, std::io::Error>>>) {
//! let uploader = Uploader::new(
//!     ValidationRules::new().rule(rules::required("name")),
//!     UploadOptions::new().field(
//!         "avatar",
//!         UploadOption::new("uploads/avatars")
//!             .allowed_types(["image/png", "image/jpeg"])
//!             .max_size(2 * 1024 * 1024),
//!     ),
//! );
//!
//! match uploader.process_request(req).await {
//!     Outcome::Continue(accepted) => println!("Body: {:?}", accepted.body),
//!     Outcome::Reject(rejection) => {
//!         let res = rejection.to_response();
//!         println!("Response: {:?}", res);
//!     }
//! }
//! # }
//! ```
//!
//! # Optional Features
//!
//! * `tokio-io`: Enables [`Uploader::process_reader`] for [`tokio::io::AsyncRead`] bodies.

pub use bytes;
pub use multer;

pub use classifier::{Disposition, Part};
pub use error::{BoxError, Error};
pub use field_map::{FieldMap, FieldValue};
pub use file::{FileAccumulator, FileRecord};
pub use guard::ResponseGuard;
pub use option::{ErrorMessages, UploadOption, UploadOptions};
pub use outcome::{Accepted, Outcome, Rejection};
pub use persist::SavedFile;
pub use report::{ErrorKind, ErrorReport, ValidationError, Violation};
pub use session::{SessionStage, UploadSession};
pub use uploader::Uploader;
pub use validation::{Rule, ValidationRules};

/// Ready-made [`Rule`]s.
pub mod rules {
    pub use crate::validation::{check, from_fn, required, Check, FnRule};
}

mod classifier;
mod constants;
mod error;
mod field_map;
mod file;
mod guard;
mod option;
mod outcome;
mod persist;
mod report;
mod session;
mod uploader;
mod validation;

/// A Result type often returned from methods that can have `form_uploader` errors.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Parses the `Content-Type` header to extract the boundary value.
///
/// # Examples
///
/// ```
/// # fn run(){
/// let content_type = "multipart/form-data; boundary=ABCDEFG";
///
/// assert_eq!(form_uploader::parse_boundary(content_type), Ok("ABCDEFG".to_owned()));
/// # }
/// # run();
/// ```
pub fn parse_boundary<T: AsRef<str>>(content_type: T) -> Result<String> {
    let m = content_type
        .as_ref()
        .parse::<mime::Mime>()
        .map_err(Error::DecodeContentType)?;

    if !(m.type_() == mime::MULTIPART && m.subtype() == mime::FORM_DATA) {
        return Err(Error::NoMultipart);
    }

    m.get_param(mime::BOUNDARY)
        .map(|name| name.as_str().to_owned())
        .ok_or(Error::NoBoundary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_boundary() {
        let content_type = "multipart/form-data; boundary=ABCDEFG";
        assert_eq!(parse_boundary(content_type), Ok("ABCDEFG".to_owned()));

        let content_type = "multipart/form-data; boundary=------ABCDEFG";
        assert_eq!(parse_boundary(content_type), Ok("------ABCDEFG".to_owned()));

        let content_type = "boundary=------ABCDEFG";
        assert!(parse_boundary(content_type).is_err());

        let content_type = "text/plain";
        assert_eq!(parse_boundary(content_type), Err(Error::NoMultipart));

        let content_type = "text/plain; boundary=------ABCDEFG";
        assert!(parse_boundary(content_type).is_err());

        let content_type = "multipart/form-data";
        assert_eq!(parse_boundary(content_type), Err(Error::NoBoundary));
    }
}
