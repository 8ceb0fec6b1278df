use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::Stream;
use http::header::{self, HeaderMap};
use http::{Request, StatusCode};
use multer::Multipart;
#[cfg(feature = "tokio-io")]
use tokio::io::AsyncRead;
#[cfg(feature = "tokio-io")]
use tokio_util::io::ReaderStream;

use crate::classifier::{Disposition, Part};
use crate::error::BoxError;
use crate::option::UploadOptions;
use crate::outcome::Outcome;
use crate::session::UploadSession;
use crate::validation::ValidationRules;

/// Handles `multipart/form-data` uploads: collects fields, gates and buffers files,
/// validates, and saves accepted files.
///
/// One `Uploader` is built per route and shared across requests; each request gets
/// its own [`UploadSession`].
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use futures_util::stream::once;
/// use form_uploader::{rules, Outcome, UploadOption, UploadOptions, Uploader, ValidationRules};
/// use std::convert::Infallible;
///
/// # async fn run() {
/// let dir = std::env::temp_dir().join("form-uploader-doc");
/// let uploader = Uploader::new(
///     ValidationRules::new().rule(rules::required("name")),
///     UploadOptions::new().field("avatar", UploadOption::new(&dir).allowed_type("image/png")),
/// );
///
/// let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\nJohn\r\n--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"me.png\"\r\n\r\nPNG\r\n--X-BOUNDARY--\r\n";
/// let stream = once(async move { Result::<Bytes, Infallible>::Ok(Bytes::from(data)) });
///
/// match uploader.process(stream, "X-BOUNDARY").await {
///     Outcome::Continue(accepted) => println!("Saved: {:?}", accepted.body.get("avatar")),
///     Outcome::Reject(rejection) => println!("Rejected with {}", rejection.status),
/// }
/// # }
/// # tokio::runtime::Runtime::new().unwrap().block_on(run());
/// ```
#[derive(Debug, Clone)]
pub struct Uploader {
    options: Arc<UploadOptions>,
    rules: ValidationRules,
    timeout: Option<Duration>,
}

impl Uploader {
    pub fn new(rules: ValidationRules, options: UploadOptions) -> Uploader {
        Uploader {
            options: Arc::new(options),
            rules,
            timeout: None,
        }
    }

    /// Bounds the time spent receiving the multipart stream. A stream that does not end
    /// in time is rejected with `408 Request Timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Uploader {
        self.timeout = Some(timeout);
        self
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    /// Starts the state of a new request, for hosts that drive their own tokenizer.
    pub fn session(&self) -> UploadSession {
        UploadSession::new(Arc::clone(&self.options))
    }

    /// Processes a multipart body given as a [`Stream`] of byte chunks.
    pub async fn process<S, O, E, B>(&self, stream: S, boundary: B) -> Outcome
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<BoxError> + 'static,
        B: Into<String>,
    {
        let mut multipart = Multipart::new(stream, boundary);
        let mut session = self.session();

        let received = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, receive(&mut session, &mut multipart)).await {
                Ok(res) => res,
                Err(_) => Err(crate::Error::TimedOut {
                    millis: limit.as_millis(),
                }),
            },
            None => receive(&mut session, &mut multipart).await,
        };

        if let Err(err) = received {
            let status = match err {
                crate::Error::TimedOut { .. } => StatusCode::REQUEST_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            session.fail(status, err);
        }

        session.finish(&self.rules).await
    }

    /// Processes an HTTP request, reading the boundary from its `Content-Type` header.
    pub async fn process_request<S, O, E>(&self, req: Request<S>) -> Outcome
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<BoxError> + 'static,
    {
        match boundary_from_headers(req.headers()) {
            Ok(boundary) => self.process(req.into_body(), boundary).await,
            Err(err) => {
                let mut session = self.session();
                session.fail(StatusCode::INTERNAL_SERVER_ERROR, err);
                session.finish(&self.rules).await
            }
        }
    }

    /// Processes a multipart body read from an [`AsyncRead`].
    ///
    /// # Optional
    ///
    /// This requires the optional `tokio-io` feature to be enabled.
    #[cfg(feature = "tokio-io")]
    pub async fn process_reader<R, B>(&self, reader: R, boundary: B) -> Outcome
    where
        R: AsyncRead + Send + 'static,
        B: Into<String>,
    {
        self.process(ReaderStream::new(reader), boundary).await
    }
}

async fn receive(session: &mut UploadSession, multipart: &mut Multipart<'_>) -> crate::Result<()> {
    while let Some(mut field) = multipart.next_field().await? {
        let disposition = session.classify(&Part {
            name: field.name(),
            file_name: field.file_name(),
        });

        match disposition {
            Disposition::Field(name) => {
                let value = field.text().await?;
                session.collect_field(name, value);
            }
            Disposition::File(mut file) => {
                while let Some(chunk) = field.chunk().await? {
                    if session.feed(&mut file, chunk).is_break() {
                        break;
                    }
                }
                session.finish_file(file);
            }
            // Dropping the field lets the parser skip the rest of the part.
            Disposition::Discard => {}
        }
    }

    Ok(())
}

fn boundary_from_headers(headers: &HeaderMap) -> crate::Result<String> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .ok_or(crate::Error::MissingContentType)?
        .to_str()
        .map_err(|_| crate::Error::NoMultipart)?;

    crate::parse_boundary(content_type)
}
