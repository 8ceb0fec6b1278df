use std::ops::ControlFlow;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;

use crate::classifier::{self, Disposition, FileCounts, Part};
use crate::field_map::FieldMap;
use crate::file::{FileAccumulator, FileRecord};
use crate::guard::ResponseGuard;
use crate::option::UploadOptions;
use crate::outcome::{Accepted, Outcome, Rejection};
use crate::persist;
use crate::report::ValidationError;
use crate::validation::ValidationRules;

/// The stage an [`UploadSession`] has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    /// Parts are still arriving from the multipart stream.
    ReceivingParts,
    /// The stream ended and the validation rules are running.
    Validating,
    /// Validation passed and the buffered files are being written.
    Persisting,
    /// A terminal action was taken.
    Finished,
}

/// The state of one upload request, fed by the events of its multipart stream.
///
/// A host that drives its own multipart tokenizer calls, per part:
/// [`classify`](UploadSession::classify), then either
/// [`collect_field`](UploadSession::collect_field) with the field value, or
/// [`feed`](UploadSession::feed) for every chunk of a file followed by
/// [`finish_file`](UploadSession::finish_file). Once the stream ends,
/// [`finish`](UploadSession::finish) validates, persists and returns the outcome.
///
/// Every exit goes through one [`ResponseGuard`], so the first terminal action wins
/// and parts arriving after it are drained without effect.
#[derive(Debug)]
pub struct UploadSession {
    options: Arc<UploadOptions>,
    stage: SessionStage,
    fields: FieldMap,
    files: Vec<FileRecord>,
    file_counts: FileCounts,
    file_errors: Vec<ValidationError>,
    guard: ResponseGuard,
    outcome: Option<Outcome>,
}

impl UploadSession {
    pub fn new(options: Arc<UploadOptions>) -> UploadSession {
        UploadSession {
            options,
            stage: SessionStage::ReceivingParts,
            fields: FieldMap::new(),
            files: Vec::new(),
            file_counts: FileCounts::default(),
            file_errors: Vec::new(),
            guard: ResponseGuard::new(),
            outcome: None,
        }
    }

    pub fn stage(&self) -> SessionStage {
        self.stage
    }

    /// Whether a terminal action has already been taken for this request.
    pub fn is_responded(&self) -> bool {
        self.guard.is_fired()
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    /// File constraint errors collected so far, reported once the stream ends.
    pub fn file_errors(&self) -> &[ValidationError] {
        &self.file_errors
    }

    pub fn file_count(&self, field_name: &str) -> usize {
        self.file_counts.get(field_name)
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Decides what to do with an incoming part before any of its bytes are read.
    pub fn classify(&mut self, part: &Part<'_>) -> Disposition {
        let disposition = classifier::classify(
            part,
            &self.options,
            &mut self.file_counts,
            &mut self.file_errors,
            self.guard.is_fired(),
        );

        log::debug!(
            "Part {:?} (file {:?}) classified as {}",
            part.name,
            part.file_name,
            match &disposition {
                Disposition::Field(_) => "field",
                Disposition::File(_) => "file",
                Disposition::Discard => "discard",
            }
        );

        disposition
    }

    pub fn collect_field(&mut self, name: String, value: String) {
        let multiple = self.options.is_multiple(&name);
        self.fields.collect(name, value, multiple);
    }

    /// Buffers a chunk of a gated file. Breaks once the request has been answered,
    /// telling the caller to stop reading and let the part drain.
    pub fn feed(&mut self, file: &mut FileAccumulator, chunk: Bytes) -> ControlFlow<()> {
        if self.guard.is_fired() {
            file.abandon();
            return ControlFlow::Break(());
        }

        if let Some(err) = file.push(chunk) {
            log::warn!(
                "File '{}' for field '{}' exceeded its size limit",
                file.file_name(),
                file.field_name()
            );
            self.file_errors.push(err);
        }

        ControlFlow::Continue(())
    }

    /// Handles the end of a file part. Files within their size limit are kept and
    /// their original name is recorded under the field right away.
    pub fn finish_file(&mut self, file: FileAccumulator) {
        if let Some(record) = file.finish() {
            self.fields
                .push(record.field_name.as_str(), record.original_file_name.as_str());
            self.files.push(record);
        }
    }

    /// Answers the request with a form-level failure, e.g. a broken transport. Returns
    /// whether this call was the one that answered.
    pub fn fail(&mut self, status: StatusCode, cause: crate::Error) -> bool {
        let entry = ValidationError::form(cause.to_string());
        self.fail_with(status, entry, cause)
    }

    fn fail_with(&mut self, status: StatusCode, entry: ValidationError, cause: crate::Error) -> bool {
        if self.guard.is_fired() {
            log::debug!("Suppressed failure after the request was answered: {}", cause);
            return false;
        }

        log::error!("Upload failed with {}: {}", status, cause);
        self.dispatch(Outcome::Reject(Rejection::failed(status, entry, cause)))
    }

    fn dispatch(&mut self, outcome: Outcome) -> bool {
        let slot = &mut self.outcome;
        let fired = self.guard.try_fire(|| *slot = Some(outcome));

        if fired {
            self.stage = SessionStage::Finished;
        }

        fired
    }

    /// Runs once the multipart stream has ended: validates the collected body, merges
    /// in the file errors and either rejects the request or saves the files and hands
    /// the rewritten body on. A no-op if the request was already answered.
    pub async fn complete(&mut self, rules: &ValidationRules) {
        if self.guard.is_fired() || self.stage != SessionStage::ReceivingParts {
            return;
        }

        self.stage = SessionStage::Validating;

        let mut errors = match rules.run_all(&self.fields).await {
            Ok(findings) => findings,
            Err(err) => {
                self.fail(StatusCode::INTERNAL_SERVER_ERROR, err);
                return;
            }
        };
        errors.append(&mut self.file_errors);

        if !errors.is_empty() {
            log::debug!("Rejecting upload with {} error(s)", errors.len());
            self.dispatch(Outcome::Reject(Rejection::invalid(errors)));
            return;
        }

        self.stage = SessionStage::Persisting;

        let files = std::mem::take(&mut self.files);
        match persist::persist_all(&files).await {
            Ok(saved) => {
                let mut body = std::mem::take(&mut self.fields);
                persist::rewrite_body(&mut body, &saved, &self.options);
                self.dispatch(Outcome::Continue(Accepted { body, files: saved }));
            }
            Err(err) => {
                let field_name = match &err {
                    crate::Error::CreateDirFailed { field_name, .. }
                    | crate::Error::WriteFileFailed { field_name, .. } => field_name.as_str(),
                    _ => "",
                };
                let entry = ValidationError::persistence(field_name, err.to_string());
                self.fail_with(StatusCode::INTERNAL_SERVER_ERROR, entry, err);
            }
        }
    }

    /// Completes the request if needed and returns its single outcome.
    pub async fn finish(mut self, rules: &ValidationRules) -> Outcome {
        self.complete(rules).await;

        match self.outcome.take() {
            Some(outcome) => outcome,
            None => Outcome::Reject(Rejection::failed(
                StatusCode::INTERNAL_SERVER_ERROR,
                ValidationError::form(crate::Error::NoResponse.to_string()),
                crate::Error::NoResponse,
            )),
        }
    }
}
