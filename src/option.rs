use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::constants;
use crate::report::Violation;

/// Custom messages that replace the default text of a file constraint error.
///
/// A custom `size_exceeded` message may contain `{max_size_mb}`, which is replaced
/// with the field's size limit in megabytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessages {
    pub max_files: Option<String>,
    pub invalid_type: Option<String>,
    pub size_exceeded: Option<String>,
}

impl ErrorMessages {
    fn get(&self, violation: Violation) -> Option<&str> {
        match violation {
            Violation::MaxFiles => self.max_files.as_deref(),
            Violation::InvalidType => self.invalid_type.as_deref(),
            Violation::SizeExceeded => self.size_exceeded.as_deref(),
        }
    }

    fn set(&mut self, violation: Violation, message: String) {
        match violation {
            Violation::MaxFiles => self.max_files = Some(message),
            Violation::InvalidType => self.invalid_type = Some(message),
            Violation::SizeExceeded => self.size_exceeded = Some(message),
        }
    }
}

/// Upload rules for the files sent under one field name.
///
/// # Examples
///
/// ```
/// use form_uploader::UploadOption;
///
/// let option = UploadOption::new("uploads/avatars")
///     .allowed_types(["image/png", "image/jpeg"])
///     .max_size(2 * 1024 * 1024);
///
/// assert!(!option.is_multiple());
/// assert_eq!(option.max_size_limit(), 2 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOption {
    #[serde(default)]
    pub(crate) multiple: bool,
    #[serde(default)]
    pub(crate) max_files: Option<usize>,
    #[serde(default)]
    pub(crate) allowed_types: Vec<String>,
    #[serde(default = "default_max_size")]
    pub(crate) max_size: u64,
    pub(crate) upload_dir: PathBuf,
    #[serde(default)]
    pub(crate) error_message: ErrorMessages,
}

fn default_max_size() -> u64 {
    constants::DEFAULT_MAX_FILE_SIZE
}

impl UploadOption {
    /// Creates an option storing files in `upload_dir`, accepting a single file of
    /// unlimited size and no allowed types.
    pub fn new<P: Into<PathBuf>>(upload_dir: P) -> UploadOption {
        UploadOption {
            multiple: false,
            max_files: None,
            allowed_types: Vec::new(),
            max_size: constants::DEFAULT_MAX_FILE_SIZE,
            upload_dir: upload_dir.into(),
            error_message: ErrorMessages::default(),
        }
    }

    /// Allows more than one file (and more than one scalar value) under this field.
    pub fn multiple(mut self, multiple: bool) -> UploadOption {
        self.multiple = multiple;
        self
    }

    /// Sets a hard cap on the number of files accepted for this field. `0` leaves the
    /// field uncapped.
    pub fn max_files(mut self, max_files: usize) -> UploadOption {
        self.max_files = Some(max_files);
        self
    }

    /// Adds an accepted MIME-style type, e.g. `image/png`. Only the subtype is
    /// compared against the file extension.
    pub fn allowed_type<T: Into<String>>(mut self, allowed_type: T) -> UploadOption {
        self.allowed_types.push(allowed_type.into());
        self
    }

    pub fn allowed_types<I, T>(mut self, allowed_types: I) -> UploadOption
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.allowed_types.extend(allowed_types.into_iter().map(Into::into));
        self
    }

    pub fn allowed_mime(self, mime: &mime::Mime) -> UploadOption {
        self.allowed_type(mime.essence_str())
    }

    /// Sets the per-file byte ceiling, enforced while the file is streaming.
    pub fn max_size(mut self, max_size: u64) -> UploadOption {
        self.max_size = max_size;
        self
    }

    pub fn upload_dir<P: Into<PathBuf>>(mut self, upload_dir: P) -> UploadOption {
        self.upload_dir = upload_dir.into();
        self
    }

    /// Replaces the default message reported for a violation of this option.
    pub fn error_message<M: Into<String>>(mut self, violation: Violation, message: M) -> UploadOption {
        self.error_message.set(violation, message.into());
        self
    }

    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    pub fn max_files_limit(&self) -> Option<usize> {
        self.max_files.filter(|max_files| *max_files > 0)
    }

    pub fn max_size_limit(&self) -> u64 {
        self.max_size
    }

    pub fn upload_directory(&self) -> &Path {
        &self.upload_dir
    }

    /// Checks the file extension against the subtypes of the allowed types,
    /// ignoring case. A file without an extension is never allowed.
    pub(crate) fn allows_file_name(&self, file_name: &str) -> bool {
        let extension = match Path::new(file_name).extension().and_then(OsStr::to_str) {
            Some(ext) => ext.to_lowercase(),
            None => return false,
        };

        self.allowed_types
            .iter()
            .any(|allowed| allowed_subtype(allowed) == extension)
    }

    pub(crate) fn multiplicity_message(&self, field_name: &str) -> String {
        self.custom_or(Violation::MaxFiles, || constants::multiple_not_allowed_msg(field_name))
    }

    pub(crate) fn max_files_message(&self, field_name: &str, max_files: usize) -> String {
        self.custom_or(Violation::MaxFiles, || {
            constants::max_files_exceeded_msg(field_name, max_files)
        })
    }

    pub(crate) fn invalid_type_message(&self, field_name: &str) -> String {
        self.custom_or(Violation::InvalidType, || {
            constants::invalid_type_msg(field_name, &self.allowed_types)
        })
    }

    pub(crate) fn size_exceeded_message(&self, field_name: &str) -> String {
        match self.error_message.get(Violation::SizeExceeded) {
            Some(custom) => custom.replace(
                constants::MAX_SIZE_MB_PLACEHOLDER,
                &constants::format_mb(self.max_size),
            ),
            None => constants::size_exceeded_msg(field_name, self.max_size),
        }
    }

    fn custom_or<F: FnOnce() -> String>(&self, violation: Violation, default: F) -> String {
        self.error_message
            .get(violation)
            .map(ToOwned::to_owned)
            .unwrap_or_else(default)
    }
}

fn allowed_subtype(allowed: &str) -> String {
    allowed
        .split_once('/')
        .map(|(_, subtype)| subtype)
        .unwrap_or(allowed)
        .to_lowercase()
}

/// The upload options of every file field, keyed by field name.
///
/// File parts sent under a field name without an option are ignored.
///
/// # Examples
///
/// ```
/// use form_uploader::{UploadOption, UploadOptions};
///
/// let options = UploadOptions::new()
///     .field("avatar", UploadOption::new("uploads").allowed_types(["image/png"]))
///     .field("docs", UploadOption::new("uploads/docs").multiple(true).max_files(3));
///
/// assert!(options.is_multiple("docs"));
/// assert!(options.get("unknown").is_none());
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "HashMap<String, UploadOption>")]
pub struct UploadOptions {
    pub(crate) field_map: HashMap<String, Arc<UploadOption>>,
}

impl UploadOptions {
    pub fn new() -> UploadOptions {
        UploadOptions::default()
    }

    /// Sets the option for a field, replacing any previous one.
    pub fn field<N: Into<String>>(mut self, field_name: N, option: UploadOption) -> UploadOptions {
        self.field_map.insert(field_name.into(), Arc::new(option));
        self
    }

    /// Loads options from JSON keyed by field name, using the `multiple`, `maxFiles`,
    /// `allowedTypes`, `maxSize`, `uploadDir` and `errorMessage` keys.
    pub fn from_json(json: &str) -> serde_json::Result<UploadOptions> {
        serde_json::from_str(json)
    }

    pub fn get(&self, field_name: &str) -> Option<&Arc<UploadOption>> {
        self.field_map.get(field_name)
    }

    /// Whether the field accepts more than one file. Unconfigured fields do not.
    pub fn is_multiple(&self, field_name: &str) -> bool {
        self.get(field_name).map_or(false, |option| option.multiple)
    }

    pub fn len(&self) -> usize {
        self.field_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.field_map.is_empty()
    }
}

impl From<HashMap<String, UploadOption>> for UploadOptions {
    fn from(field_map: HashMap<String, UploadOption>) -> Self {
        UploadOptions {
            field_map: field_map
                .into_iter()
                .map(|(name, option)| (name, Arc::new(option)))
                .collect(),
        }
    }
}
