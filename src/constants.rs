pub(crate) const DEFAULT_MAX_FILE_SIZE: u64 = u64::MAX;

pub(crate) const BYTES_PER_MB: f64 = (1024 * 1024) as f64;

pub(crate) const LOCATION_FORM: &str = "form";
pub(crate) const LOCATION_FILES: &str = "files";
pub(crate) const LOCATION_BODY: &str = "body";

pub(crate) const MAX_SIZE_MB_PLACEHOLDER: &str = "{max_size_mb}";
pub(crate) const FALLBACK_FILE_NAME: &str = "file";

pub(crate) const JSON_CONTENT_TYPE: &str = "application/json";

/// Formats a byte count as megabytes the way the default size message prints it,
/// e.g. `5` for 5 MiB and `0.0009765625` for 1 KiB.
pub(crate) fn format_mb(bytes: u64) -> String {
    format!("{}", bytes as f64 / BYTES_PER_MB)
}

pub(crate) fn multiple_not_allowed_msg(field_name: &str) -> String {
    format!("Multiple files not allowed for {}", field_name)
}

pub(crate) fn max_files_exceeded_msg(field_name: &str, max_files: usize) -> String {
    format!(
        "Maximum number of files exceeded for {}. Allowed: {}",
        field_name, max_files
    )
}

pub(crate) fn invalid_type_msg(field_name: &str, allowed_types: &[String]) -> String {
    format!(
        "Invalid file type for {}. Allowed types: {}",
        field_name,
        allowed_types.join(", ")
    )
}

pub(crate) fn size_exceeded_msg(field_name: &str, max_size: u64) -> String {
    format!(
        "File size exceeds the limit for {}. Max size: {} MB",
        field_name,
        format_mb(max_size)
    )
}
