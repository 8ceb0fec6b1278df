use std::collections::HashMap;
use std::sync::Arc;

use crate::file::FileAccumulator;
use crate::option::{UploadOption, UploadOptions};
use crate::report::{ValidationError, Violation};

/// The descriptor of an incoming multipart part, as read from its
/// `Content-Disposition` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part<'a> {
    pub name: Option<&'a str>,
    pub file_name: Option<&'a str>,
}

impl<'a> Part<'a> {
    pub fn field(name: &'a str) -> Part<'a> {
        Part {
            name: Some(name),
            file_name: None,
        }
    }

    pub fn file(name: &'a str, file_name: &'a str) -> Part<'a> {
        Part {
            name: Some(name),
            file_name: Some(file_name),
        }
    }
}

/// What to do with a classified part.
#[derive(Debug)]
pub enum Disposition {
    /// A scalar field; read its value and hand it to the field collector.
    Field(String),
    /// A file that passed every gate; stream its chunks into the accumulator.
    File(FileAccumulator),
    /// Drain the part without acting on it.
    Discard,
}

impl Disposition {
    pub fn is_discard(&self) -> bool {
        matches!(self, Disposition::Discard)
    }
}

/// Files seen per field name, counting every file that got past the count gates,
/// including ones later rejected for their type or size.
#[derive(Debug, Default)]
pub(crate) struct FileCounts(HashMap<String, usize>);

impl FileCounts {
    pub(crate) fn get(&self, field_name: &str) -> usize {
        self.0.get(field_name).copied().unwrap_or(0)
    }

    fn increment(&mut self, field_name: &str) {
        *self.0.entry(field_name.to_owned()).or_insert(0) += 1;
    }
}

pub(crate) fn classify(
    part: &Part<'_>,
    options: &UploadOptions,
    counts: &mut FileCounts,
    errors: &mut Vec<ValidationError>,
    responded: bool,
) -> Disposition {
    if responded {
        return Disposition::Discard;
    }

    let name = match part.name {
        Some(name) => name,
        None => {
            log::debug!("Discarding a part without a field name");
            return Disposition::Discard;
        }
    };

    let file_name = match part.file_name {
        Some("") => {
            log::debug!("Discarding empty file input '{}'", name);
            return Disposition::Discard;
        }
        Some(file_name) => file_name,
        None => return Disposition::Field(name.to_owned()),
    };

    let option = match options.get(name) {
        Some(option) => option,
        None => {
            log::debug!("Ignoring file '{}' sent under unconfigured field '{}'", file_name, name);
            return Disposition::Discard;
        }
    };

    match gate_file(name, file_name, option, counts) {
        Ok(()) => Disposition::File(FileAccumulator::new(
            name.to_owned(),
            file_name.to_owned(),
            Arc::clone(option),
        )),
        Err(err) => {
            log::warn!("Rejected file '{}' for field '{}': {}", file_name, name, err.message);
            errors.push(err);
            Disposition::Discard
        }
    }
}

fn gate_file(
    name: &str,
    file_name: &str,
    option: &UploadOption,
    counts: &mut FileCounts,
) -> Result<(), ValidationError> {
    let count = counts.get(name);

    if !option.multiple && count > 0 {
        return Err(ValidationError::file(
            Violation::MaxFiles,
            name,
            file_name,
            option.multiplicity_message(name),
        ));
    }

    if let Some(max_files) = option.max_files_limit() {
        if count >= max_files {
            return Err(ValidationError::file(
                Violation::MaxFiles,
                name,
                file_name,
                option.max_files_message(name, max_files),
            ));
        }
    }

    counts.increment(name);

    if !option.allows_file_name(file_name) {
        return Err(ValidationError::file(
            Violation::InvalidType,
            name,
            file_name,
            option.invalid_type_message(name),
        ));
    }

    Ok(())
}
