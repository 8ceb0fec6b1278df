use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::constants;

/// The file constraint a rejected file part violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Violation {
    /// Too many files for the field, or a second file for a single-file field.
    MaxFiles,
    /// The file extension does not match any allowed type.
    InvalidType,
    /// The file grew past the field's size ceiling while streaming.
    SizeExceeded,
}

/// Where an error entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport, parse or validation-engine failure.
    Form,
    /// A finding reported by a validation rule.
    Field,
    /// A file part rejected by its upload option.
    File(Violation),
    /// A validated file that could not be written.
    Persistence,
}

impl ErrorKind {
    /// The `type` value written into the error report.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Form => "form",
            ErrorKind::Field => "field",
            ErrorKind::File(_) | ErrorKind::Persistence => "file",
        }
    }

    pub fn violation(&self) -> Option<Violation> {
        match self {
            ErrorKind::File(violation) => Some(*violation),
            _ => None,
        }
    }
}

impl Serialize for ErrorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One entry of the `{ errors: [...] }` report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    #[serde(rename = "msg")]
    pub message: String,
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub path: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl ValidationError {
    /// A form-level failure: transport, parse, timeout or a crashed validation rule.
    pub fn form<M: Into<String>>(message: M) -> ValidationError {
        ValidationError {
            message: message.into(),
            kind: ErrorKind::Form,
            path: String::new(),
            location: constants::LOCATION_FORM.to_owned(),
            value: None,
        }
    }

    /// A validation finding against a body field.
    pub fn field<P: Into<String>, M: Into<String>>(path: P, message: M) -> ValidationError {
        ValidationError {
            message: message.into(),
            kind: ErrorKind::Field,
            path: path.into(),
            location: constants::LOCATION_BODY.to_owned(),
            value: None,
        }
    }

    pub(crate) fn file(violation: Violation, field_name: &str, file_name: &str, message: String) -> ValidationError {
        ValidationError {
            message,
            kind: ErrorKind::File(violation),
            path: field_name.to_owned(),
            location: constants::LOCATION_FILES.to_owned(),
            value: Some(Value::String(file_name.to_owned())),
        }
    }

    pub(crate) fn persistence(field_name: &str, message: String) -> ValidationError {
        ValidationError {
            message,
            kind: ErrorKind::Persistence,
            path: field_name.to_owned(),
            location: constants::LOCATION_FILES.to_owned(),
            value: None,
        }
    }

    /// Attaches the offending value to the entry.
    pub fn with_value<V: Into<Value>>(mut self, value: V) -> ValidationError {
        self.value = Some(value.into());
        self
    }

    /// Overrides the default location, e.g. `query` for rules that inspect other inputs.
    pub fn with_location<L: Into<String>>(mut self, location: L) -> ValidationError {
        self.location = location.into();
        self
    }
}

/// The body sent with a rejected request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorReport {
    pub errors: Vec<ValidationError>,
}

impl ErrorReport {
    pub fn new(errors: Vec<ValidationError>) -> ErrorReport {
        ErrorReport { errors }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Counts the file entries rejected for the given constraint.
    pub fn count_violations(&self, violation: Violation) -> usize {
        self.errors
            .iter()
            .filter(|err| err.kind.violation() == Some(violation))
            .count()
    }

    pub fn to_json(&self) -> crate::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(crate::Error::EncodeReport)
    }
}
