use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::option::UploadOption;
use crate::report::{ValidationError, Violation};

/// A file that streamed in without violating its size limit, buffered in memory
/// until it is persisted.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub(crate) field_name: String,
    pub(crate) original_file_name: String,
    pub(crate) buffer: Bytes,
    pub(crate) option: Arc<UploadOption>,
}

impl FileRecord {
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn original_file_name(&self) -> &str {
        &self.original_file_name
    }

    pub fn bytes(&self) -> &Bytes {
        &self.buffer
    }

    pub fn option(&self) -> &UploadOption {
        &self.option
    }
}

/// Buffers the chunks of one gated file part, enforcing the size ceiling as the
/// chunks arrive.
#[derive(Debug)]
pub struct FileAccumulator {
    field_name: String,
    file_name: String,
    option: Arc<UploadOption>,
    chunks: Vec<Bytes>,
    size: u64,
    oversized: bool,
    abandoned: bool,
}

impl FileAccumulator {
    pub(crate) fn new(field_name: String, file_name: String, option: Arc<UploadOption>) -> FileAccumulator {
        FileAccumulator {
            field_name,
            file_name,
            option,
            chunks: Vec::new(),
            size: 0,
            oversized: false,
            abandoned: false,
        }
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Total bytes received so far, including bytes dropped after the limit was hit.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_oversized(&self) -> bool {
        self.oversized
    }

    /// Adds a chunk. Returns the size error the first time the running total goes
    /// past the limit; from then on chunks are counted but no longer buffered.
    pub(crate) fn push(&mut self, chunk: Bytes) -> Option<ValidationError> {
        self.size += chunk.len() as u64;

        if self.oversized {
            return None;
        }

        if self.size > self.option.max_size {
            self.oversized = true;
            self.chunks = Vec::new();

            return Some(ValidationError::file(
                Violation::SizeExceeded,
                &self.field_name,
                &self.file_name,
                self.option.size_exceeded_message(&self.field_name),
            ));
        }

        self.chunks.push(chunk);
        None
    }

    /// Marks the part as no longer consumed because the request already ended.
    pub(crate) fn abandon(&mut self) {
        self.abandoned = true;
        self.chunks = Vec::new();
    }

    /// Concatenates the buffered chunks into a record, unless the file went over its
    /// size limit or was abandoned.
    pub(crate) fn finish(self) -> Option<FileRecord> {
        if self.oversized || self.abandoned {
            return None;
        }

        let buffer = match self.chunks.len() {
            0 => Bytes::new(),
            1 => self.chunks.into_iter().next().unwrap_or_default(),
            _ => {
                let mut buf = BytesMut::with_capacity(self.size as usize);
                for chunk in &self.chunks {
                    buf.extend_from_slice(chunk);
                }
                buf.freeze()
            }
        };

        Some(FileRecord {
            field_name: self.field_name,
            original_file_name: self.file_name,
            buffer,
            option: self.option,
        })
    }
}
