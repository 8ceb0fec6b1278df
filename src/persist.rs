use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::AsyncWriteExt;

use crate::constants;
use crate::field_map::{FieldMap, FieldValue};
use crate::file::FileRecord;
use crate::option::UploadOptions;

static LAST_PREFIX: AtomicU64 = AtomicU64::new(0);

/// A file written to its upload directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    pub field_name: String,
    pub original_file_name: String,
    /// The name the file was saved under, `{prefix}_{original}`.
    pub file_name: String,
    pub path: PathBuf,
}

/// Milliseconds since the Unix epoch, bumped past the last value handed out so two
/// files saved in the same millisecond still get distinct prefixes.
pub(crate) fn next_prefix() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0);

    let mut prev = LAST_PREFIX.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_PREFIX.compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

/// Strips any directory components a client put in the file name.
pub(crate) fn sanitize_file_name(file_name: &str) -> &str {
    let base = file_name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();

    match base {
        "" | "." | ".." => constants::FALLBACK_FILE_NAME,
        base => base,
    }
}

pub(crate) fn saved_file_name(original: &str) -> String {
    format!("{}_{}", next_prefix(), sanitize_file_name(original))
}

/// Writes `data` to a file that must not exist yet, so a name collision with another
/// process fails instead of overwriting. A partially written file is removed.
async fn write_new(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;

    let written = match file.write_all(data).await {
        Ok(()) => file.flush().await,
        Err(err) => Err(err),
    };

    if written.is_err() {
        drop(file);
        let _ = tokio::fs::remove_file(path).await;
    }
    written
}

#[derive(Debug, Default)]
struct Persister {
    ensured_dirs: HashSet<PathBuf>,
    written: Vec<PathBuf>,
}

impl Persister {
    async fn ensure_dir(&mut self, dir: &Path, field_name: &str) -> crate::Result<()> {
        if self.ensured_dirs.contains(dir) {
            return Ok(());
        }

        if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|cause| crate::Error::CreateDirFailed {
                    field_name: field_name.to_owned(),
                    path: dir.to_path_buf(),
                    cause,
                })?;

            log::debug!("Created upload directory {}", dir.display());
        }

        self.ensured_dirs.insert(dir.to_path_buf());
        Ok(())
    }

    async fn save(&mut self, record: &FileRecord) -> crate::Result<SavedFile> {
        let dir = record.option.upload_directory();
        self.ensure_dir(dir, &record.field_name).await?;

        let file_name = saved_file_name(&record.original_file_name);
        let path = dir.join(&file_name);

        write_new(&path, &record.buffer)
            .await
            .map_err(|cause| crate::Error::WriteFileFailed {
                field_name: record.field_name.clone(),
                file_name: record.original_file_name.clone(),
                path: path.clone(),
                cause,
            })?;

        self.written.push(path.clone());
        log::debug!(
            "Saved '{}' for field '{}' to {}",
            record.original_file_name,
            record.field_name,
            path.display()
        );

        Ok(SavedFile {
            field_name: record.field_name.clone(),
            original_file_name: record.original_file_name.clone(),
            file_name,
            path,
        })
    }

    async fn rollback(self) {
        for path in self.written {
            if let Err(err) = tokio::fs::remove_file(&path).await {
                log::warn!("Failed to remove {} after a failed upload: {}", path.display(), err);
            }
        }
    }
}

/// Writes every file in order. On the first failure the files already written are
/// removed and the error is returned; the remaining files are not attempted.
pub(crate) async fn persist_all(files: &[FileRecord]) -> crate::Result<Vec<SavedFile>> {
    let mut persister = Persister::default();
    let mut saved = Vec::with_capacity(files.len());

    for record in files {
        match persister.save(record).await {
            Ok(file) => saved.push(file),
            Err(err) => {
                persister.rollback().await;
                return Err(err);
            }
        }
    }

    Ok(saved)
}

/// Replaces the original file names recorded while streaming with the saved names:
/// a single name for single-file fields, the ordered names otherwise.
pub(crate) fn rewrite_body(body: &mut FieldMap, saved: &[SavedFile], options: &UploadOptions) {
    let mut rewritten = HashSet::new();

    for file in saved {
        let field_name = file.field_name.as_str();
        if rewritten.insert(field_name) {
            body.remove(field_name);
        }

        if options.is_multiple(field_name) {
            body.push(field_name, file.file_name.as_str());
        } else {
            body.insert(field_name, FieldValue::Single(file.file_name.clone()));
        }
    }
}
