use std::path::{Path, PathBuf};

use axum::body::Bytes;
use axum::extract::multipart::Field;
use axum::extract::Multipart;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::ApiError;

/// Multipart field carrying the uploaded media.
pub const FILE_FIELD: &str = "file";

/// Advance to the `file` field, skipping any others. `None` if the form has
/// no such field.
pub async fn file_field<'a>(multipart: &'a mut Multipart) -> Result<Option<Field<'a>>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(FILE_FIELD) {
            // SAFETY: NLL rejects returning a borrow from one loop iteration
            // while re-borrowing in the next (sound under Polonius). We return
            // immediately, so this is the only live borrow of `multipart`.
            let field = unsafe { std::mem::transmute::<Field<'_>, Field<'a>>(field) };
            return Ok(Some(field));
        }
        debug!(name = ?field.name(), "ignoring multipart field");
    }
    Ok(None)
}

pub fn filename(field: &Field<'_>) -> String {
    field.file_name().unwrap_or_default().to_string()
}

/// Read a whole field into memory (still images).
pub async fn read_bytes(field: Field<'_>) -> Result<Bytes, ApiError> {
    Ok(field.bytes().await?)
}

/// Stream a field to a temp file in `dir` (or the OS temp dir), returning
/// the file and the number of bytes written.
///
/// The returned handle owns the file: it is deleted when the handle drops,
/// including when this function fails part-way.
pub async fn stage_to_temp(
    mut field: Field<'_>,
    dir: Option<&Path>,
    original_name: &str,
) -> Result<(NamedTempFile, u64), ApiError> {
    let suffix = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let dir: PathBuf = dir.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir);

    let staged = tempfile::Builder::new()
        .prefix("emotion-upload-")
        .suffix(&suffix)
        .tempfile_in(&dir)
        .map_err(|e| ApiError::Internal(format!("failed to create temp file in {}: {e}", dir.display())))?;
    let handle = staged
        .reopen()
        .map_err(|e| ApiError::Internal(format!("failed to open temp file: {e}")))?;
    let mut file = tokio::fs::File::from_std(handle);

    let mut written: u64 = 0;
    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk)
            .await
            .map_err(|e| ApiError::Internal(format!("failed to write temp file: {e}")))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| ApiError::Internal(format!("failed to flush temp file: {e}")))?;

    debug!(path = %staged.path().display(), bytes = written, "upload staged");
    Ok((staged, written))
}
