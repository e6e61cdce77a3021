//! Single-entry zip archives around JSON payloads.
//!
//! Raw measurement pages compress extremely well (roughly fifty-fold), so
//! every payload is stored as a maximally deflated archive holding one entry.

use crate::storage::error::StorageError;
use crate::storage::BlobStore;
use serde_json::Value;
use std::io::{Cursor, Write};
use tokio::task;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Compresses UTF-8 text into an in-memory zip archive with a single entry.
///
/// The entry carries a fixed timestamp so re-archiving the same payload yields
/// byte-identical blobs.
pub fn compress_entry(entry_name: &str, text: &str) -> Result<Vec<u8>, StorageError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9))
        .last_modified_time(DateTime::default());

    writer
        .start_file(entry_name, options)
        .map_err(|e| StorageError::Zip(entry_name.to_string(), e))?;
    writer
        .write_all(text.as_bytes())
        .map_err(|e| StorageError::Io(entry_name.to_string(), e))?;
    let cursor = writer
        .finish()
        .map_err(|e| StorageError::Zip(entry_name.to_string(), e))?;

    Ok(cursor.into_inner())
}

/// Pretty-prints `payload`, wraps it in a single-entry archive named after the
/// key (minus the `.zip` suffix), and stores the archive bytes under `key`.
pub async fn store_compressed<S: BlobStore + ?Sized>(
    store: &S,
    key: &str,
    payload: &Value,
) -> Result<(), StorageError> {
    let text = serde_json::to_string_pretty(payload)
        .map_err(|e| StorageError::Serialize(key.to_string(), e))?;
    let entry_name = key.strip_suffix(".zip").unwrap_or(key).to_string();

    let bytes = task::spawn_blocking(move || compress_entry(&entry_name, &text)).await??;
    store.put(key, bytes).await
}
