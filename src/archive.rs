//! Double-wrap archive encoder
//!
//! The fetched file is packed into an AES-256 encrypted ZIP, and that ZIP is
//! packed again, under a random name, into a second encrypted ZIP.

use crate::error::ArchiveError;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{AesMode, CompressionMethod, ZipWriter};

/// Password protecting both archive layers
///
/// Fixed and publicly known: the encryption only hides the payload from
/// content scanners in transit, it does not keep anything confidential.
pub const ARCHIVE_PASSWORD: &str = "password";

/// Package `source` into a double-wrapped archive at `destination`
///
/// `entry_name` names the file inside the inner archive and must already be
/// sanitized. Returns the name of the outer archive's single entry
/// (`<uuid>.zip`). The intermediate archive is always removed; `destination`
/// is removed as well when packaging fails.
pub async fn double_wrap(
    source: &Path,
    destination: &Path,
    entry_name: &str,
) -> Result<String, ArchiveError> {
    let source = source.to_path_buf();
    let destination = destination.to_path_buf();
    let entry_name = entry_name.to_string();

    tokio::task::spawn_blocking(move || double_wrap_blocking(&source, &destination, &entry_name))
        .await
        .map_err(|e| ArchiveError::Task(e.to_string()))?
}

/// Path of the intermediate archive written next to `destination`
pub fn inner_archive_path(destination: &Path) -> PathBuf {
    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    destination.with_file_name(format!("{stem}_inner.zip"))
}

fn double_wrap_blocking(
    source: &Path,
    destination: &Path,
    entry_name: &str,
) -> Result<String, ArchiveError> {
    let inner = inner_archive_path(destination);

    let result = write_layers(source, &inner, destination, entry_name);

    remove_quietly(&inner);
    if result.is_err() {
        remove_quietly(destination);
    }
    result
}

fn write_layers(
    source: &Path,
    inner: &Path,
    destination: &Path,
    entry_name: &str,
) -> Result<String, ArchiveError> {
    write_encrypted(source, inner, entry_name)?;

    let outer_entry = format!("{}.zip", Uuid::new_v4());
    write_encrypted(inner, destination, &outer_entry)?;

    tracing::debug!(
        archive = %destination.display(),
        inner_entry = entry_name,
        outer_entry = %outer_entry,
        "archive written"
    );
    Ok(outer_entry)
}

/// Write a single-entry encrypted ZIP at `archive` holding the bytes of `source`
fn write_encrypted(source: &Path, archive: &Path, entry_name: &str) -> Result<(), ArchiveError> {
    let mut input = File::open(source)?;
    let output = File::create(archive)?;

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .with_aes_encryption(AesMode::Aes256, ARCHIVE_PASSWORD);

    let mut writer = ZipWriter::new(output);
    writer.start_file(entry_name, options)?;
    io::copy(&mut input, &mut writer)?;

    let output = writer.finish()?;
    output.sync_all()?;
    Ok(())
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove archive file");
    }
}
