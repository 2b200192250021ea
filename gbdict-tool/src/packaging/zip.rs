use async_zip::error::ZipError;
use async_zip::tokio::read::fs::ZipFileReader;
use async_zip::tokio::write::ZipFileWriter;
use async_zip::{Compression as ZipCompression, ZipDateTime, ZipEntryBuilder};
use chrono::NaiveDateTime;
use gbdict_lib::Compression;
use glob::Pattern;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::ArchiveIoError;

/// A file entry pulled out of an archive.
#[derive(Debug, Clone)]
pub struct ExtractedEntry {
    pub name: String,
    pub data: Vec<u8>,
}

fn zip_compression(compression: Compression) -> ZipCompression {
    match compression {
        Compression::Stored => ZipCompression::Stored,
        Compression::Deflate => ZipCompression::Deflate,
    }
}

/// Writes a single-entry archive into `file`, which the caller has already
/// created (and truncated). Returns the size of the finished archive.
///
/// DOS timestamps carry no zone, so `modified` is stored as local wall-clock
/// fields at two-second resolution.
pub async fn write_single_entry(
    file: &mut File,
    entry_name: &str,
    data: &[u8],
    compression: Compression,
    modified: NaiveDateTime,
) -> Result<u64, ArchiveIoError> {
    let mut writer = ZipFileWriter::with_tokio(&mut *file);
    let builder = ZipEntryBuilder::new(entry_name.to_string().into(), zip_compression(compression))
        .last_modification_date(ZipDateTime::from_chrono(&modified.and_utc()));
    writer.write_entry_whole(builder, data).await?;
    writer.close().await?;

    // tokio::fs::File completes writes in the background
    file.flush().await?;
    Ok(file.metadata().await?.len())
}

/// Reads the first file entry whose name matches `pattern`. Directory
/// entries and entries with non UTF-8 names are skipped.
pub async fn read_first_matching(
    path: &Path,
    pattern: &Pattern,
) -> Result<Option<ExtractedEntry>, ZipError> {
    let reader = ZipFileReader::new(path).await?;

    let found = reader
        .file()
        .entries()
        .iter()
        .enumerate()
        .filter(|(_, entry)| !entry.dir().unwrap_or(false))
        .find_map(|(index, entry)| {
            let name = entry.filename().as_str().ok()?;
            pattern.matches(name).then(|| (index, name.to_string()))
        });

    let Some((index, name)) = found else {
        return Ok(None);
    };

    let mut entry_reader = reader.reader_with_entry(index).await?;
    let mut data = Vec::new();
    entry_reader.read_to_end_checked(&mut data).await?;

    Ok(Some(ExtractedEntry { name, data }))
}

/// Names of every entry in the archive, in central directory order.
#[cfg(test)]
pub async fn list_entries(path: &Path) -> Result<Vec<String>, ZipError> {
    let reader = ZipFileReader::new(path).await?;
    reader
        .file()
        .entries()
        .iter()
        .map(|entry| entry.filename().as_str().map(str::to_string))
        .collect()
}

/// Modification date stored on the first entry.
#[cfg(test)]
pub async fn first_entry_date(path: &Path) -> Result<ZipDateTime, ZipError> {
    let reader = ZipFileReader::new(path).await?;
    let entries = reader.file().entries();
    Ok(entries[0].last_modification_date().clone())
}
