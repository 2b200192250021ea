use chrono::{DateTime, Local, NaiveDateTime};
use gbdict_lib::Compression;
use glob::Pattern;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::runtime::Builder;
use tracing::{debug, info};

use crate::error::{PackError, Result};
use crate::fs_utils::{ensure_dir, remove_partial};
use crate::naming::ArchiveNames;

pub mod zip;

/// Everything needed to package one dictionary file.
#[derive(Debug, Clone)]
pub struct PackRequest {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub compression: Compression,
    /// Wall-clock time the archive and entry names are derived from.
    pub timestamp: NaiveDateTime,
}

/// Where a pack run will write, computed without touching the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackPlan {
    pub archive_path: PathBuf,
    pub entry_name: String,
}

#[derive(Debug, Clone)]
pub struct PackageOutcome {
    pub archive_path: PathBuf,
    pub entry_name: String,
    pub input_size: u64,
    pub archive_size: u64,
}

#[derive(Debug, Clone)]
pub struct UnpackRequest {
    pub archive: PathBuf,
    pub output: PathBuf,
    pub pattern: String,
}

#[derive(Debug, Clone)]
pub struct UnpackOutcome {
    pub entry_name: String,
    pub output_path: PathBuf,
    pub size: u64,
}

impl PackRequest {
    pub fn plan(&self) -> PackPlan {
        let names = ArchiveNames::at(&self.timestamp);
        PackPlan {
            archive_path: names.archive_path(&self.output_dir),
            entry_name: names.entry_name(),
        }
    }
}

/// Runs `fut` to completion on a current-thread runtime so callers stay
/// synchronous and no worker threads are spawned.
fn block_on<F, T>(fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let rt = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(PackError::Runtime)?;
    rt.block_on(fut)
}

/// Packages `request.input` into `<output_dir>/gboard_dictionary_<ts>.zip`.
///
/// The input is read before anything is created, so a missing input leaves
/// the filesystem untouched.
pub fn package(request: &PackRequest) -> Result<PackageOutcome> {
    block_on(package_async(request))
}

pub async fn package_async(request: &PackRequest) -> Result<PackageOutcome> {
    let data = tokio::fs::read(&request.input)
        .await
        .map_err(|source| PackError::MissingInputFile {
            path: request.input.clone(),
            source,
        })?;

    let plan = request.plan();
    debug!(
        input = %request.input.display(),
        archive = %plan.archive_path.display(),
        entry = %plan.entry_name,
        compression = ?request.compression,
        "packaging dictionary"
    );

    let modified = input_modified(&request.input)
        .await
        .unwrap_or(request.timestamp);

    ensure_dir(&request.output_dir).await?;

    // Only a file this run opened is cleaned up on failure.
    let mut file = File::create(&plan.archive_path)
        .await
        .map_err(|e| PackError::archive_write(&plan.archive_path, e))?;

    let written = zip::write_single_entry(
        &mut file,
        &plan.entry_name,
        &data,
        request.compression,
        modified,
    )
    .await;
    drop(file);

    let archive_size = match written {
        Ok(size) => size,
        Err(e) => {
            remove_partial(&plan.archive_path).await;
            return Err(PackError::archive_write(&plan.archive_path, e));
        }
    };

    info!(archive = %plan.archive_path.display(), bytes = archive_size, "archive written");

    Ok(PackageOutcome {
        archive_path: plan.archive_path,
        entry_name: plan.entry_name,
        input_size: data.len() as u64,
        archive_size,
    })
}

/// Local modification time of `path`, if the platform reports one.
async fn input_modified(path: &Path) -> Option<NaiveDateTime> {
    let modified = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
    Some(DateTime::<Local>::from(modified).naive_local())
}

/// Extracts the first entry matching `request.pattern` into `request.output`.
pub fn unpack(request: &UnpackRequest) -> Result<UnpackOutcome> {
    block_on(unpack_async(request))
}

pub async fn unpack_async(request: &UnpackRequest) -> Result<UnpackOutcome> {
    let pattern = Pattern::new(&request.pattern).map_err(|source| PackError::InvalidPattern {
        pattern: request.pattern.clone(),
        source,
    })?;

    match tokio::fs::try_exists(&request.archive).await {
        Ok(true) => {}
        Ok(false) => {
            return Err(PackError::MissingArchive {
                path: request.archive.clone(),
            });
        }
        Err(e) => {
            return Err(PackError::ArchiveReadFailure {
                path: request.archive.clone(),
                source: e.into(),
            });
        }
    }

    let entry = zip::read_first_matching(&request.archive, &pattern)
        .await
        .map_err(|e| PackError::ArchiveReadFailure {
            path: request.archive.clone(),
            source: e.into(),
        })?
        .ok_or_else(|| PackError::NoMatchingEntry {
            path: request.archive.clone(),
            pattern: request.pattern.clone(),
        })?;

    debug!(entry = %entry.name, archive = %request.archive.display(), "extracting entry");

    if let Some(parent) = request.output.parent() {
        ensure_dir(parent).await?;
    }
    write_output(&request.output, &entry.data).await?;

    info!(output = %request.output.display(), bytes = entry.data.len(), "dictionary extracted");

    Ok(UnpackOutcome {
        entry_name: entry.name,
        output_path: request.output.clone(),
        size: entry.data.len() as u64,
    })
}

async fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    tokio::fs::write(path, data)
        .await
        .map_err(|source| PackError::OutputWriteFailure {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::tempdir;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 31)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn request(input: &Path, output_dir: &Path, timestamp: NaiveDateTime) -> PackRequest {
        PackRequest {
            input: input.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            compression: Compression::Stored,
            timestamp,
        }
    }

    fn read_back(archive: &Path) -> (Vec<String>, Vec<u8>) {
        block_on(async {
            let names = zip::list_entries(archive).await.unwrap();
            let entry = zip::read_first_matching(archive, &Pattern::new("*").unwrap())
                .await
                .unwrap()
                .unwrap();
            Ok((names, entry.data))
        })
        .unwrap()
    }

    #[test]
    fn packs_hello_world_verbatim() {
        let tmp = tempdir().unwrap();
        let input = tmp.path().join("personal_dictionary.txt");
        fs::write(&input, "hello\nworld\n").unwrap();
        let out = tmp.path().join("output");

        let outcome = package(&request(&input, &out, at(14, 3, 9))).unwrap();

        assert_eq!(
            outcome.archive_path,
            out.join("gboard_dictionary_20250131_140309.zip")
        );
        assert_eq!(outcome.entry_name, "gboard_dictionary_20250131_140309.txt");
        assert_eq!(outcome.input_size, 12);

        let (names, data) = read_back(&outcome.archive_path);
        assert_eq!(names, vec!["gboard_dictionary_20250131_140309.txt".to_string()]);
        assert_eq!(data, b"hello\nworld\n");
    }

    #[test]
    fn deflate_keeps_bytes_exact() {
        let tmp = tempdir().unwrap();
        let input = tmp.path().join("dict.txt");
        let bytes: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        fs::write(&input, &bytes).unwrap();

        let mut req = request(&input, tmp.path(), at(0, 0, 0));
        req.compression = Compression::Deflate;
        let outcome = package(&req).unwrap();

        let (_, data) = read_back(&outcome.archive_path);
        assert_eq!(data, bytes);
    }

    #[test]
    fn existing_output_dir_is_fine() {
        let tmp = tempdir().unwrap();
        let input = tmp.path().join("dict.txt");
        fs::write(&input, "a\n").unwrap();
        let out = tmp.path().join("output");
        fs::create_dir_all(&out).unwrap();

        assert!(package(&request(&input, &out, at(1, 2, 3))).is_ok());
        assert!(package(&request(&input, &out, at(1, 2, 4))).is_ok());
        assert_eq!(fs::read_dir(&out).unwrap().count(), 2);
    }

    #[test]
    fn same_second_collides_and_overwrites() {
        let tmp = tempdir().unwrap();
        let input = tmp.path().join("dict.txt");
        let out = tmp.path().join("output");

        fs::write(&input, "first\n").unwrap();
        let a = package(&request(&input, &out, at(8, 0, 0))).unwrap();
        fs::write(&input, "second\n").unwrap();
        let b = package(&request(&input, &out, at(8, 0, 0))).unwrap();

        assert_eq!(a.entry_name, b.entry_name);
        assert_eq!(a.archive_path, b.archive_path);
        assert_eq!(fs::read_dir(&out).unwrap().count(), 1);
        let (_, data) = read_back(&b.archive_path);
        assert_eq!(data, b"second\n");
    }

    #[test]
    fn missing_input_creates_nothing() {
        let tmp = tempdir().unwrap();
        let out = tmp.path().join("output");

        let err = package(&request(&tmp.path().join("absent.txt"), &out, at(1, 1, 1))).unwrap_err();

        assert!(matches!(err, PackError::MissingInputFile { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn uncreatable_output_dir_is_reported() {
        let tmp = tempdir().unwrap();
        let input = tmp.path().join("dict.txt");
        fs::write(&input, "a\n").unwrap();
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, "").unwrap();

        let err = package(&request(&input, &blocker.join("out"), at(1, 1, 1))).unwrap_err();
        assert!(matches!(err, PackError::DirectoryCreationFailure { .. }));
    }

    #[test]
    fn archive_path_taken_by_directory_fails_write() {
        let tmp = tempdir().unwrap();
        let input = tmp.path().join("dict.txt");
        fs::write(&input, "a\n").unwrap();
        let req = request(&input, tmp.path(), at(2, 2, 2));
        fs::create_dir_all(req.plan().archive_path).unwrap();

        let err = package(&req).unwrap_err();
        assert!(matches!(err, PackError::ArchiveWriteFailure { .. }));
        assert!(req.plan().archive_path.is_dir());
    }

    #[test]
    fn entry_is_stamped_with_input_mtime() {
        let tmp = tempdir().unwrap();
        let input = tmp.path().join("dict.txt");
        fs::write(&input, "a\n").unwrap();
        // even second: DOS time keeps two-second resolution
        let mtime = std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
        fs::File::options()
            .write(true)
            .open(&input)
            .unwrap()
            .set_modified(mtime)
            .unwrap();

        let outcome = package(&request(&input, tmp.path(), at(5, 5, 5))).unwrap();

        let expected = DateTime::<Local>::from(mtime).naive_local();
        let date = block_on(async { Ok(zip::first_entry_date(&outcome.archive_path).await.unwrap()) })
            .unwrap();
        let stored = NaiveDate::from_ymd_opt(date.year() as i32, date.month() as u32, date.day() as u32)
            .unwrap()
            .and_hms_opt(date.hour() as u32, date.minute() as u32, date.second() as u32)
            .unwrap();
        assert_eq!(stored, expected);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_write_removes_partial_archive() {
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        let tmp = tempdir().unwrap();
        let input = tmp.path().join("dict.txt");
        fs::write(&input, "hello\nworld\n").unwrap();
        let req = request(&input, tmp.path(), at(6, 6, 6));
        let archive = req.plan().archive_path;
        std::os::unix::fs::symlink(full, &archive).unwrap();

        let err = package(&req).unwrap_err();

        assert!(matches!(err, PackError::ArchiveWriteFailure { .. }));
        assert!(fs::symlink_metadata(&archive).is_err());
    }

    #[test]
    fn unopenable_archive_is_left_alone() {
        let tmp = tempdir().unwrap();
        let input = tmp.path().join("dict.txt");
        fs::write(&input, "new\n").unwrap();
        let req = request(&input, tmp.path(), at(7, 7, 7));
        let archive = req.plan().archive_path;
        fs::write(&archive, "keep").unwrap();
        let mut perms = fs::metadata(&archive).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&archive, perms).unwrap();
        if fs::File::options().write(true).open(&archive).is_ok() {
            // privileged user, read-only bit is not enforced
            return;
        }

        let err = package(&req).unwrap_err();

        assert!(matches!(err, PackError::ArchiveWriteFailure { .. }));
        assert_eq!(fs::read(&archive).unwrap(), b"keep");
    }

    #[test]
    fn unpack_restores_packed_dictionary() {
        let tmp = tempdir().unwrap();
        let input = tmp.path().join("dict.txt");
        fs::write(&input, "hello\nworld\n").unwrap();
        let packed = package(&request(&input, tmp.path(), at(9, 9, 9))).unwrap();

        let target = tmp.path().join("restored/extracted_dictionary.txt");
        let outcome = unpack(&UnpackRequest {
            archive: packed.archive_path,
            output: target.clone(),
            pattern: "*.txt".into(),
        })
        .unwrap();

        assert_eq!(outcome.entry_name, packed.entry_name);
        assert_eq!(outcome.size, 12);
        assert_eq!(fs::read(&target).unwrap(), b"hello\nworld\n");
    }

    #[test]
    fn unpack_reports_missing_archive() {
        let tmp = tempdir().unwrap();
        let err = unpack(&UnpackRequest {
            archive: tmp.path().join("nope.zip"),
            output: tmp.path().join("out.txt"),
            pattern: "*.txt".into(),
        })
        .unwrap_err();
        assert!(matches!(err, PackError::MissingArchive { .. }));
    }

    #[test]
    fn unpack_reports_no_match() {
        let tmp = tempdir().unwrap();
        let input = tmp.path().join("dict.txt");
        fs::write(&input, "x").unwrap();
        let packed = package(&request(&input, tmp.path(), at(3, 3, 3))).unwrap();

        let output = tmp.path().join("out.csv");
        let err = unpack(&UnpackRequest {
            archive: packed.archive_path,
            output: output.clone(),
            pattern: "*.csv".into(),
        })
        .unwrap_err();
        assert!(matches!(err, PackError::NoMatchingEntry { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn unpack_uninspectable_path_is_a_read_failure() {
        let tmp = tempdir().unwrap();
        let plain = tmp.path().join("plain");
        fs::write(&plain, "").unwrap();

        let err = unpack(&UnpackRequest {
            archive: plain.join("a.zip"),
            output: tmp.path().join("out.txt"),
            pattern: "*.txt".into(),
        })
        .unwrap_err();
        assert!(matches!(err, PackError::ArchiveReadFailure { .. }));
    }

    #[test]
    fn unpack_rejects_corrupt_archive() {
        let tmp = tempdir().unwrap();
        let archive = tmp.path().join("broken.zip");
        fs::write(&archive, "PK but not really").unwrap();

        let err = unpack(&UnpackRequest {
            archive,
            output: tmp.path().join("out.txt"),
            pattern: "*.txt".into(),
        })
        .unwrap_err();
        assert!(matches!(err, PackError::ArchiveReadFailure { .. }));
    }

    #[test]
    fn unpack_rejects_bad_pattern() {
        let tmp = tempdir().unwrap();
        let err = unpack(&UnpackRequest {
            archive: tmp.path().join("a.zip"),
            output: tmp.path().join("out.txt"),
            pattern: "[".into(),
        })
        .unwrap_err();
        assert!(matches!(err, PackError::InvalidPattern { .. }));
    }
}
