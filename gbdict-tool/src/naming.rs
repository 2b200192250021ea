use chrono::NaiveDateTime;
use gbdict_lib::ARCHIVE_PREFIX;
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Names derived from a single invocation timestamp. The archive file and
/// the entry inside it always share the same stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveNames {
    pub stem: String,
}

impl ArchiveNames {
    pub fn at(timestamp: &NaiveDateTime) -> Self {
        Self {
            stem: format!("{ARCHIVE_PREFIX}_{}", format_timestamp(timestamp)),
        }
    }

    pub fn archive_file_name(&self) -> String {
        format!("{}.zip", self.stem)
    }

    pub fn entry_name(&self) -> String {
        format!("{}.txt", self.stem)
    }

    pub fn archive_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(self.archive_file_name())
    }
}

/// Formats wall-clock time as `YYYYMMDD_HHMMSS`.
pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}
