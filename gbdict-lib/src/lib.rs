use serde::{Deserialize, Serialize};

/// Dictionary file produced by the dictionary generator.
pub const DEFAULT_INPUT: &str = "output/personal_dictionary.txt";
/// Directory the archive is written into.
pub const DEFAULT_OUTPUT_DIR: &str = "output";
/// Where `unpack` writes the extracted dictionary when no path is given.
pub const DEFAULT_EXTRACT_OUTPUT: &str = "output/extracted_dictionary.txt";
/// Glob used to pick the dictionary entry out of an archive.
pub const DEFAULT_ENTRY_PATTERN: &str = "*.txt";
/// Stem prefix shared by the archive file and its single entry.
pub const ARCHIVE_PREFIX: &str = "gboard_dictionary";

/// How the dictionary entry is stored inside the zip.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Stored,
    Deflate,
}

impl From<bool> for Compression {
    fn from(compress: bool) -> Self {
        if compress {
            Compression::Deflate
        } else {
            Compression::Stored
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub input: Option<String>,
    pub output_dir: Option<String>,
    pub config: Option<String>,
    pub compress: Option<bool>,
    pub dry: Option<bool>,
}

impl Config {
    pub fn input_or_default(&self) -> &str {
        self.input.as_deref().unwrap_or(DEFAULT_INPUT)
    }

    pub fn output_dir_or_default(&self) -> &str {
        self.output_dir.as_deref().unwrap_or(DEFAULT_OUTPUT_DIR)
    }

    pub fn compression(&self) -> Compression {
        Compression::from(self.compress.unwrap_or(false))
    }
}
