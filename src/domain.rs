use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::BagError;

pub const ENCODE_FILE_URL: &str = "File download URL";
pub const ENCODE_FILE_SIZE: &str = "Size";
pub const ENCODE_FILE_MD5SUM: &str = "md5sum";
pub const ENCODE_FILE_FORMAT: &str = "File format";
pub const ENCODE_BIOSAMPLE_TERM_ID: &str = "Biosample term id";

pub const REQUIRED_COLUMNS: [&str; 3] = [ENCODE_FILE_URL, ENCODE_FILE_SIZE, ENCODE_FILE_MD5SUM];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Zip,
    Tar,
    Tgz,
}

impl ArchiveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::Tgz => "tgz",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl FromStr for ArchiveFormat {
    type Err = BagError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "zip" => Ok(ArchiveFormat::Zip),
            "tar" => Ok(ArchiveFormat::Tar),
            "tgz" | "tar.gz" => Ok(ArchiveFormat::Tgz),
            _ => Err(BagError::InvalidArchiveFormat(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReferenceRow {
    pub url: String,
    pub length: String,
    pub filename: String,
    pub md5: String,
    pub file_format: Option<String>,
    pub biosample_term_id: Option<String>,
}

impl FileReferenceRow {
    pub fn new(url: String, length: String, md5: String) -> Self {
        let filename = filename_from_url(&url).to_string();
        Self {
            url,
            length,
            filename,
            md5,
            file_format: None,
            biosample_term_id: None,
        }
    }
}

// Fields stay in alphabetical order; serialized keys must come out sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileManifestEntry {
    pub filename: String,
    pub length: String,
    pub md5: String,
    pub url: String,
}

impl From<&FileReferenceRow> for RemoteFileManifestEntry {
    fn from(row: &FileReferenceRow) -> Self {
        Self {
            filename: row.filename.clone(),
            length: row.length.clone(),
            md5: row.md5.clone(),
            url: row.url.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Creator {
    pub name: Option<String>,
    pub uri: Option<String>,
    pub orcid: Option<String>,
}

/// Returns the last `/`-separated segment of `url`, or the whole string when it
/// has no `/`.
pub fn filename_from_url(url: &str) -> &str {
    match url.rsplit_once('/') {
        Some((_, name)) => name,
        None => url,
    }
}
