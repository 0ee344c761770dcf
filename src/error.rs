use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum BagError {
    #[error(
        "one or more required column names {missing:?} was not found in the column header {header:?}"
    )]
    #[diagnostic(
        code(encode2bag::schema),
        help("ENCODE metadata exports must carry the `File download URL`, `Size` and `md5sum` columns")
    )]
    SchemaValidation {
        missing: Vec<String>,
        header: Vec<String>,
    },

    #[error("malformed metadata row at line {line}: {message}")]
    #[diagnostic(code(encode2bag::schema))]
    MetadataRow { line: u64, message: String },

    #[error("failed to read metadata file {path}: {message}")]
    MetadataRead { path: PathBuf, message: String },

    #[error("file [{path}] transfer failed: host {host} responded with status {status}: {body}")]
    #[diagnostic(code(encode2bag::transfer))]
    Transfer {
        path: PathBuf,
        host: String,
        status: u16,
        body: String,
    },

    #[error("HTTP request failed: {0}")]
    #[diagnostic(code(encode2bag::transfer))]
    Http(String),

    #[error("unable to locate metadata file URL in batch download file manifest {path}")]
    #[diagnostic(code(encode2bag::resolution))]
    Resolution { path: PathBuf },

    #[error("bag creation failed: {0}")]
    #[diagnostic(code(encode2bag::packaging))]
    Packaging(String),

    #[error("invalid bag: {0}")]
    #[diagnostic(code(encode2bag::packaging))]
    InvalidBag(String),

    #[error("bag is incomplete: {} file(s) listed in fetch.txt are not present: {missing:?}", missing.len())]
    #[diagnostic(code(encode2bag::packaging))]
    IncompleteBag { missing: Vec<String> },

    #[error("invalid archive format: {0} (expected zip, tar or tgz)")]
    InvalidArchiveFormat(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SchemaValidation,
    Transfer,
    Resolution,
    Packaging,
    Io,
    Config,
}

impl BagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BagError::SchemaValidation { .. }
            | BagError::MetadataRow { .. }
            | BagError::MetadataRead { .. } => ErrorKind::SchemaValidation,
            BagError::Transfer { .. } | BagError::Http(_) => ErrorKind::Transfer,
            BagError::Resolution { .. } => ErrorKind::Resolution,
            BagError::Packaging(_)
            | BagError::InvalidBag(_)
            | BagError::IncompleteBag { .. }
            | BagError::InvalidArchiveFormat(_) => ErrorKind::Packaging,
            BagError::Filesystem(_) => ErrorKind::Io,
            BagError::ConfigRead(_) | BagError::ConfigParse(_) => ErrorKind::Config,
        }
    }
}

impl From<std::io::Error> for BagError {
    fn from(err: std::io::Error) -> Self {
        BagError::Filesystem(err.to_string())
    }
}
