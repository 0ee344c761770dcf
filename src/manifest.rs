use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::domain::{FileReferenceRow, RemoteFileManifestEntry};
use crate::error::BagError;
use crate::fs_util;

pub const REMOTE_FILE_MANIFEST_NAME: &str = "remote-file-manifest.json";

pub fn build<'a, I>(rows: I) -> Vec<RemoteFileManifestEntry>
where
    I: IntoIterator<Item = &'a FileReferenceRow>,
{
    rows.into_iter().map(RemoteFileManifestEntry::from).collect()
}

pub fn to_json_bytes(entries: &[RemoteFileManifestEntry]) -> Result<Vec<u8>, BagError> {
    let mut buffer = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = Serializer::with_formatter(&mut buffer, formatter);
    entries
        .serialize(&mut serializer)
        .map_err(|err| BagError::Filesystem(err.to_string()))?;
    Ok(buffer)
}

pub fn serialize(entries: &[RemoteFileManifestEntry], destination: &Path) -> Result<(), BagError> {
    let content = to_json_bytes(entries)?;
    fs_util::write_bytes_atomic(destination, &content)
}

pub fn read(path: &Path) -> Result<Vec<RemoteFileManifestEntry>, BagError> {
    let content = fs::read_to_string(path).map_err(|err| {
        BagError::Filesystem(format!("read remote file manifest {}: {err}", path.display()))
    })?;
    serde_json::from_str(&content).map_err(|err| {
        BagError::Packaging(format!(
            "invalid remote file manifest {}: {err}",
            path.display()
        ))
    })
}
