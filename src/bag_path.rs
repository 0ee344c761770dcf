use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::BagError;

pub const BAG_NAME_PREFIX: &str = "encode_bag";
pub const TEMP_DIR_PREFIX: &str = "encode2bag_";

pub fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d_%H.%M.%S").to_string()
}

pub fn default_bag_name() -> String {
    format!("{BAG_NAME_PREFIX}_{}", timestamp())
}

/// Without a base path a fresh temporary directory is created and kept.
pub fn resolve(output_name: Option<&str>, output_base: Option<&Path>) -> Result<PathBuf, BagError> {
    let name = output_name
        .map(str::to_string)
        .unwrap_or_else(default_bag_name);
    let base = match output_base {
        Some(base) => base.to_path_buf(),
        None => tempfile::Builder::new()
            .prefix(TEMP_DIR_PREFIX)
            .tempdir()
            .map_err(|err| BagError::Filesystem(format!("create temp dir: {err}")))?
            .keep(),
    };
    std::path::absolute(base.join(name)).map_err(|err| BagError::Filesystem(err.to_string()))
}

/// Leaves a fresh empty directory at `path`.
///
/// An existing directory is deleted when `overwrite` is set, otherwise it is
/// moved aside to `<path>_<timestamp>` and the backup location is returned.
pub fn ensure_exists(path: &Path, overwrite: bool) -> Result<Option<PathBuf>, BagError> {
    let mut backup = None;
    if path.exists() {
        if overwrite {
            info!(path = %path.display(), "removing existing bag directory");
            remove_path(path)?;
        } else {
            let saved = backup_path(path);
            warn!(
                "specified bag directory already exists -- moving it to {}",
                saved.display()
            );
            fs::rename(path, &saved).map_err(|err| {
                BagError::Filesystem(format!(
                    "move {} to {}: {err}",
                    path.display(),
                    saved.display()
                ))
            })?;
            backup = Some(saved);
        }
    }
    fs::create_dir_all(path)
        .map_err(|err| BagError::Filesystem(format!("create {}: {err}", path.display())))?;
    Ok(backup)
}

fn backup_path(path: &Path) -> PathBuf {
    let base = format!("{}_{}", path.display(), timestamp());
    let mut candidate = PathBuf::from(&base);
    let mut counter = 1;
    while candidate.exists() {
        candidate = PathBuf::from(format!("{base}_{counter}"));
        counter += 1;
    }
    candidate
}

fn remove_path(path: &Path) -> Result<(), BagError> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|err| BagError::Filesystem(format!("remove {}: {err}", path.display())))
}
