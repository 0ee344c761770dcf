use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::domain::ArchiveFormat;
use crate::error::BagError;

pub fn write_bytes_atomic(path: &Path, content: &[u8]) -> Result<(), BagError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|err| BagError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".encode2bag-")
        .tempfile_in(parent)
        .map_err(|err| BagError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| BagError::Filesystem(err.to_string()))?;
    temp.flush()
        .map_err(|err| BagError::Filesystem(err.to_string()))?;
    temp.persist(path)
        .map_err(|err| BagError::Filesystem(format!("write {}: {err}", path.display())))?;
    Ok(())
}

pub fn copy_into(source: &Path, directory: &Path) -> Result<PathBuf, BagError> {
    let name = source.file_name().ok_or_else(|| {
        BagError::Filesystem(format!("not a file path: {}", source.display()))
    })?;
    let target = directory.join(name);
    fs::copy(source, &target).map_err(|err| {
        BagError::Filesystem(format!(
            "copy {} to {}: {err}",
            source.display(),
            target.display()
        ))
    })?;
    Ok(target)
}

/// Writes `<directory>.<ext>`; entries are prefixed with the directory name.
pub fn archive_directory(directory: &Path, format: ArchiveFormat) -> Result<PathBuf, BagError> {
    let name = directory
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            BagError::Packaging(format!("cannot archive {}", directory.display()))
        })?
        .to_string();
    let archive_path = directory.with_file_name(format!("{name}.{}", format.extension()));
    let file = File::create(&archive_path).map_err(|err| {
        BagError::Packaging(format!("create {}: {err}", archive_path.display()))
    })?;

    match format {
        ArchiveFormat::Zip => write_zip(directory, &name, file)?,
        ArchiveFormat::Tar => {
            let writer = write_tar(directory, &name, BufWriter::new(file))?;
            writer
                .into_inner()
                .map_err(|err| BagError::Packaging(err.to_string()))?;
        }
        ArchiveFormat::Tgz => {
            let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            let encoder = write_tar(directory, &name, encoder)?;
            encoder
                .finish()
                .map_err(|err| BagError::Packaging(err.to_string()))?
                .flush()
                .map_err(|err| BagError::Packaging(err.to_string()))?;
        }
    }
    Ok(archive_path)
}

fn write_zip(directory: &Path, prefix: &str, file: File) -> Result<(), BagError> {
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.add_directory(format!("{prefix}/"), options)
        .map_err(|err| BagError::Packaging(err.to_string()))?;

    for (path, relative) in sorted_entries(directory)? {
        let entry_name = format!("{prefix}/{relative}");
        if path.is_dir() {
            zip.add_directory(format!("{entry_name}/"), options)
                .map_err(|err| BagError::Packaging(err.to_string()))?;
            continue;
        }
        zip.start_file(entry_name, options)
            .map_err(|err| BagError::Packaging(err.to_string()))?;
        let mut source = File::open(&path)
            .map_err(|err| BagError::Packaging(format!("open {}: {err}", path.display())))?;
        io::copy(&mut source, &mut zip).map_err(|err| BagError::Packaging(err.to_string()))?;
    }
    zip.finish()
        .map_err(|err| BagError::Packaging(err.to_string()))?;
    Ok(())
}

fn write_tar<W: Write>(directory: &Path, prefix: &str, writer: W) -> Result<W, BagError> {
    let mut builder = tar::Builder::new(writer);
    builder.follow_symlinks(false);
    builder
        .append_dir(prefix, directory)
        .map_err(|err| BagError::Packaging(err.to_string()))?;
    for (path, relative) in sorted_entries(directory)? {
        let entry_name = format!("{prefix}/{relative}");
        let result = if path.is_dir() {
            builder.append_dir(&entry_name, &path)
        } else {
            builder.append_path_with_name(&path, &entry_name)
        };
        result.map_err(|err| BagError::Packaging(format!("{entry_name}: {err}")))?;
    }
    builder
        .into_inner()
        .map_err(|err| BagError::Packaging(err.to_string()))
}

fn sorted_entries(root: &Path) -> Result<Vec<(PathBuf, String)>, BagError> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|err| BagError::Filesystem(err.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|err| BagError::Filesystem(err.to_string()))?;
        entries.push((entry.path().to_path_buf(), slash_path(relative)?));
    }
    Ok(entries)
}

pub fn slash_path(relative: &Path) -> Result<String, BagError> {
    let mut parts = Vec::new();
    for component in relative.components() {
        let part = component.as_os_str().to_str().ok_or_else(|| {
            BagError::Filesystem(format!("non-UTF-8 path: {}", relative.display()))
        })?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}
