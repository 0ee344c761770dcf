use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::checksum::{self, ChecksumAlgorithm};
use crate::domain::ArchiveFormat;
use crate::error::BagError;
use crate::fs_util;

pub const BAGIT_VERSION: &str = "0.97";
pub const BAGIT_FILE: &str = "bagit.txt";
pub const BAG_INFO_FILE: &str = "bag-info.txt";
pub const FETCH_FILE: &str = "fetch.txt";
pub const PAYLOAD_DIR: &str = "data";
pub const PAYLOAD_OXUM: &str = "Payload-Oxum";
pub const BAGGING_DATE: &str = "Bagging-Date";
pub const BAG_SOFTWARE_AGENT: &str = "Bag-Software-Agent";
pub const PROFILE_IDENTIFIER: &str = "BagIt-Profile-Identifier";

pub type BagMetadata = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy)]
pub struct BagSpec<'a> {
    pub algorithms: &'a [ChecksumAlgorithm],
    pub metadata: &'a BagMetadata,
    pub remote_file_manifest: Option<&'a Path>,
}

pub trait BagMaterializer: Send + Sync {
    fn make_bag(&self, directory: &Path, spec: &BagSpec<'_>) -> Result<(), BagError>;
    /// Re-finalizes an existing bag after tag files were added or changed.
    fn update_bag(&self, directory: &Path, metadata: &BagMetadata) -> Result<(), BagError>;
    fn archive_bag(&self, directory: &Path, format: ArchiveFormat) -> Result<PathBuf, BagError>;
    fn validate_bag(&self, directory: &Path, fast: bool) -> Result<(), BagError>;
}

#[derive(Debug, Clone)]
pub struct BagItMaterializer {
    software_agent: String,
}

impl BagItMaterializer {
    pub fn new() -> Self {
        Self {
            software_agent: format!("encode2bag {}", env!("CARGO_PKG_VERSION")),
        }
    }

    fn write_bag(
        &self,
        directory: &Path,
        algorithms: &[ChecksumAlgorithm],
        mut info: BagMetadata,
        remote: &[RemoteFile],
    ) -> Result<(), BagError> {
        if algorithms.is_empty() {
            return Err(BagError::Packaging(
                "at least one checksum algorithm is required".to_string(),
            ));
        }
        let local = hash_payload(directory, algorithms)?;
        let local_paths = local.iter().map(|file| file.path.as_str()).collect::<BTreeSet<_>>();
        if let Some(clash) = remote.iter().find(|file| local_paths.contains(file.path.as_str())) {
            return Err(BagError::Packaging(format!(
                "remote file {} collides with a local payload file",
                clash.path
            )));
        }

        for algorithm in algorithms {
            let mut lines = BTreeMap::new();
            for file in &local {
                if let Some(digest) = file.digests.get(algorithm) {
                    lines.insert(file.path.clone(), digest.clone());
                }
            }
            for file in remote {
                if let Some(digest) = file.digests.get(algorithm) {
                    lines.insert(file.path.clone(), digest.clone());
                }
            }
            write_tag_file(
                directory,
                &format!("manifest-{algorithm}.txt"),
                &render_manifest(&lines),
            )?;
        }

        let fetch_path = directory.join(FETCH_FILE);
        if remote.is_empty() {
            if fetch_path.exists() {
                fs::remove_file(&fetch_path).map_err(|err| BagError::Packaging(err.to_string()))?;
            }
        } else {
            let content = remote
                .iter()
                .map(|file| format!("{}\t{}\t{}\n", file.url, file.length, file.path))
                .collect::<String>();
            write_tag_file(directory, FETCH_FILE, &content)?;
        }

        let octets = local
            .iter()
            .map(|file| file.size)
            .chain(remote.iter().map(|file| file.length))
            .try_fold(0u64, u64::checked_add)
            .ok_or_else(|| {
                BagError::Packaging("payload size overflows Payload-Oxum".to_string())
            })?;
        let count = local.len() + remote.len();
        info.insert(PAYLOAD_OXUM.to_string(), format!("{octets}.{count}"));
        info.entry(BAGGING_DATE.to_string())
            .or_insert_with(|| chrono::Local::now().format("%Y-%m-%d").to_string());
        info.entry(BAG_SOFTWARE_AGENT.to_string())
            .or_insert_with(|| self.software_agent.clone());
        write_tag_file(directory, BAG_INFO_FILE, &render_bag_info(&info))?;
        write_tag_file(
            directory,
            BAGIT_FILE,
            &format!("BagIt-Version: {BAGIT_VERSION}\nTag-File-Character-Encoding: UTF-8\n"),
        )?;

        write_tag_manifests(directory, algorithms)?;
        debug!(
            bag = %directory.display(),
            local = local.len(),
            remote = remote.len(),
            "wrote bag manifests"
        );
        Ok(())
    }
}

impl Default for BagItMaterializer {
    fn default() -> Self {
        Self::new()
    }
}

impl BagMaterializer for BagItMaterializer {
    fn make_bag(&self, directory: &Path, spec: &BagSpec<'_>) -> Result<(), BagError> {
        if !directory.is_dir() {
            return Err(BagError::Packaging(format!(
                "bag directory {} does not exist",
                directory.display()
            )));
        }
        if is_bag(directory) {
            info!(bag = %directory.display(), "directory is already a bag");
            return Ok(());
        }
        let remote = match spec.remote_file_manifest {
            Some(path) => load_remote_file_manifest(path)?,
            None => Vec::new(),
        };
        move_into_payload(directory)?;
        info!(
            bag = %directory.display(),
            algorithms = ?spec.algorithms,
            remote = remote.len(),
            "creating bag"
        );
        self.write_bag(directory, spec.algorithms, spec.metadata.clone(), &remote)
    }

    fn update_bag(&self, directory: &Path, metadata: &BagMetadata) -> Result<(), BagError> {
        if !is_bag(directory) {
            return Err(BagError::Packaging(format!(
                "{} is not a bag",
                directory.display()
            )));
        }
        let algorithms = existing_algorithms(directory)?;
        let mut info = read_bag_info(directory)?;
        info.extend(metadata.iter().map(|(key, value)| (key.clone(), value.clone())));
        let remote = read_remote_files(directory)?;
        info!(bag = %directory.display(), "updating bag");
        self.write_bag(directory, &algorithms, info, &remote)
    }

    fn archive_bag(&self, directory: &Path, format: ArchiveFormat) -> Result<PathBuf, BagError> {
        let archive = fs_util::archive_directory(directory, format)?;
        info!(archive = %archive.display(), "created bag archive");
        Ok(archive)
    }

    fn validate_bag(&self, directory: &Path, fast: bool) -> Result<(), BagError> {
        if !is_bag(directory) {
            return Err(BagError::InvalidBag(format!(
                "{} has no {BAGIT_FILE}",
                directory.display()
            )));
        }

        let fetched = read_fetch_entries(directory)?
            .into_iter()
            .map(|entry| entry.path)
            .collect::<BTreeSet<_>>();
        let missing = fetched
            .iter()
            .filter(|path| !directory.join(path).is_file())
            .cloned()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(BagError::IncompleteBag { missing });
        }

        let info = read_bag_info(directory)?;
        let payload = payload_files(directory)?;
        if let Some(declared) = info.get(PAYLOAD_OXUM) {
            let mut octets = 0u64;
            for (path, _) in &payload {
                octets += fs::metadata(path)
                    .map_err(|err| BagError::Filesystem(err.to_string()))?
                    .len();
            }
            let actual = format!("{octets}.{}", payload.len());
            if declared.trim() != actual {
                return Err(BagError::InvalidBag(format!(
                    "Payload-Oxum mismatch: declared {declared}, found {actual}"
                )));
            }
        }
        if fast {
            return Ok(());
        }

        let manifests = existing_algorithms(directory)?
            .into_iter()
            .map(|algorithm| {
                read_manifest(&directory.join(format!("manifest-{algorithm}.txt")))
                    .map(|manifest| (algorithm, manifest))
            })
            .collect::<Result<Vec<_>, BagError>>()?;
        for (path, relative) in &payload {
            // Fetched files only carry the digests their remote manifest declared.
            let unlisted = manifests
                .iter()
                .find(|(_, manifest)| !manifest.contains_key(relative))
                .map(|(algorithm, _)| *algorithm);
            let listed = manifests
                .iter()
                .filter_map(|(algorithm, manifest)| {
                    manifest.get(relative).map(|digest| (*algorithm, digest))
                })
                .collect::<Vec<_>>();
            if let Some(algorithm) = unlisted
                && (listed.is_empty() || !fetched.contains(relative))
            {
                return Err(BagError::InvalidBag(format!(
                    "{relative} is not listed in manifest-{algorithm}.txt"
                )));
            }

            let algorithms = listed.iter().map(|(algorithm, _)| *algorithm).collect::<Vec<_>>();
            let (_, digests) = checksum::hash_file(path, &algorithms)?;
            for (algorithm, expected) in listed {
                if digests.get(&algorithm) != Some(expected) {
                    return Err(BagError::InvalidBag(format!(
                        "{algorithm} checksum mismatch for {relative}"
                    )));
                }
            }
        }
        Ok(())
    }
}

pub fn is_bag(directory: &Path) -> bool {
    directory.join(BAGIT_FILE).is_file()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RemoteFile {
    url: String,
    length: u64,
    path: String,
    digests: BTreeMap<ChecksumAlgorithm, String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LengthValue {
    Number(u64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RemoteFileRecord {
    url: String,
    length: LengthValue,
    filename: String,
    #[serde(default)]
    md5: Option<String>,
    #[serde(default)]
    sha256: Option<String>,
}

fn load_remote_file_manifest(path: &Path) -> Result<Vec<RemoteFile>, BagError> {
    let content = fs::read_to_string(path).map_err(|err| {
        BagError::Packaging(format!("read remote file manifest {}: {err}", path.display()))
    })?;
    let records: Vec<RemoteFileRecord> = serde_json::from_str(&content).map_err(|err| {
        BagError::Packaging(format!(
            "invalid remote file manifest {}: {err}",
            path.display()
        ))
    })?;

    records
        .into_iter()
        .map(|record| {
            let length = match record.length {
                LengthValue::Number(value) => value,
                LengthValue::Text(text) => text.trim().parse().map_err(|_| {
                    BagError::Packaging(format!(
                        "invalid length {text:?} for remote file {}",
                        record.url
                    ))
                })?,
            };
            let mut digests = BTreeMap::new();
            if let Some(md5) = record.md5 {
                digests.insert(ChecksumAlgorithm::Md5, md5);
            }
            if let Some(sha256) = record.sha256 {
                digests.insert(ChecksumAlgorithm::Sha256, sha256);
            }
            Ok(RemoteFile {
                url: record.url,
                length,
                path: format!("{PAYLOAD_DIR}/{}", record.filename.trim_start_matches('/')),
                digests,
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
struct FetchEntry {
    url: String,
    length: u64,
    path: String,
}

fn read_fetch_entries(directory: &Path) -> Result<Vec<FetchEntry>, BagError> {
    let path = directory.join(FETCH_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(&path).map_err(|err| BagError::Filesystem(err.to_string()))?;
    let mut entries = Vec::new();
    for line in content.lines().filter(|line| !line.trim().is_empty()) {
        let mut parts = line.splitn(3, char::is_whitespace);
        let (Some(url), Some(length), Some(file)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(BagError::InvalidBag(format!("malformed fetch.txt line: {line}")));
        };
        let length = if length == "-" {
            0
        } else {
            length
                .parse()
                .map_err(|_| BagError::InvalidBag(format!("malformed fetch.txt line: {line}")))?
        };
        entries.push(FetchEntry {
            url: url.to_string(),
            length,
            path: file.trim().to_string(),
        });
    }
    Ok(entries)
}

fn read_remote_files(directory: &Path) -> Result<Vec<RemoteFile>, BagError> {
    let entries = read_fetch_entries(directory)?;
    let mut manifests = BTreeMap::new();
    for algorithm in existing_algorithms(directory)? {
        let manifest = read_manifest(&directory.join(format!("manifest-{algorithm}.txt")))?;
        manifests.insert(algorithm, manifest);
    }
    Ok(entries
        .into_iter()
        .filter(|entry| !directory.join(&entry.path).exists())
        .map(|entry| {
            let digests = manifests
                .iter()
                .filter_map(|(algorithm, manifest)| {
                    manifest
                        .get(&entry.path)
                        .map(|digest| (*algorithm, digest.clone()))
                })
                .collect();
            RemoteFile {
                url: entry.url,
                length: entry.length,
                path: entry.path,
                digests,
            }
        })
        .collect())
}

fn existing_algorithms(directory: &Path) -> Result<Vec<ChecksumAlgorithm>, BagError> {
    let mut algorithms = Vec::new();
    for entry in fs::read_dir(directory).map_err(|err| BagError::Filesystem(err.to_string()))? {
        let entry = entry.map_err(|err| BagError::Filesystem(err.to_string()))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(algorithm) = name
            .strip_prefix("manifest-")
            .and_then(|rest| rest.strip_suffix(".txt"))
        {
            algorithms.push(algorithm.parse()?);
        }
    }
    algorithms.sort();
    if algorithms.is_empty() {
        return Err(BagError::InvalidBag(format!(
            "{} has no payload manifest",
            directory.display()
        )));
    }
    Ok(algorithms)
}

fn read_manifest(path: &Path) -> Result<BTreeMap<String, String>, BagError> {
    let content = fs::read_to_string(path)
        .map_err(|err| BagError::InvalidBag(format!("read {}: {err}", path.display())))?;
    let mut entries = BTreeMap::new();
    for line in content.lines().filter(|line| !line.trim().is_empty()) {
        let (digest, file) = line
            .split_once(char::is_whitespace)
            .ok_or_else(|| BagError::InvalidBag(format!("malformed manifest line: {line}")))?;
        entries.insert(file.trim_start().to_string(), digest.to_string());
    }
    Ok(entries)
}

fn read_bag_info(directory: &Path) -> Result<BagMetadata, BagError> {
    let path = directory.join(BAG_INFO_FILE);
    let mut info = BagMetadata::new();
    if !path.exists() {
        return Ok(info);
    }
    let content = fs::read_to_string(&path).map_err(|err| BagError::Filesystem(err.to_string()))?;
    let mut last_key: Option<String> = None;
    for line in content.lines() {
        if line.starts_with([' ', '\t']) {
            if let Some(value) = last_key.as_ref().and_then(|key| info.get_mut(key)) {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_string();
            info.insert(key.clone(), value.trim().to_string());
            last_key = Some(key);
        }
    }
    Ok(info)
}

fn render_bag_info(info: &BagMetadata) -> String {
    info.iter()
        .map(|(key, value)| format!("{key}: {value}\n"))
        .collect()
}

fn render_manifest(lines: &BTreeMap<String, String>) -> String {
    lines
        .iter()
        .map(|(path, digest)| format!("{digest}  {path}\n"))
        .collect()
}

fn write_tag_file(directory: &Path, name: &str, content: &str) -> Result<(), BagError> {
    let path = directory.join(name);
    fs::write(&path, content)
        .map_err(|err| BagError::Packaging(format!("write {}: {err}", path.display())))
}

fn move_into_payload(directory: &Path) -> Result<(), BagError> {
    let staging = tempfile::Builder::new()
        .prefix(".payload-")
        .tempdir_in(directory)
        .map_err(|err| BagError::Packaging(err.to_string()))?
        .keep();
    for entry in fs::read_dir(directory).map_err(|err| BagError::Packaging(err.to_string()))? {
        let entry = entry.map_err(|err| BagError::Packaging(err.to_string()))?;
        let path = entry.path();
        if path == staging {
            continue;
        }
        fs::rename(&path, staging.join(entry.file_name()))
            .map_err(|err| BagError::Packaging(format!("move {}: {err}", path.display())))?;
    }
    fs::rename(&staging, directory.join(PAYLOAD_DIR))
        .map_err(|err| BagError::Packaging(err.to_string()))
}

struct PayloadFile {
    path: String,
    size: u64,
    digests: BTreeMap<ChecksumAlgorithm, String>,
}

fn payload_files(directory: &Path) -> Result<Vec<(PathBuf, String)>, BagError> {
    let payload = directory.join(PAYLOAD_DIR);
    if !payload.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(&payload).sort_by_file_name() {
        let entry = entry.map_err(|err| BagError::Filesystem(err.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(directory)
            .map_err(|err| BagError::Filesystem(err.to_string()))?;
        files.push((entry.path().to_path_buf(), fs_util::slash_path(relative)?));
    }
    Ok(files)
}

fn hash_payload(
    directory: &Path,
    algorithms: &[ChecksumAlgorithm],
) -> Result<Vec<PayloadFile>, BagError> {
    payload_files(directory)?
        .into_iter()
        .map(|(path, relative)| {
            let (size, digests) = checksum::hash_file(&path, algorithms)?;
            Ok(PayloadFile {
                path: relative,
                size,
                digests,
            })
        })
        .collect()
}

/// Writes `tagmanifest-<alg>.txt` covering every file outside the payload.
fn write_tag_manifests(directory: &Path, algorithms: &[ChecksumAlgorithm]) -> Result<(), BagError> {
    let mut tag_files = Vec::new();
    for entry in WalkDir::new(directory)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !(entry.depth() == 1 && entry.file_name() == PAYLOAD_DIR))
    {
        let entry = entry.map_err(|err| BagError::Filesystem(err.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = fs_util::slash_path(
            entry
                .path()
                .strip_prefix(directory)
                .map_err(|err| BagError::Filesystem(err.to_string()))?,
        )?;
        if relative.starts_with("tagmanifest-") {
            continue;
        }
        tag_files.push((entry.path().to_path_buf(), relative));
    }

    let mut lines = algorithms
        .iter()
        .map(|algorithm| (*algorithm, BTreeMap::new()))
        .collect::<BTreeMap<_, _>>();
    for (path, relative) in &tag_files {
        let (_, digests) = checksum::hash_file(path, algorithms)?;
        for (algorithm, digest) in digests {
            if let Some(manifest) = lines.get_mut(&algorithm) {
                manifest.insert(relative.clone(), digest);
            }
        }
    }
    for (algorithm, manifest) in &lines {
        write_tag_file(
            directory,
            &format!("tagmanifest-{algorithm}.txt"),
            &render_manifest(manifest),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn write_rfm(dir: &Path) -> PathBuf {
        let path = dir.join("rfm.json");
        fs::write(
            &path,
            r#"[{"filename": "ENCFF001.bam", "length": "100", "md5": "0123456789abcdef0123456789abcdef", "url": "https://x.org/files/ENCFF001.bam"}]"#,
        )
        .unwrap();
        path
    }

    #[test]
    fn make_bag_moves_payload_and_records_remote() {
        let scratch = tempfile::tempdir().unwrap();
        let bag = scratch.path().join("bag");
        fs::create_dir_all(&bag).unwrap();
        fs::write(bag.join("metadata.tsv"), "hello world").unwrap();
        let rfm = write_rfm(scratch.path());

        let metadata = BagMetadata::from([("Contact-Name".to_string(), "Tester".to_string())]);
        BagItMaterializer::new()
            .make_bag(
                &bag,
                &BagSpec {
                    algorithms: &[ChecksumAlgorithm::Md5],
                    metadata: &metadata,
                    remote_file_manifest: Some(&rfm),
                },
            )
            .unwrap();

        assert!(bag.join("data").join("metadata.tsv").is_file());
        let manifest = fs::read_to_string(bag.join("manifest-md5.txt")).unwrap();
        assert_eq!(
            manifest,
            "0123456789abcdef0123456789abcdef  data/ENCFF001.bam\n\
             5eb63bbbe01eeed093cb22bb8f5acdc3  data/metadata.tsv\n"
        );
        let fetch = fs::read_to_string(bag.join("fetch.txt")).unwrap();
        assert_eq!(fetch, "https://x.org/files/ENCFF001.bam\t100\tdata/ENCFF001.bam\n");
        let info = read_bag_info(&bag).unwrap();
        assert_eq!(info.get("Payload-Oxum").map(String::as_str), Some("111.2"));
        assert_eq!(info.get("Contact-Name").map(String::as_str), Some("Tester"));

        let tags = read_manifest(&bag.join("tagmanifest-md5.txt")).unwrap();
        assert!(tags.contains_key("bagit.txt"));
        assert!(tags.contains_key("fetch.txt"));
        assert!(!tags.keys().any(|key| key.starts_with("data/")));
    }

    #[test]
    fn update_bag_covers_new_tag_files() {
        let scratch = tempfile::tempdir().unwrap();
        let bag = scratch.path().join("bag");
        fs::create_dir_all(&bag).unwrap();
        fs::write(bag.join("metadata.tsv"), "hello world").unwrap();
        let rfm = write_rfm(scratch.path());
        let materializer = BagItMaterializer::new();
        materializer
            .make_bag(
                &bag,
                &BagSpec {
                    algorithms: &[ChecksumAlgorithm::Md5, ChecksumAlgorithm::Sha256],
                    metadata: &BagMetadata::new(),
                    remote_file_manifest: Some(&rfm),
                },
            )
            .unwrap();

        fs::create_dir_all(bag.join("metadata")).unwrap();
        fs::write(bag.join("metadata").join("manifest.json"), "{}").unwrap();
        let extra = BagMetadata::from([(PROFILE_IDENTIFIER.to_string(), "urn:x".to_string())]);
        materializer.update_bag(&bag, &extra).unwrap();

        let tags = read_manifest(&bag.join("tagmanifest-sha256.txt")).unwrap();
        assert!(tags.contains_key("metadata/manifest.json"));
        let fetch = fs::read_to_string(bag.join("fetch.txt")).unwrap();
        assert!(fetch.contains("data/ENCFF001.bam"));
        let sha = fs::read_to_string(bag.join("manifest-sha256.txt")).unwrap();
        assert!(!sha.contains("ENCFF001.bam"));
        let info = read_bag_info(&bag).unwrap();
        assert_eq!(info.get(PROFILE_IDENTIFIER).map(String::as_str), Some("urn:x"));
    }

    #[test]
    fn validate_reports_missing_remote_files() {
        let scratch = tempfile::tempdir().unwrap();
        let bag = scratch.path().join("bag");
        fs::create_dir_all(&bag).unwrap();
        fs::write(bag.join("metadata.tsv"), "hello world").unwrap();
        let rfm = write_rfm(scratch.path());
        let materializer = BagItMaterializer::new();
        materializer
            .make_bag(
                &bag,
                &BagSpec {
                    algorithms: &[ChecksumAlgorithm::Md5],
                    metadata: &BagMetadata::new(),
                    remote_file_manifest: Some(&rfm),
                },
            )
            .unwrap();

        let err = materializer.validate_bag(&bag, true).unwrap_err();
        assert_matches!(err, BagError::IncompleteBag { missing } if missing == vec!["data/ENCFF001.bam".to_string()]);
    }

    #[test]
    fn local_only_bag_validates() {
        let scratch = tempfile::tempdir().unwrap();
        let bag = scratch.path().join("bag");
        fs::create_dir_all(&bag).unwrap();
        fs::write(bag.join("a.txt"), "hello world").unwrap();
        let materializer = BagItMaterializer::new();
        materializer
            .make_bag(
                &bag,
                &BagSpec {
                    algorithms: &[ChecksumAlgorithm::Sha256],
                    metadata: &BagMetadata::new(),
                    remote_file_manifest: None,
                },
            )
            .unwrap();
        assert!(!bag.join("fetch.txt").exists());
        materializer.validate_bag(&bag, false).unwrap();

        fs::write(bag.join("data").join("a.txt"), "HELLO WORLD").unwrap();
        let err = materializer.validate_bag(&bag, false).unwrap_err();
        assert_matches!(err, BagError::InvalidBag(_));
    }

    #[test]
    fn fetched_files_validate_with_partial_digests() {
        let scratch = tempfile::tempdir().unwrap();
        let bag = scratch.path().join("bag");
        fs::create_dir_all(&bag).unwrap();
        fs::write(bag.join("metadata.tsv"), "x").unwrap();
        let rfm = scratch.path().join("rfm.json");
        fs::write(
            &rfm,
            r#"[{"filename": "a.txt", "length": "11", "md5": "5eb63bbbe01eeed093cb22bb8f5acdc3", "url": "https://x.org/a.txt"}]"#,
        )
        .unwrap();
        let materializer = BagItMaterializer::new();
        materializer
            .make_bag(
                &bag,
                &BagSpec {
                    algorithms: &[ChecksumAlgorithm::Md5, ChecksumAlgorithm::Sha256],
                    metadata: &BagMetadata::new(),
                    remote_file_manifest: Some(&rfm),
                },
            )
            .unwrap();

        fs::write(bag.join("data").join("a.txt"), "hello world").unwrap();
        materializer.validate_bag(&bag, true).unwrap();
        materializer.validate_bag(&bag, false).unwrap();

        fs::write(bag.join("data").join("a.txt"), "HELLO WORLD").unwrap();
        let err = materializer.validate_bag(&bag, false).unwrap_err();
        assert_matches!(err, BagError::InvalidBag(message) if message.contains("md5 checksum mismatch"));
    }

    #[test]
    fn local_file_missing_from_a_manifest_is_invalid() {
        let scratch = tempfile::tempdir().unwrap();
        let bag = scratch.path().join("bag");
        fs::create_dir_all(&bag).unwrap();
        fs::write(bag.join("a.txt"), "hello world").unwrap();
        let materializer = BagItMaterializer::new();
        materializer
            .make_bag(
                &bag,
                &BagSpec {
                    algorithms: &[ChecksumAlgorithm::Md5, ChecksumAlgorithm::Sha256],
                    metadata: &BagMetadata::new(),
                    remote_file_manifest: None,
                },
            )
            .unwrap();
        fs::write(bag.join("manifest-sha256.txt"), "").unwrap();

        let err = materializer.validate_bag(&bag, false).unwrap_err();
        assert_matches!(err, BagError::InvalidBag(message) if message.contains("manifest-sha256.txt"));
    }

    #[test]
    fn oversized_remote_lengths_are_rejected() {
        let scratch = tempfile::tempdir().unwrap();
        let bag = scratch.path().join("bag");
        fs::create_dir_all(&bag).unwrap();
        fs::write(bag.join("metadata.tsv"), "x").unwrap();
        let rfm = scratch.path().join("rfm.json");
        fs::write(
            &rfm,
            r#"[
                {"filename": "a.bam", "length": "9223372036854775808", "md5": "00", "url": "https://x.org/a.bam"},
                {"filename": "b.bam", "length": "9223372036854775808", "md5": "11", "url": "https://x.org/b.bam"}
            ]"#,
        )
        .unwrap();

        let err = BagItMaterializer::new()
            .make_bag(
                &bag,
                &BagSpec {
                    algorithms: &[ChecksumAlgorithm::Md5],
                    metadata: &BagMetadata::new(),
                    remote_file_manifest: Some(&rfm),
                },
            )
            .unwrap_err();
        assert_matches!(err, BagError::Packaging(message) if message.contains("Payload-Oxum"));
    }
}
