use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tempfile::TempDir;
use tracing::{info, warn};

use crate::bag_path::{self, TEMP_DIR_PREFIX};
use crate::bagit::{BagMaterializer, BagMetadata, BagSpec, PROFILE_IDENTIFIER};
use crate::checksum::ChecksumAlgorithm;
use crate::domain::{
    ArchiveFormat, Creator, ENCODE_BIOSAMPLE_TERM_ID, ENCODE_FILE_FORMAT, RemoteFileManifestEntry,
};
use crate::error::BagError;
use crate::fs_util;
use crate::manifest::{self, REMOTE_FILE_MANIFEST_NAME};
use crate::metadata::MetadataReader;
use crate::portal::{self, PortalClient};
use crate::provenance::{
    self, BDBAG_RO_PROFILE, ProvenanceManifest, RO_MANIFEST_NAME, RO_METADATA_DIR,
};

#[derive(Debug, Clone, Default)]
pub struct BagOptions {
    pub remote_file_manifest: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub output_name: Option<String>,
    pub output_path: Option<PathBuf>,
    pub archive_format: Option<ArchiveFormat>,
    pub creator: Creator,
    pub create_ro_manifest: bool,
    pub overwrite: bool,
    pub keep_bag_directory: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BagResult {
    pub bag_path: PathBuf,
    pub archived: bool,
    pub file_count: usize,
    pub algorithms: Vec<ChecksumAlgorithm>,
    pub ro_manifest: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Clone)]
pub struct App<P: PortalClient, B: BagMaterializer> {
    portal: P,
    bagger: B,
}

impl<P: PortalClient, B: BagMaterializer> App<P, B> {
    pub fn new(portal: P, bagger: B) -> Self {
        Self { portal, bagger }
    }

    pub fn create_bag_from_url(
        &self,
        url: &str,
        options: &BagOptions,
        sink: &dyn ProgressSink,
    ) -> Result<BagResult, BagError> {
        let scratch = scratch_dir()?;
        sink.event(ProgressEvent {
            message: "phase=Resolve; fetching batch download manifest".to_string(),
            elapsed: None,
        });
        let metadata_file = portal::resolve_metadata_file(&self.portal, url, scratch.path())?;

        let mut options = options.clone();
        if options.working_dir.is_none() {
            options.working_dir = Some(scratch.path().to_path_buf());
        }
        self.create_bag_from_metadata_file(&metadata_file, &options, sink)
    }

    pub fn create_bag_from_metadata_file(
        &self,
        metadata_file: &Path,
        options: &BagOptions,
        sink: &dyn ProgressSink,
    ) -> Result<BagResult, BagError> {
        let started = Instant::now();
        let metadata_file = std::path::absolute(metadata_file)
            .map_err(|err| BagError::Filesystem(err.to_string()))?;

        // Dropped on every exit path, which removes the directory.
        let mut scratch = None;
        let manifest_path = match (&options.remote_file_manifest, &options.working_dir) {
            (Some(path), _) => path.clone(),
            (None, Some(dir)) => dir.join(REMOTE_FILE_MANIFEST_NAME),
            (None, None) => scratch
                .insert(scratch_dir()?)
                .path()
                .join(REMOTE_FILE_MANIFEST_NAME),
        };

        let mut ro_manifest = options
            .create_ro_manifest
            .then(|| ProvenanceManifest::new(&options.creator));

        sink.event(ProgressEvent {
            message: format!("phase=Convert; reading {}", metadata_file.display()),
            elapsed: None,
        });
        let file_count = if options.remote_file_manifest.is_some() {
            let entries = manifest::read(&manifest_path)?;
            if let Some(ro_manifest) = ro_manifest.as_mut() {
                convert_metadata_to_remote_file_manifest(
                    &metadata_file,
                    None,
                    Some(&mut *ro_manifest),
                )?;
                let bagged = entries
                    .iter()
                    .map(|entry| entry.filename.as_str())
                    .collect::<BTreeSet<_>>();
                ro_manifest.retain_payload(|filename| bagged.contains(filename));
            }
            entries.len()
        } else {
            convert_metadata_to_remote_file_manifest(
                &metadata_file,
                Some(&manifest_path),
                ro_manifest.as_mut(),
            )?
        };

        let bag_path = bag_path::resolve(
            options.output_name.as_deref(),
            options.output_path.as_deref(),
        )?;
        bag_path::ensure_exists(&bag_path, options.overwrite)?;
        fs_util::copy_into(&metadata_file, &bag_path)?;

        let algorithms = if options.create_ro_manifest {
            vec![ChecksumAlgorithm::Md5, ChecksumAlgorithm::Sha256]
        } else {
            vec![ChecksumAlgorithm::Md5]
        };
        let mut bag_metadata = contact_metadata(&options.creator);

        sink.event(ProgressEvent {
            message: format!("phase=Bag; creating bag at {}", bag_path.display()),
            elapsed: None,
        });
        self.bagger.make_bag(
            &bag_path,
            &BagSpec {
                algorithms: &algorithms,
                metadata: &bag_metadata,
                remote_file_manifest: Some(&manifest_path),
            },
        )?;

        if let Some(ro_manifest) = &ro_manifest {
            sink.event(ProgressEvent {
                message: "phase=Provenance; writing research object manifest".to_string(),
                elapsed: None,
            });
            let metadata_dir = bag_path.join(RO_METADATA_DIR);
            if !metadata_dir.exists() {
                fs::create_dir(&metadata_dir).map_err(|err| {
                    BagError::Filesystem(format!("create {}: {err}", metadata_dir.display()))
                })?;
            }
            ro_manifest.write(&metadata_dir.join(RO_MANIFEST_NAME))?;
            bag_metadata.insert(PROFILE_IDENTIFIER.to_string(), BDBAG_RO_PROFILE.to_string());
            self.bagger.update_bag(&bag_path, &bag_metadata)?;
        }

        let mut result_path = bag_path.clone();
        if let Some(format) = options.archive_format {
            sink.event(ProgressEvent {
                message: format!("phase=Archive; writing {format} archive"),
                elapsed: None,
            });
            result_path = self.bagger.archive_bag(&bag_path, format)?;
            if !options.keep_bag_directory {
                fs::remove_dir_all(&bag_path).map_err(|err| {
                    BagError::Filesystem(format!("remove {}: {err}", bag_path.display()))
                })?;
            }
        }

        info!(bag = %result_path.display(), files = file_count, "bag created");
        sink.event(ProgressEvent {
            message: format!("phase=Done; {}", result_path.display()),
            elapsed: Some(started.elapsed()),
        });

        Ok(BagResult {
            bag_path: result_path,
            archived: options.archive_format.is_some(),
            file_count,
            algorithms,
            ro_manifest: options.create_ro_manifest,
        })
    }
}

/// Converts an ENCODE metadata export into a remote file manifest.
///
/// Passing no `manifest_path` only fills the research object manifest.
/// Returns the number of rows.
pub fn convert_metadata_to_remote_file_manifest(
    metadata_file: &Path,
    manifest_path: Option<&Path>,
    mut ro_manifest: Option<&mut ProvenanceManifest>,
) -> Result<usize, BagError> {
    info!("converting ENCODE metadata file to BDBag remote file manifest");
    let reader = MetadataReader::open(metadata_file)?;
    let annotated = reader.has_column(ENCODE_FILE_FORMAT)
        && reader.has_column(ENCODE_BIOSAMPLE_TERM_ID);
    if ro_manifest.is_some() && !annotated {
        warn!(
            "metadata file has no `{ENCODE_FILE_FORMAT}` or `{ENCODE_BIOSAMPLE_TERM_ID}` column; \
             research object manifest will have no aggregates"
        );
    }

    let mut entries = Vec::new();
    let mut files = Vec::new();
    for row in reader {
        let row = row?;
        if let Some(ro_manifest) = ro_manifest.as_deref_mut() {
            files.push(if annotated {
                ro_manifest.add_aggregate(&row)
            } else {
                provenance::payload_uri(&row.filename)
            });
        }
        entries.push(RemoteFileManifestEntry::from(&row));
    }

    if let Some(manifest_path) = manifest_path {
        manifest::serialize(&entries, manifest_path)?;
    }
    if let Some(ro_manifest) = ro_manifest {
        let source = metadata_file
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        ro_manifest.add_annotation(files, &source);
    }
    Ok(entries.len())
}

fn contact_metadata(creator: &Creator) -> BagMetadata {
    let mut metadata = BagMetadata::new();
    if let Some(name) = &creator.name {
        metadata.insert("Contact-Name".to_string(), name.clone());
    }
    if let Some(orcid) = &creator.orcid {
        metadata.insert("Contact-Orcid".to_string(), orcid.clone());
    }
    metadata
}

fn scratch_dir() -> Result<TempDir, BagError> {
    tempfile::Builder::new()
        .prefix(TEMP_DIR_PREFIX)
        .tempdir()
        .map_err(|err| BagError::Filesystem(format!("create temp dir: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_fields_follow_creator() {
        let creator = Creator {
            name: Some("encode2bag unit test".to_string()),
            uri: None,
            orcid: Some("0000-0003-2280-917X".to_string()),
        };
        let metadata = contact_metadata(&creator);
        assert_eq!(
            metadata.get("Contact-Name").map(String::as_str),
            Some("encode2bag unit test")
        );
        assert_eq!(
            metadata.get("Contact-Orcid").map(String::as_str),
            Some("0000-0003-2280-917X")
        );
        assert!(contact_metadata(&Creator::default()).is_empty());
    }
}
