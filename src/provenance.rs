use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{Creator, FileReferenceRow};
use crate::error::BagError;
use crate::fs_util;

pub const RO_BUNDLE_CONTEXT: &str = "https://w3id.org/bundle/context";
pub const ORCID_BASE_URI: &str = "http://orcid.org";
pub const BDBAG_RO_PROFILE: &str =
    "http://raw.githubusercontent.com/ini-bdds/bdbag/master/profiles/bdbag-ro-profile.json";
pub const RO_METADATA_DIR: &str = "metadata";
pub const RO_MANIFEST_NAME: &str = "manifest.json";

const DATA_PREFIX: &str = "../data/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orcid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    pub uri: String,
    pub mediatype: String,
    #[serde(rename = "conformsTo")]
    pub conforms_to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub about: Vec<String>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceManifest {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "createdOn")]
    pub created_on: String,
    #[serde(rename = "createdBy", default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Agent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregates: Vec<Aggregate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

impl ProvenanceManifest {
    /// `createdBy` is only emitted when the creator has a name.
    pub fn new(creator: &Creator) -> Self {
        let created_by = creator.name.as_ref().map(|name| Agent {
            name: name.clone(),
            uri: creator.uri.clone(),
            orcid: creator.orcid.as_deref().map(normalize_orcid),
        });
        Self {
            context: vec![RO_BUNDLE_CONTEXT.to_string()],
            id: "../".to_string(),
            created_on: created_on_timestamp(),
            created_by,
            aggregates: Vec::new(),
            annotations: Vec::new(),
        }
    }

    /// Returns the file's bag-relative URI even when the row is not aggregated.
    pub fn add_aggregate(&mut self, row: &FileReferenceRow) -> String {
        let uri = payload_uri(&row.filename);
        match (&row.file_format, &row.biosample_term_id) {
            (Some(format), Some(term_id)) => self.aggregates.push(Aggregate {
                uri: uri.clone(),
                mediatype: format!("application/x-{format}"),
                conforms_to: biosample_lookup_uri(term_id),
            }),
            _ => warn!(
                file = %row.filename,
                "missing `File format` or `Biosample term id`; skipping provenance aggregate"
            ),
        }
        uri
    }

    pub fn add_annotation(&mut self, files: Vec<String>, source_metadata_filename: &str) {
        if files.is_empty() {
            return;
        }
        self.annotations.push(Annotation {
            about: files,
            content: payload_uri(source_metadata_filename),
        });
    }

    /// Drops aggregates and annotated files whose payload name fails `keep`.
    pub fn retain_payload<F>(&mut self, keep: F)
    where
        F: Fn(&str) -> bool,
    {
        let kept = |uri: &String| uri.strip_prefix(DATA_PREFIX).is_some_and(&keep);
        self.aggregates.retain(|aggregate| kept(&aggregate.uri));
        for annotation in &mut self.annotations {
            annotation.about.retain(&kept);
        }
        self.annotations
            .retain(|annotation| !annotation.about.is_empty());
    }

    pub fn write(&self, destination: &Path) -> Result<(), BagError> {
        let content = serde_json::to_vec_pretty(self)
            .map_err(|err| BagError::Filesystem(err.to_string()))?;
        fs_util::write_bytes_atomic(destination, &content)
    }
}

pub fn normalize_orcid(orcid: &str) -> String {
    if orcid.starts_with("http") {
        orcid.to_string()
    } else {
        format!("{ORCID_BASE_URI}/{orcid}")
    }
}

pub fn biosample_lookup_uri(term_id: &str) -> String {
    format!("http://www.ebi.ac.uk/ols/search?q={term_id}&exact=on")
}

pub fn payload_uri(filename: &str) -> String {
    format!("{DATA_PREFIX}{filename}")
}

fn created_on_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(format: Option<&str>, term: Option<&str>) -> FileReferenceRow {
        let mut row = FileReferenceRow::new(
            "https://x.org/files/ENCFF001.bam".to_string(),
            "1".to_string(),
            "abc".to_string(),
        );
        row.file_format = format.map(str::to_string);
        row.biosample_term_id = term.map(str::to_string);
        row
    }

    #[test]
    fn orcid_is_normalized() {
        assert_eq!(
            normalize_orcid("0000-0003-2280-917X"),
            "http://orcid.org/0000-0003-2280-917X"
        );
        assert_eq!(
            normalize_orcid("http://orcid.org/0000-0003-2280-917X"),
            "http://orcid.org/0000-0003-2280-917X"
        );
    }

    #[test]
    fn creator_requires_name() {
        let anonymous = ProvenanceManifest::new(&Creator {
            orcid: Some("0000-0003-2280-917X".to_string()),
            ..Creator::default()
        });
        assert!(anonymous.created_by.is_none());
    }

    #[test]
    fn aggregate_uses_row_columns() {
        let mut manifest = ProvenanceManifest::new(&Creator::default());
        let uri = manifest.add_aggregate(&row(Some("bam"), Some("EFO:0002067")));
        assert_eq!(uri, "../data/ENCFF001.bam");
        assert_eq!(
            manifest.aggregates,
            vec![Aggregate {
                uri: "../data/ENCFF001.bam".to_string(),
                mediatype: "application/x-bam".to_string(),
                conforms_to: "http://www.ebi.ac.uk/ols/search?q=EFO:0002067&exact=on".to_string(),
            }]
        );
    }

    #[test]
    fn incomplete_row_is_skipped() {
        let mut manifest = ProvenanceManifest::new(&Creator::default());
        let uri = manifest.add_aggregate(&row(Some("bam"), None));
        assert_eq!(uri, "../data/ENCFF001.bam");
        assert!(manifest.aggregates.is_empty());
    }

    #[test]
    fn created_on_is_sortable_utc() {
        let manifest = ProvenanceManifest::new(&Creator::default());
        assert_eq!(manifest.created_on.len(), "2024-01-01T00:00:00Z".len());
        assert!(manifest.created_on.ends_with('Z'));
    }
}
