use std::fs;

use encode2bag::domain::{Creator, FileReferenceRow};
use encode2bag::provenance::{self, ProvenanceManifest};

fn row(url: &str, format: Option<&str>, term_id: Option<&str>) -> FileReferenceRow {
    let mut row = FileReferenceRow::new(
        url.to_string(),
        "10".to_string(),
        "d41d8cd98f00b204e9800998ecf8427e".to_string(),
    );
    row.file_format = format.map(str::to_string);
    row.biosample_term_id = term_id.map(str::to_string);
    row
}

#[test]
fn orcid_is_normalized_once() {
    assert_eq!(
        provenance::normalize_orcid("0000-0003-2280-917X"),
        "http://orcid.org/0000-0003-2280-917X"
    );
    assert_eq!(
        provenance::normalize_orcid("https://orcid.org/0000-0003-2280-917X"),
        "https://orcid.org/0000-0003-2280-917X"
    );
}

#[test]
fn created_by_requires_a_name() {
    let anonymous = ProvenanceManifest::new(&Creator {
        name: None,
        uri: None,
        orcid: Some("0000-0003-2280-917X".to_string()),
    });
    assert!(anonymous.created_by.is_none());

    let named = ProvenanceManifest::new(&Creator {
        name: Some("ENCODE user".to_string()),
        uri: None,
        orcid: Some("0000-0003-2280-917X".to_string()),
    });
    let agent = named.created_by.unwrap();
    assert_eq!(agent.name, "ENCODE user");
    assert_eq!(
        agent.orcid.as_deref(),
        Some("http://orcid.org/0000-0003-2280-917X")
    );
}

#[test]
fn aggregates_and_annotation_reference_payload() {
    let mut manifest = ProvenanceManifest::new(&Creator::default());
    let files = vec![
        manifest.add_aggregate(&row(
            "https://www.encodeproject.org/files/A/@@download/A.bam",
            Some("bam"),
            Some("EFO:0002784"),
        )),
        manifest.add_aggregate(&row("https://x.org/B.bed", None, Some("EFO:0002784"))),
    ];
    manifest.add_annotation(files, "metadata.tsv");

    assert_eq!(manifest.aggregates.len(), 1);
    let aggregate = &manifest.aggregates[0];
    assert_eq!(aggregate.uri, "../data/A.bam");
    assert_eq!(aggregate.mediatype, "application/x-bam");
    assert_eq!(
        aggregate.conforms_to,
        "http://www.ebi.ac.uk/ols/search?q=EFO:0002784&exact=on"
    );

    assert_eq!(manifest.annotations.len(), 1);
    assert_eq!(
        manifest.annotations[0].about,
        vec!["../data/A.bam".to_string(), "../data/B.bed".to_string()]
    );
    assert_eq!(manifest.annotations[0].content, "../data/metadata.tsv");
}

#[test]
fn written_manifest_uses_bundle_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.json");
    let mut manifest = ProvenanceManifest::new(&Creator {
        name: Some("ENCODE user".to_string()),
        uri: None,
        orcid: None,
    });
    let file = manifest.add_aggregate(&row("https://x.org/A.bam", Some("bam"), Some("EFO:1")));
    manifest.add_annotation(vec![file], "m.tsv");
    manifest.write(&path).unwrap();

    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["@context"][0], "https://w3id.org/bundle/context");
    assert_eq!(value["@id"], "../");
    assert_eq!(value["createdBy"]["name"], "ENCODE user");
    assert_eq!(value["aggregates"][0]["conformsTo"], "http://www.ebi.ac.uk/ols/search?q=EFO:1&exact=on");
    let created_on = value["createdOn"].as_str().unwrap();
    assert_eq!(created_on.len(), "2024-05-01T13:45:09Z".len());
    assert!(created_on.ends_with('Z'));
}

#[test]
fn retain_payload_drops_unbagged_files() {
    let mut manifest = ProvenanceManifest::new(&Creator::default());
    let files = vec![
        manifest.add_aggregate(&row("https://x.org/A.bam", Some("bam"), Some("EFO:1"))),
        manifest.add_aggregate(&row("https://x.org/B.bam", Some("bam"), Some("EFO:1"))),
    ];
    manifest.add_annotation(files, "m.tsv");

    manifest.retain_payload(|filename| filename == "B.bam");
    assert_eq!(manifest.aggregates.len(), 1);
    assert_eq!(manifest.aggregates[0].uri, "../data/B.bam");
    assert_eq!(manifest.annotations[0].about, vec!["../data/B.bam".to_string()]);

    manifest.retain_payload(|_| false);
    assert!(manifest.aggregates.is_empty());
    assert!(manifest.annotations.is_empty());
}
