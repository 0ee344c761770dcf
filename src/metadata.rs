use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};

use crate::domain::{
    ENCODE_BIOSAMPLE_TERM_ID, ENCODE_FILE_FORMAT, ENCODE_FILE_MD5SUM, ENCODE_FILE_SIZE,
    ENCODE_FILE_URL, FileReferenceRow, REQUIRED_COLUMNS,
};
use crate::error::BagError;

#[derive(Debug, Clone, Copy)]
struct ColumnIndex {
    url: usize,
    size: usize,
    md5: usize,
    file_format: Option<usize>,
    biosample_term_id: Option<usize>,
}

pub struct MetadataReader<R: Read> {
    records: StringRecordsIntoIter<R>,
    header: Vec<String>,
    columns: ColumnIndex,
}

impl MetadataReader<File> {
    pub fn open(path: &Path) -> Result<Self, BagError> {
        let file = File::open(path).map_err(|err| BagError::MetadataRead {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::from_reader(file)
    }
}

impl<R: Read> MetadataReader<R> {
    pub fn from_reader(reader: R) -> Result<Self, BagError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);
        let header = reader
            .headers()
            .map_err(|err| row_error(&err))?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let columns = validate_header(&header)?;
        Ok(Self {
            records: reader.into_records(),
            header,
            columns,
        })
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.header.iter().any(|column| column == name)
    }
}

impl<R: Read> Iterator for MetadataReader<R> {
    type Item = Result<FileReferenceRow, BagError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        Some(
            record
                .map_err(|err| row_error(&err))
                .map(|record| decode_row(&record, self.columns)),
        )
    }
}

pub fn parse(path: &Path) -> Result<Vec<FileReferenceRow>, BagError> {
    MetadataReader::open(path)?.collect()
}

fn validate_header(header: &[String]) -> Result<ColumnIndex, BagError> {
    let observed = header.iter().map(String::as_str).collect::<BTreeSet<_>>();
    let missing = REQUIRED_COLUMNS
        .iter()
        .filter(|column| !observed.contains(*column))
        .map(|column| column.to_string())
        .collect::<BTreeSet<_>>();
    if !missing.is_empty() {
        return Err(BagError::SchemaValidation {
            missing: missing.into_iter().collect(),
            header: header.to_vec(),
        });
    }

    let position = |name: &str| header.iter().position(|column| column == name);
    Ok(ColumnIndex {
        url: position(ENCODE_FILE_URL).unwrap_or_default(),
        size: position(ENCODE_FILE_SIZE).unwrap_or_default(),
        md5: position(ENCODE_FILE_MD5SUM).unwrap_or_default(),
        file_format: position(ENCODE_FILE_FORMAT),
        biosample_term_id: position(ENCODE_BIOSAMPLE_TERM_ID),
    })
}

fn decode_row(record: &StringRecord, columns: ColumnIndex) -> FileReferenceRow {
    let field = |index: usize| record.get(index).unwrap_or_default().to_string();
    let optional = |index: Option<usize>| {
        index
            .and_then(|index| record.get(index))
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let mut row = FileReferenceRow::new(
        field(columns.url),
        field(columns.size),
        field(columns.md5),
    );
    row.file_format = optional(columns.file_format);
    row.biosample_term_id = optional(columns.biosample_term_id);
    row
}

fn row_error(err: &csv::Error) -> BagError {
    let line = err.position().map(|pos| pos.line()).unwrap_or(0);
    let message = match err.kind() {
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => format!("expected {expected_len} columns, found {len}"),
        _ => err.to_string(),
    };
    BagError::MetadataRow { line, message }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const HEADER: &str = "File accession\tFile format\tBiosample term id\tSize\tmd5sum\tFile download URL\n";

    #[test]
    fn reads_rows_in_order() {
        let input = format!(
            "{HEADER}ENCFF001\tbam\tEFO:0001\t10\taaa\thttps://x.org/files/ENCFF001.bam\n\
             ENCFF002\tbed\tEFO:0002\t20\tbbb\thttps://x.org/files/ENCFF002.bed\n"
        );
        let rows = MetadataReader::from_reader(input.as_bytes())
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].filename, "ENCFF001.bam");
        assert_eq!(rows[0].length, "10");
        assert_eq!(rows[0].file_format.as_deref(), Some("bam"));
        assert_eq!(rows[1].md5, "bbb");
        assert_eq!(rows[1].biosample_term_id.as_deref(), Some("EFO:0002"));
    }

    #[test]
    fn missing_columns_are_sorted() {
        let input = "File download URL\tOther\n";
        let err = MetadataReader::from_reader(input.as_bytes()).err().unwrap();
        assert_matches!(
            err,
            BagError::SchemaValidation { missing, header }
                if missing == vec!["Size".to_string(), "md5sum".to_string()]
                    && header == vec!["File download URL".to_string(), "Other".to_string()]
        );
    }

    #[test]
    fn short_row_is_fatal() {
        let input = format!("{HEADER}ENCFF001\tbam\n");
        let mut reader = MetadataReader::from_reader(input.as_bytes()).unwrap();
        let err = reader.next().unwrap().unwrap_err();
        assert_matches!(err, BagError::MetadataRow { line: 2, .. });
    }

    #[test]
    fn optional_columns_may_be_absent() {
        let input = "Size\tmd5sum\tFile download URL\n5\tccc\tENCFF003.txt\n";
        let rows = MetadataReader::from_reader(input.as_bytes())
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows[0].filename, "ENCFF003.txt");
        assert_eq!(rows[0].file_format, None);
        assert_eq!(rows[0].biosample_term_id, None);
    }
}
