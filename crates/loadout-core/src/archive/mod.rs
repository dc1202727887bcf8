//! Package container inspection for the fast-path existence check.
//!
//! A package is a zip container holding nested `.zip` sub-archives; each
//! sub-archive carries serialized record documents under
//! `records/<store>/...` whose root `id` field identifies the record.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::store::RecordId;

/// First path segment of record entries inside a sub-archive.
const RECORD_PREFIX: &str = "records";

/// Reference to one record carried by a package archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecordRef {
    /// Target store name, encoded as the second path segment.
    pub store: String,
    pub id: RecordId,
}

#[derive(Debug, Deserialize)]
struct RecordDocument {
    id: String,
}

/// List every record reference carried by the package at `path`.
///
/// Walks each nested `.zip` sub-archive and parses each record document
/// under the `records/` prefix. Any unreadable archive or document is an
/// error; the caller decides what exclusion means.
pub fn scan_package_records(path: &Path) -> anyhow::Result<Vec<ArchiveRecordRef>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open package archive: {}", path.display()))?;
    let mut container = zip::ZipArchive::new(file)
        .with_context(|| format!("Failed to read package archive: {}", path.display()))?;

    let mut records = Vec::new();
    for index in 0..container.len() {
        let mut entry = container
            .by_index(index)
            .with_context(|| format!("Failed to read archive entry {}", index))?;
        if entry.is_dir() || !entry.name().ends_with(".zip") {
            continue;
        }
        let entry_name = entry.name().to_string();
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .with_context(|| format!("Failed to read sub-archive {}", entry_name))?;
        scan_sub_archive(&entry_name, &bytes, &mut records)?;
    }
    Ok(records)
}

fn scan_sub_archive(
    name: &str,
    bytes: &[u8],
    records: &mut Vec<ArchiveRecordRef>,
) -> anyhow::Result<()> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .with_context(|| format!("Sub-archive {} is not a readable archive", name))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .with_context(|| format!("Failed to read entry {} of sub-archive {}", index, name))?;
        if entry.is_dir() {
            continue;
        }

        // Record entries are records/<store>/<file>; everything else in
        // the sub-archive (files, metadata) is not a record.
        let entry_name = entry.name().to_string();
        let mut segments = entry_name.split('/');
        let (Some(prefix), Some(store), Some(_file)) =
            (segments.next(), segments.next(), segments.next())
        else {
            continue;
        };
        if prefix != RECORD_PREFIX {
            continue;
        }

        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .with_context(|| format!("Failed to read record entry {}", entry_name))?;
        let document: RecordDocument = serde_json::from_str(&content).with_context(|| {
            format!("Record entry {} is not a valid record document", entry_name)
        })?;
        records.push(ArchiveRecordRef {
            store: store.to_string(),
            id: RecordId::new(document.id),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn record_json(id: &str) -> String {
        format!(r#"{{"id": "{}"}}"#, id)
    }

    /// Build a sub-archive from (path, content) pairs.
    fn sub_archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);
            for (path, content) in entries {
                zip.start_file(*path, options).expect("Failed to start file");
                zip.write_all(content.as_bytes()).expect("Failed to write");
            }
            zip.finish().expect("Failed to finish zip");
        }
        buf.into_inner()
    }

    /// Build a package container from (entry name, bytes) pairs.
    fn package(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);
            for (path, bytes) in entries {
                zip.start_file(*path, options).expect("Failed to start file");
                zip.write_all(bytes).expect("Failed to write");
            }
            zip.finish().expect("Failed to finish zip");
        }
        buf.into_inner()
    }

    fn write_package(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).expect("Failed to write package");
        path
    }

    #[test]
    fn finds_records_across_sub_archives() {
        let first = sub_archive(&[
            ("records/master/home.json", &record_json("site/home")),
            ("records/master/news.json", &record_json("site/news")),
        ]);
        let second = sub_archive(&[("records/web/promo.json", &record_json("site/promo"))]);
        let bytes = package(&[("items.zip", &first), ("extras.zip", &second)]);

        let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let path = write_package(dir.path(), "demo.zip", &bytes);

        let records = scan_package_records(&path).expect("scan should succeed");
        assert_eq!(records.len(), 3);
        assert!(records.contains(&ArchiveRecordRef {
            store: "master".to_string(),
            id: RecordId::new("site/home"),
        }));
        assert!(records.contains(&ArchiveRecordRef {
            store: "web".to_string(),
            id: RecordId::new("site/promo"),
        }));
    }

    #[test]
    fn ignores_non_record_entries() {
        let sub = sub_archive(&[
            ("records/master/home.json", &record_json("site/home")),
            ("files/css/site.css", "body {}"),
            ("metadata.json", r#"{"name": "demo"}"#),
        ]);
        let bytes = package(&[
            ("items.zip", sub.as_slice()),
            ("readme.txt", b"not an archive"),
        ]);

        let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let path = write_package(dir.path(), "demo.zip", &bytes);

        let records = scan_package_records(&path).expect("scan should succeed");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].store, "master");
    }

    #[test]
    fn empty_package_yields_no_records() {
        let bytes = package(&[]);
        let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let path = write_package(dir.path(), "empty.zip", &bytes);

        let records = scan_package_records(&path).expect("scan should succeed");
        assert!(records.is_empty());
    }

    #[test]
    fn malformed_record_document_is_an_error() {
        let sub = sub_archive(&[("records/master/bad.json", "not json at all")]);
        let bytes = package(&[("items.zip", sub.as_slice())]);

        let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let path = write_package(dir.path(), "demo.zip", &bytes);

        let err = scan_package_records(&path).expect_err("malformed document must fail");
        assert!(format!("{err:#}").contains("records/master/bad.json"));
    }

    #[test]
    fn unreadable_sub_archive_is_an_error() {
        let bytes = package(&[("items.zip", b"this is not a zip".as_slice())]);
        let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let path = write_package(dir.path(), "demo.zip", &bytes);

        let err = scan_package_records(&path).expect_err("bad sub-archive must fail");
        assert!(format!("{err:#}").contains("items.zip"));
    }

    #[test]
    fn missing_package_file_is_an_error() {
        let err = scan_package_records(Path::new("/nonexistent/demo.zip"))
            .expect_err("missing file must fail");
        assert!(format!("{err:#}").contains("Failed to open package archive"));
    }
}
