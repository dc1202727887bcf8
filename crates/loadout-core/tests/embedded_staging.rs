//! Staging of embedded packages under the host data root, and the
//! whole-archive fast path driven through a real package container.

use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use loadout_core::prelude::*;
use tempfile::TempDir;

#[derive(Clone)]
struct EmbeddedDescriptor {
    key: &'static str,
    package_id: &'static str,
    bytes: Vec<u8>,
    fast_path: bool,
}

impl Descriptor for EmbeddedDescriptor {
    fn key(&self) -> &str {
        self.key
    }

    fn package(&self) -> PackageSource {
        PackageSource::embedded_owned(self.package_id, self.bytes.clone())
    }

    fn skip_if_all_records_exist(&self) -> bool {
        self.fast_path
    }

    fn requirements(&self) -> Vec<Requirement> {
        Vec::new()
    }
}

#[derive(Default)]
struct PathRecordingInstaller {
    paths: Mutex<Vec<std::path::PathBuf>>,
}

impl PathRecordingInstaller {
    fn paths(&self) -> Vec<std::path::PathBuf> {
        self.paths.lock().expect("lock should not be poisoned").clone()
    }
}

impl PackageInstaller for PathRecordingInstaller {
    fn install_package(&self, path: &Path, _context: &InstallContext) -> anyhow::Result<()> {
        self.paths
            .lock()
            .expect("lock should not be poisoned")
            .push(path.to_path_buf());
        Ok(())
    }
}

fn loader_for(
    paths: &HostPaths,
    descriptor: EmbeddedDescriptor,
    stores: MemoryStores,
    installer: Arc<dyn PackageInstaller>,
) -> PackageLoader {
    let mut registry = DescriptorRegistry::new();
    let key = descriptor.key;
    registry.register_unit(
        "embedded",
        vec![DescriptorFactory::new(key, move || {
            Ok(Box::new(descriptor.clone()) as Box<dyn Descriptor>)
        })],
    );

    PackageLoader::new(
        registry,
        Arc::new(stores),
        installer,
        paths.stager(),
        false,
    )
}

#[test]
fn staged_file_lands_under_the_data_root() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let paths = HostPaths::with_data_root(temp.path().to_path_buf());
    let installer = Arc::new(PathRecordingInstaller::default());

    let descriptor = EmbeddedDescriptor {
        key: "demo",
        package_id: "host.demo.content.zip",
        bytes: b"demo package bytes".to_vec(),
        fast_path: false,
    };

    let report = loader_for(&paths, descriptor, MemoryStores::new(), installer.clone())
        .run()
        .expect("run should succeed");

    let expected = temp
        .path()
        .join("packages")
        .join("PackageAutoLoader")
        .join("content.zip");
    assert_eq!(installer.paths(), vec![expected.clone()]);
    assert_eq!(
        std::fs::read(&expected).expect("staged file should exist"),
        b"demo package bytes".to_vec()
    );
    assert_eq!(
        report.installed[0].content_hash,
        blake3::hash(b"demo package bytes").to_hex().to_string()
    );
}

#[test]
fn restaging_reuses_the_same_path_between_runs() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let paths = HostPaths::with_data_root(temp.path().to_path_buf());

    for bytes in [b"first run".to_vec(), b"second run".to_vec()] {
        let installer = Arc::new(PathRecordingInstaller::default());
        let descriptor = EmbeddedDescriptor {
            key: "demo",
            package_id: "host.demo.content.zip",
            bytes: bytes.clone(),
            fast_path: false,
        };
        loader_for(&paths, descriptor, MemoryStores::new(), installer)
            .run()
            .expect("run should succeed");

        let staged = paths.stage_dir().join("content.zip");
        assert_eq!(std::fs::read(&staged).expect("staged file should exist"), bytes);
    }

    let entries: Vec<_> = std::fs::read_dir(paths.stage_dir())
        .expect("stage dir should exist")
        .collect();
    assert_eq!(entries.len(), 1, "restaging must overwrite, not accumulate");
}

fn record_document(id: &str) -> String {
    format!(r#"{{"id": "{}"}}"#, id)
}

fn package_with_records(ids: &[&str]) -> Vec<u8> {
    let mut sub = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut sub);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (index, id) in ids.iter().enumerate() {
            zip.start_file(format!("records/master/{index}.json"), options)
                .expect("Failed to start file");
            zip.write_all(record_document(id).as_bytes())
                .expect("Failed to write");
        }
        zip.finish().expect("Failed to finish zip");
    }
    let sub = sub.into_inner();

    let mut buf = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        zip.start_file("items.zip", options).expect("Failed to start file");
        zip.write_all(&sub).expect("Failed to write");
        zip.finish().expect("Failed to finish zip");
    }
    buf.into_inner()
}

#[test]
fn fast_path_skips_when_the_store_already_has_every_record() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let paths = HostPaths::with_data_root(temp.path().to_path_buf());
    let installer = Arc::new(PathRecordingInstaller::default());

    let stores = MemoryStores::new().with_store(
        MemoryStore::new("master")
            .with_record(Record::new("site/home"))
            .with_record(Record::new("site/news")),
    );
    let descriptor = EmbeddedDescriptor {
        key: "demo",
        package_id: "host.demo.content.zip",
        bytes: package_with_records(&["site/home", "site/news"]),
        fast_path: true,
    };

    let report = loader_for(&paths, descriptor, stores, installer.clone())
        .run()
        .expect("run should succeed");

    assert!(installer.paths().is_empty(), "installer must not be invoked");
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].reason.contains("already exist"));
}

#[test]
fn fast_path_installs_when_a_record_is_missing() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let paths = HostPaths::with_data_root(temp.path().to_path_buf());
    let installer = Arc::new(PathRecordingInstaller::default());

    let stores = MemoryStores::new()
        .with_store(MemoryStore::new("master").with_record(Record::new("site/home")));
    let descriptor = EmbeddedDescriptor {
        key: "demo",
        package_id: "host.demo.content.zip",
        bytes: package_with_records(&["site/home", "site/news"]),
        fast_path: true,
    };

    let report = loader_for(&paths, descriptor, stores, installer.clone())
        .run()
        .expect("run should succeed");

    assert_eq!(installer.paths().len(), 1);
    assert_eq!(report.installed.len(), 1);
    assert_eq!(report.installed[0].key, "demo");
}
