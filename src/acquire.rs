//! Download, verify and extract the files a descriptor names.
//!
//! The loop is sequential. A file whose local digest already matches is never
//! fetched again, so re-running against a complete dataset directory makes no
//! fetcher calls at all. A digest mismatch after download is fatal and not
//! retried.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::Path;

use crate::checksum::{check_integrity, digest_file};
use crate::descriptor::{DatasetDescriptor, RemoteFile};
use crate::error::DatasetError;
use crate::extract::{extract, ExtractOutcome};
use crate::fetch::Fetcher;
use crate::fsutil::{atomic_rename, tmp_name};

const LOCK_FILENAME: &str = ".download.lock";

/// What a call to [`acquire`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquireReport {
    /// Filenames fetched during this call.
    pub fetched: Vec<String>,
    /// Filenames whose local copy already matched.
    pub already_valid: Vec<String>,
    /// Extraction result per filename, in descriptor order.
    pub extracted: Vec<(String, ExtractOutcome)>,
}

impl AcquireReport {
    /// True when the dataset was complete before the call.
    pub fn was_complete(&self) -> bool {
        self.fetched.is_empty() && self.extracted.is_empty()
    }

    /// Filenames no extractor recognised.
    pub fn unrecognized(&self) -> impl Iterator<Item = &str> {
        self.extracted
            .iter()
            .filter(|(_, outcome)| *outcome == ExtractOutcome::Unrecognized)
            .map(|(name, _)| name.as_str())
    }
}

/// Whether every file of `descriptor` is present under `root` with the
/// published digest.
pub fn dataset_is_intact(root: &Path, descriptor: &DatasetDescriptor) -> Result<bool> {
    let dir = descriptor.dataset_dir(root);
    for file in &descriptor.files {
        if !check_integrity(&dir.join(&file.filename), &file.checksum)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Fetch whatever is missing or corrupt, then extract every file.
///
/// Returns early with an empty report when the dataset is already intact.
pub fn acquire(
    root: &Path,
    descriptor: &DatasetDescriptor,
    fetcher: &dyn Fetcher,
) -> Result<AcquireReport> {
    descriptor.validate()?;

    if dataset_is_intact(root, descriptor)? {
        tracing::info!(dataset = %descriptor.name, "files already downloaded and verified");
        return Ok(AcquireReport::default());
    }

    let dir = descriptor.dataset_dir(root);
    fs::create_dir_all(&dir)
        .with_context(|| format!("creating dataset directory '{}'", dir.display()))?;
    let _lock = DownloadLock::acquire(&dir)?;

    let mut report = AcquireReport::default();
    for file in &descriptor.files {
        let path = dir.join(&file.filename);
        if check_integrity(&path, &file.checksum)? {
            report.already_valid.push(file.filename.clone());
        } else {
            download_verified(descriptor, file, &dir, fetcher)?;
            report.fetched.push(file.filename.clone());
        }

        let outcome = extract(&path, &dir)
            .with_context(|| format!("extracting '{}'", path.display()))?;
        report.extracted.push((file.filename.clone(), outcome));
    }

    tracing::info!(
        dataset = %descriptor.name,
        fetched = report.fetched.len(),
        reused = report.already_valid.len(),
        "dataset acquired"
    );
    Ok(report)
}

fn download_verified(
    descriptor: &DatasetDescriptor,
    file: &RemoteFile,
    dir: &Path,
    fetcher: &dyn Fetcher,
) -> Result<()> {
    let url = descriptor.url_for(&file.filename);
    let dest = dir.join(&file.filename);
    let tmp = dir.join(tmp_name(&file.filename));

    if let Err(e) = fetcher.fetch(&url, &tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(e.context(format!("downloading {url}")));
    }

    let actual = digest_file(&tmp, file.checksum.algorithm())?;
    if !file.checksum.matches(&actual) {
        let _ = fs::remove_file(&tmp);
        return Err(DatasetError::IntegrityMismatch {
            path: dest,
            expected: file.checksum.hex().to_string(),
            actual,
        }
        .into());
    }

    atomic_rename(&tmp, &dest)
}

/// Exclusive advisory lock on a dataset directory; released when the file
/// handle drops. The lock file itself is never unlinked, so every process
/// contends on the same inode.
#[derive(Debug)]
struct DownloadLock {
    _file: File,
}

impl DownloadLock {
    fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(LOCK_FILENAME);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to create lock file: {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            return Err(DatasetError::DownloadLocked { lock: path }.into());
        }
        Ok(Self { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{md5_file, Checksum};
    use std::cell::RefCell;
    use std::io::Write;
    use tempfile::TempDir;

    /// Serves a fixed payload per filename and records every URL requested.
    struct RecordingFetcher {
        payloads: Vec<(String, Vec<u8>)>,
        calls: RefCell<Vec<String>>,
    }

    impl Fetcher for RecordingFetcher {
        fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
            self.calls.borrow_mut().push(url.to_string());
            let (_, bytes) = self
                .payloads
                .iter()
                .find(|(name, _)| url.ends_with(name.as_str()))
                .with_context(|| format!("no payload for {url}"))?;
            fs::write(dest, bytes)?;
            Ok(())
        }
    }

    fn bz2(bytes: &[u8]) -> Vec<u8> {
        let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::best());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    fn descriptor_for(tmp: &Path, payloads: &[(String, Vec<u8>)]) -> DatasetDescriptor {
        let files = payloads
            .iter()
            .map(|(name, bytes)| {
                let staged = tmp.join(format!("staged-{name}"));
                fs::write(&staged, bytes).unwrap();
                RemoteFile {
                    filename: name.clone(),
                    checksum: Checksum::md5(&md5_file(&staged).unwrap()).unwrap(),
                }
            })
            .collect();
        DatasetDescriptor {
            name: "tiny".to_string(),
            base_folder: "tiny".to_string(),
            base_url: "https://example.org/tiny/".to_string(),
            files,
            split_template: "{split}.txt".to_string(),
        }
    }

    #[test]
    fn acquire_fetches_verifies_and_extracts() {
        let tmp = TempDir::new().unwrap();
        let payloads = vec![
            ("train.txt.bz2".to_string(), bz2(b"a.png 1\n")),
            ("notes.pdf".to_string(), b"%PDF".to_vec()),
        ];
        let descriptor = descriptor_for(tmp.path(), &payloads);
        let fetcher = RecordingFetcher {
            payloads,
            calls: RefCell::new(vec![]),
        };
        let root = tmp.path().join("data");

        let report = acquire(&root, &descriptor, &fetcher).unwrap();

        assert_eq!(report.fetched, vec!["train.txt.bz2", "notes.pdf"]);
        assert_eq!(
            fetcher.calls.borrow().as_slice(),
            [
                "https://example.org/tiny/train.txt.bz2",
                "https://example.org/tiny/notes.pdf"
            ]
        );
        assert_eq!(
            fs::read(root.join("tiny/train.txt")).unwrap(),
            b"a.png 1\n"
        );
        assert_eq!(report.unrecognized().collect::<Vec<_>>(), vec!["notes.pdf"]);
        assert!(!root.join("tiny").join(LOCK_FILENAME).exists());
    }

    #[test]
    fn acquire_is_idempotent_once_intact() {
        let tmp = TempDir::new().unwrap();
        let payloads = vec![("train.txt.bz2".to_string(), bz2(b"a.png 1\n"))];
        let descriptor = descriptor_for(tmp.path(), &payloads);
        let fetcher = RecordingFetcher {
            payloads,
            calls: RefCell::new(vec![]),
        };
        let root = tmp.path().join("data");

        acquire(&root, &descriptor, &fetcher).unwrap();
        assert_eq!(fetcher.calls.borrow().len(), 1);

        let second = acquire(&root, &descriptor, &fetcher).unwrap();
        assert!(second.was_complete());
        assert_eq!(fetcher.calls.borrow().len(), 1, "no network call on rerun");
        assert!(dataset_is_intact(&root, &descriptor).unwrap());
    }

    #[test]
    fn acquire_only_fetches_missing_files() {
        let tmp = TempDir::new().unwrap();
        let payloads = vec![
            ("train.txt.bz2".to_string(), bz2(b"a.png 1\n")),
            ("test.txt.bz2".to_string(), bz2(b"b.png 0\n")),
        ];
        let descriptor = descriptor_for(tmp.path(), &payloads);
        let root = tmp.path().join("data");
        fs::create_dir_all(root.join("tiny")).unwrap();
        fs::write(root.join("tiny/train.txt.bz2"), &payloads[0].1).unwrap();

        let fetcher = RecordingFetcher {
            payloads,
            calls: RefCell::new(vec![]),
        };
        let report = acquire(&root, &descriptor, &fetcher).unwrap();

        assert_eq!(report.already_valid, vec!["train.txt.bz2"]);
        assert_eq!(report.fetched, vec!["test.txt.bz2"]);
        assert_eq!(report.extracted.len(), 2);
    }

    #[test]
    fn checksum_mismatch_after_download_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let mut descriptor = descriptor_for(
            tmp.path(),
            &[("train.txt.bz2".to_string(), bz2(b"a.png 1\n"))],
        );
        descriptor.files[0].checksum = Checksum::md5("00000000000000000000000000000000").unwrap();
        let fetcher = RecordingFetcher {
            payloads: vec![("train.txt.bz2".to_string(), bz2(b"a.png 1\n"))],
            calls: RefCell::new(vec![]),
        };
        let root = tmp.path().join("data");

        let err = acquire(&root, &descriptor, &fetcher).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::IntegrityMismatch { .. })
        ));
        assert_eq!(fetcher.calls.borrow().len(), 1, "mismatch is not retried");
        assert!(!root.join("tiny/train.txt.bz2").exists());
    }

    #[test]
    fn held_lock_is_reported() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("tiny");
        fs::create_dir_all(&dir).unwrap();

        let _held = DownloadLock::acquire(&dir).unwrap();
        let err = DownloadLock::acquire(&dir).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::DownloadLocked { .. })
        ));
    }

    #[test]
    fn released_lock_keeps_its_file() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("tiny");
        fs::create_dir_all(&dir).unwrap();

        drop(DownloadLock::acquire(&dir).unwrap());
        assert!(dir.join(LOCK_FILENAME).is_file());

        let _again = DownloadLock::acquire(&dir).unwrap();
        let err = DownloadLock::acquire(&dir).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::DownloadLocked { .. })
        ));
    }
}
