//! Post-download extraction, dispatched on the filename suffix.
//!
//! Tar containers are unpacked into the destination directory. Single
//! compressed files are decompressed next to the original with the
//! compression suffix stripped (`list.txt.bz2` -> `list.txt`).
//!
//! Files with any other suffix are left alone and reported as
//! [`ExtractOutcome::Unrecognized`] with a warning, so a descriptor that names
//! a format this module does not handle is visible instead of silently
//! producing a dataset with missing images.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::fsutil::{atomic_rename, tmp_name};

/// Compression/container formats recognised by suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    /// `.tbz`, `.tar.bz2`
    TarBzip2,
    /// `.tgz`, `.tar.gz`
    TarGzip,
    /// `.tar.zst`
    TarZstd,
    /// `.tar`
    Tar,
    /// `.bz2` (single file)
    Bzip2,
    /// `.gz` (single file)
    Gzip,
}

// Longest suffix first so `.tar.bz2` wins over `.bz2`.
const SUFFIXES: &[(&str, ArchiveKind)] = &[
    (".tar.bz2", ArchiveKind::TarBzip2),
    (".tar.gz", ArchiveKind::TarGzip),
    (".tar.zst", ArchiveKind::TarZstd),
    (".tbz", ArchiveKind::TarBzip2),
    (".tgz", ArchiveKind::TarGzip),
    (".tar", ArchiveKind::Tar),
    (".bz2", ArchiveKind::Bzip2),
    (".gz", ArchiveKind::Gzip),
];

impl ArchiveKind {
    pub fn from_filename(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        SUFFIXES
            .iter()
            .find(|(suffix, _)| lower.ends_with(suffix) && lower.len() > suffix.len())
            .map(|(_, kind)| *kind)
    }

    /// Whether the format holds a directory tree rather than one file.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            ArchiveKind::TarBzip2 | ArchiveKind::TarGzip | ArchiveKind::TarZstd | ArchiveKind::Tar
        )
    }
}

/// What [`extract`] did with a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    Unpacked { kind: ArchiveKind, into: PathBuf },
    Decompressed { kind: ArchiveKind, output: PathBuf },
    Unrecognized,
}

/// Extract `path` according to its suffix.
///
/// Containers are unpacked into `dest_dir`; single compressed files are
/// written to `dest_dir/<name without suffix>`.
pub fn extract(path: &Path, dest_dir: &Path) -> Result<ExtractOutcome> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("'{}' has no UTF-8 file name", path.display()))?;

    let Some(kind) = ArchiveKind::from_filename(name) else {
        tracing::warn!(
            file = %path.display(),
            "no extractor for this suffix; leaving file as downloaded"
        );
        return Ok(ExtractOutcome::Unrecognized);
    };

    fs::create_dir_all(dest_dir)
        .with_context(|| format!("creating '{}'", dest_dir.display()))?;

    let f = File::open(path).with_context(|| format!("opening '{}'", path.display()))?;
    let reader = BufReader::new(f);

    if kind.is_container() {
        tracing::info!(archive = %path.display(), into = %dest_dir.display(), "unpacking");
        match kind {
            ArchiveKind::TarBzip2 => unpack_tar(bzip2::read::BzDecoder::new(reader), dest_dir),
            ArchiveKind::TarGzip => unpack_tar(flate2::read::GzDecoder::new(reader), dest_dir),
            ArchiveKind::TarZstd => unpack_tar(zstd::stream::Decoder::new(reader)?, dest_dir),
            _ => unpack_tar(reader, dest_dir),
        }
        .with_context(|| format!("Failed to unpack {}", path.display()))?;
        return Ok(ExtractOutcome::Unpacked {
            kind,
            into: dest_dir.to_path_buf(),
        });
    }

    let output = dest_dir.join(strip_suffix(name));
    tracing::info!(file = %path.display(), output = %output.display(), "decompressing");
    match kind {
        ArchiveKind::Bzip2 => {
            decompress_to(bzip2::read::MultiBzDecoder::new(reader), &output, dest_dir)
        }
        _ => decompress_to(flate2::read::MultiGzDecoder::new(reader), &output, dest_dir),
    }
    .with_context(|| format!("Failed to decompress {}", path.display()))?;

    Ok(ExtractOutcome::Decompressed { kind, output })
}

fn strip_suffix(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => name,
    }
}

fn unpack_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    // `unpack` refuses entries that would land outside `dest_dir`.
    archive.unpack(dest_dir)?;
    Ok(())
}

fn decompress_to<R: Read>(mut reader: R, output: &Path, dest_dir: &Path) -> Result<()> {
    let tmp = dest_dir.join(tmp_name("decompress"));
    let result = (|| -> Result<()> {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        io::copy(&mut reader, &mut writer)?;
        writer.flush()?;
        Ok(())
    })();
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    atomic_rename(&tmp, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn suffix_dispatch() {
        use ArchiveKind::*;
        assert_eq!(ArchiveKind::from_filename("COWC_Detection_Utah_AGRC.tbz"), Some(TarBzip2));
        assert_eq!(ArchiveKind::from_filename("x.tar.bz2"), Some(TarBzip2));
        assert_eq!(ArchiveKind::from_filename("x.TGZ"), Some(TarGzip));
        assert_eq!(ArchiveKind::from_filename("x.tar.gz"), Some(TarGzip));
        assert_eq!(ArchiveKind::from_filename("x.tar.zst"), Some(TarZstd));
        assert_eq!(ArchiveKind::from_filename("x.tar"), Some(Tar));
        assert_eq!(ArchiveKind::from_filename("list.txt.bz2"), Some(Bzip2));
        assert_eq!(ArchiveKind::from_filename("list.txt.gz"), Some(Gzip));
        assert_eq!(ArchiveKind::from_filename("scene.zip"), None);
        assert_eq!(ArchiveKind::from_filename(".bz2"), None);
    }

    #[test]
    fn bz2_file_is_decompressed_in_place() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("COWC_train_list_detection.txt.bz2");
        let mut enc = bzip2::write::BzEncoder::new(
            File::create(&path).unwrap(),
            bzip2::Compression::best(),
        );
        enc.write_all(b"a.png 1\nb.png 0\n").unwrap();
        enc.finish().unwrap();

        let outcome = extract(&path, tmp.path()).unwrap();
        let expected = tmp.path().join("COWC_train_list_detection.txt");
        assert_eq!(
            outcome,
            ExtractOutcome::Decompressed {
                kind: ArchiveKind::Bzip2,
                output: expected.clone()
            }
        );
        assert_eq!(fs::read(&expected).unwrap(), b"a.png 1\nb.png 0\n");
        assert!(path.exists(), "the compressed original is kept");
    }

    #[test]
    fn gz_file_is_decompressed_in_place() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("labels.csv.gz");
        let mut enc = flate2::write::GzEncoder::new(
            File::create(&path).unwrap(),
            flate2::Compression::default(),
        );
        enc.write_all(b"x,y\n").unwrap();
        enc.finish().unwrap();

        extract(&path, tmp.path()).unwrap();
        assert_eq!(fs::read(tmp.path().join("labels.csv")).unwrap(), b"x,y\n");
    }

    #[test]
    fn tbz_container_is_unpacked() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("patches.tbz");
        let enc = bzip2::write::BzEncoder::new(
            File::create(&path).unwrap(),
            bzip2::Compression::default(),
        );
        let mut builder = tar::Builder::new(enc);
        let data = b"pixels";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "Toronto/train/p0.png", &data[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let dest = tmp.path().join("out");
        let outcome = extract(&path, &dest).unwrap();
        assert!(matches!(
            outcome,
            ExtractOutcome::Unpacked {
                kind: ArchiveKind::TarBzip2,
                ..
            }
        ));
        assert_eq!(fs::read(dest.join("Toronto/train/p0.png")).unwrap(), b"pixels");
    }

    #[test]
    fn unknown_suffix_is_reported_not_extracted() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("scene.zip");
        fs::write(&path, b"PK").unwrap();
        let dest = tmp.path().join("out");

        assert_eq!(extract(&path, &dest).unwrap(), ExtractOutcome::Unrecognized);
        assert!(!dest.exists());
    }

    #[test]
    fn corrupt_bz2_leaves_no_output() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("list.txt.bz2");
        fs::write(&path, b"not bzip2 at all").unwrap();

        assert!(extract(&path, tmp.path()).is_err());
        assert!(!tmp.path().join("list.txt").exists());
        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
