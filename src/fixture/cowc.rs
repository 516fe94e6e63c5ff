//! Miniature COWC-style dataset.
//!
//! For every `.tbz` file a descriptor names, a small bzip2 tar of PNG patches
//! is written (`<stem>/<split>/patch_<k>.png`). The split files named by the
//! descriptor's `.bz2` entries list those patches with alternating labels.
//! The returned descriptor carries the MD5s of the generated files, so the
//! output directory can act as a download mirror for the real loader.

use anyhow::{bail, Context, Result};
use bzip2::write::BzEncoder;
use image::{Rgb, RgbImage};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::archive::{create_tar, TarCodec};
use crate::checksum::{md5_file, Checksum};
use crate::descriptor::{DatasetDescriptor, Split};
use crate::extract::ArchiveKind;

use super::FixtureReport;

const PATCH_SIZE: u32 = 8;

/// Result of [`generate`].
#[derive(Debug, Clone)]
pub struct CowcFixture {
    /// Directory holding the generated files; serve it with a `DirectoryFetcher`.
    pub mirror: PathBuf,
    /// `base` with every checksum replaced by the generated file's MD5.
    pub descriptor: DatasetDescriptor,
    pub train: Vec<(String, i64)>,
    pub test: Vec<(String, i64)>,
    pub report: FixtureReport,
}

impl CowcFixture {
    pub fn rows(&self, split: Split) -> &[(String, i64)] {
        match split {
            Split::Train => &self.train,
            Split::Test => &self.test,
        }
    }
}

/// Build a fixture shaped like `base` under `out_dir` with
/// `patches_per_split` patches per archive and split.
pub fn generate(
    base: &DatasetDescriptor,
    out_dir: &Path,
    patches_per_split: usize,
) -> Result<CowcFixture> {
    base.validate()?;

    let archives: Vec<&str> = base
        .files
        .iter()
        .map(|f| f.filename.as_str())
        .filter(|name| ArchiveKind::from_filename(name) == Some(ArchiveKind::TarBzip2))
        .collect();
    if archives.is_empty() {
        bail!("dataset '{}' names no .tbz archives", base.name);
    }

    let mirror = out_dir.join(&base.base_folder);
    if mirror.is_dir() {
        fs::remove_dir_all(&mirror)
            .with_context(|| format!("removing old fixture '{}'", mirror.display()))?;
    }
    fs::create_dir_all(&mirror)
        .with_context(|| format!("creating fixture directory '{}'", mirror.display()))?;

    let staging = out_dir.join(format!(".{}-staging", base.base_folder));
    let mut train = Vec::new();
    let mut test = Vec::new();

    for (archive_idx, archive) in archives.iter().enumerate() {
        let stem = archive.trim_end_matches(".tbz").trim_end_matches(".tar.bz2");
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        for split in Split::ALL {
            let split_dir = staging.join(split.as_str());
            fs::create_dir_all(&split_dir)
                .with_context(|| format!("creating '{}'", split_dir.display()))?;
            for k in 0..patches_per_split {
                let label = ((archive_idx + k) % 2) as i64;
                let name = format!("patch_{k}.png");
                write_patch(&split_dir.join(&name), label, archive_idx)?;
                let row = (format!("{stem}/{}/{name}", split.as_str()), label);
                match split {
                    Split::Train => train.push(row),
                    Split::Test => test.push(row),
                }
            }
        }
        create_tar(&staging, Some(stem), &mirror.join(archive), TarCodec::Bzip2)
            .with_context(|| format!("archiving '{archive}'"))?;
    }
    fs::remove_dir_all(&staging)
        .with_context(|| format!("removing '{}'", staging.display()))?;

    for split in Split::ALL {
        let compressed = format!("{}.bz2", base.split_filename(split));
        if !base.files.iter().any(|f| f.filename == compressed) {
            continue;
        }
        let rows = match split {
            Split::Train => &train,
            Split::Test => &test,
        };
        write_bz2_split(&mirror.join(&compressed), rows)?;
    }

    let mut descriptor = base.clone();
    let mut archives_out = Vec::with_capacity(descriptor.files.len());
    for file in &mut descriptor.files {
        let path = mirror.join(&file.filename);
        if !path.is_file() {
            bail!(
                "cannot generate '{}' for dataset '{}': unsupported file kind",
                file.filename,
                base.name
            );
        }
        let md5 = md5_file(&path)?;
        file.checksum = Checksum::md5(&md5)?;
        archives_out.push((path, md5));
    }

    Ok(CowcFixture {
        report: FixtureReport {
            data_dir: mirror.clone(),
            archives: archives_out,
        },
        mirror,
        descriptor,
        train,
        test,
    })
}

fn write_patch(path: &Path, label: i64, archive_idx: usize) -> Result<()> {
    let shade = (archive_idx as u8).wrapping_mul(40);
    let pixel = if label == 1 {
        Rgb([255, shade, 0])
    } else {
        Rgb([0, shade, 255])
    };
    RgbImage::from_pixel(PATCH_SIZE, PATCH_SIZE, pixel)
        .save(path)
        .with_context(|| format!("writing patch '{}'", path.display()))
}

fn write_bz2_split(path: &Path, rows: &[(String, i64)]) -> Result<()> {
    let out = File::create(path).with_context(|| format!("creating '{}'", path.display()))?;
    let mut enc = BzEncoder::new(BufWriter::new(out), bzip2::Compression::best());
    for (image, label) in rows {
        writeln!(enc, "{image} {label}")?;
    }
    enc.finish()?.flush()?;
    Ok(())
}
