//! Test-data generators.
//!
//! - [`fuel_moisture`] - GeoJSON/STAC sample directories plus a `.tar.gz`
//! - [`cowc`] - a miniature COWC patch set usable as a download mirror
//!
//! Both are deterministic: the same inputs produce byte-identical files and
//! archives, so the printed checksums can be pinned.

pub mod cowc;
pub mod fuel_moisture;

use std::path::PathBuf;

/// Files a generator wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureReport {
    /// Root of the generated tree.
    pub data_dir: PathBuf,
    /// Every archive (or compressed file) with its MD5.
    pub archives: Vec<(PathBuf, String)>,
}
