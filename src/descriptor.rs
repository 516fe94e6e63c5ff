//! Dataset descriptors: where a dataset lives and which files make it up.
//!
//! A descriptor is plain data. The built-in COWC tables below and any
//! `[[dataset]]` tables loaded from TOML produce the same record, and a single
//! generic loader ([`crate::dataset::ClassificationDataset`]) consumes it.
//!
//! ```toml
//! [[dataset]]
//! name = "my_patches"
//! base_folder = "my_patches"
//! base_url = "https://example.org/patches/"
//! split_template = "{split}_list.txt"
//!
//! [[dataset.files]]
//! filename = "train_list.txt.bz2"
//! md5 = "187543d20fa6d591b8da51136e8ef8fb"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::checksum::{Algorithm, Checksum};
use crate::fsutil::validate_segment;

/// Placeholder substituted with the split name in [`DatasetDescriptor::split_template`].
pub const SPLIT_PLACEHOLDER: &str = "{split}";

/// Names accepted by [`builtin`].
pub const BUILTIN_NAMES: &[&str] = &[COWC_DETECTION, COWC_COUNTING];

pub const COWC_DETECTION: &str = "cowc_detection";
pub const COWC_COUNTING: &str = "cowc_counting";

const COWC_DETECTION_URL: &str =
    "https://gdo152.llnl.gov/cowc/download/cowc/datasets/patch_sets/detection/";
const COWC_DETECTION_FILES: &[(&str, &str)] = &[
    ("COWC_train_list_detection.txt.bz2", "c954a5a3dac08c220b10cfbeec83893c"),
    ("COWC_test_list_detection.txt.bz2", "c6c2d0a78f12a2ad88b286b724a57c1a"),
    ("COWC_Detection_Toronto_ISPRS.tbz", "11af24f43b198b0f13c8e94814008a48"),
    ("COWC_Detection_Selwyn_LINZ.tbz", "22fd37a86961010f5d519a7da0e1fc72"),
    ("COWC_Detection_Potsdam_ISPRS.tbz", "bf053545cc1915d8b6597415b746fe48"),
    ("COWC_Detection_Vaihingen_ISPRS.tbz", "23945d5b22455450a938382ccc2a8b27"),
    ("COWC_Detection_Columbus_CSUAV_AFRL.tbz", "f40522dc97bea41b10117d4a5b946a6f"),
    ("COWC_Detection_Utah_AGRC.tbz", "195da7c9443a939a468c9f232fd86ee3"),
];

const COWC_COUNTING_URL: &str =
    "https://gdo152.llnl.gov/cowc/download/cowc/datasets/patch_sets/counting/";
const COWC_COUNTING_FILES: &[(&str, &str)] = &[
    ("COWC_train_list_64_class.txt.bz2", "187543d20fa6d591b8da51136e8ef8fb"),
    ("COWC_test_list_64_class.txt.bz2", "930cfd6e160a7b36db03146282178807"),
    ("COWC_Counting_Toronto_ISPRS.tbz", "bc2613196dfa93e66d324ae43e7c1fdb"),
    ("COWC_Counting_Selwyn_LINZ.tbz", "ea842ae055f5c74d0d933d2194764545"),
    ("COWC_Counting_Potsdam_ISPRS.tbz", "19a77ab9932b722ef52b197d70e68ce7"),
    ("COWC_Counting_Vaihingen_ISPRS.tbz", "4009c1e420566390746f5b4db02afdb9"),
    ("COWC_Counting_Columbus_CSUAV_AFRL.tbz", "daf8033c4e8ceebbf2c3cac3fabb8b10"),
    ("COWC_Counting_Utah_AGRC.tbz", "777ec107ed2a3d54597a739ce74f95ad"),
];

/// Which half of a dataset to index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub const ALL: [Split; 2] = [Split::Train, Split::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "test" => Ok(Split::Test),
            other => bail!("unsupported split '{}' (expected 'train' or 'test')", other),
        }
    }
}

/// One downloadable file and its published digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub filename: String,
    pub checksum: Checksum,
}

/// Everything needed to acquire and index one dataset variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetDescriptor {
    /// Identifier used on the command line and in configuration.
    pub name: String,
    /// Subdirectory of the data root the dataset is stored in.
    pub base_folder: String,
    /// Prefix each filename is appended to when downloading.
    pub base_url: String,
    pub files: Vec<RemoteFile>,
    /// Split-file name with a `{split}` placeholder.
    pub split_template: String,
}

impl DatasetDescriptor {
    pub fn dataset_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.base_folder)
    }

    pub fn url_for(&self, filename: &str) -> String {
        if self.base_url.ends_with('/') {
            format!("{}{}", self.base_url, filename)
        } else {
            format!("{}/{}", self.base_url, filename)
        }
    }

    pub fn split_filename(&self, split: Split) -> String {
        self.split_template.replace(SPLIT_PLACEHOLDER, split.as_str())
    }

    pub fn split_path(&self, root: &Path, split: Split) -> PathBuf {
        self.dataset_dir(root).join(self.split_filename(split))
    }

    pub fn validate(&self) -> Result<()> {
        validate_segment(&self.name, "dataset name")?;
        validate_segment(&self.base_folder, "dataset base_folder")?;
        if self.base_url.trim().is_empty() {
            bail!("dataset '{}': base_url must not be empty", self.name);
        }
        if !self.split_template.contains(SPLIT_PLACEHOLDER) {
            bail!(
                "dataset '{}': split_template '{}' must contain '{}'",
                self.name,
                self.split_template,
                SPLIT_PLACEHOLDER
            );
        }
        validate_segment(&self.split_filename(Split::Train), "split filename")?;
        if self.files.is_empty() {
            bail!("dataset '{}': at least one file is required", self.name);
        }
        for file in &self.files {
            validate_segment(&file.filename, "dataset filename")
                .with_context(|| format!("dataset '{}'", self.name))?;
        }
        Ok(())
    }
}

fn from_table(
    name: &str,
    base_url: &str,
    files: &[(&str, &str)],
    split_template: &str,
) -> DatasetDescriptor {
    let files = files
        .iter()
        .map(|(filename, md5)| RemoteFile {
            filename: filename.to_string(),
            checksum: Checksum::from_table(Algorithm::Md5, md5),
        })
        .collect();
    DatasetDescriptor {
        name: name.to_string(),
        base_folder: name.to_string(),
        base_url: base_url.to_string(),
        files,
        split_template: split_template.to_string(),
    }
}

/// COWC patch set for car detection (binary labels).
pub fn cowc_detection() -> DatasetDescriptor {
    from_table(
        COWC_DETECTION,
        COWC_DETECTION_URL,
        COWC_DETECTION_FILES,
        "COWC_{split}_list_detection.txt",
    )
}

/// COWC patch set for car counting (64 count classes).
pub fn cowc_counting() -> DatasetDescriptor {
    from_table(
        COWC_COUNTING,
        COWC_COUNTING_URL,
        COWC_COUNTING_FILES,
        "COWC_{split}_list_64_class.txt",
    )
}

pub fn builtin(name: &str) -> Option<DatasetDescriptor> {
    match name {
        COWC_DETECTION => Some(cowc_detection()),
        COWC_COUNTING => Some(cowc_counting()),
        _ => None,
    }
}

/// Look a name up among the built-ins first, then in `extra`.
pub fn resolve(name: &str, extra: &[DatasetDescriptor]) -> Result<DatasetDescriptor> {
    if let Some(descriptor) = builtin(name) {
        return Ok(descriptor);
    }
    if let Some(descriptor) = extra.iter().find(|d| d.name == name) {
        return Ok(descriptor.clone());
    }
    let mut known: Vec<&str> = BUILTIN_NAMES.to_vec();
    known.extend(extra.iter().map(|d| d.name.as_str()));
    bail!(
        "unknown dataset '{}' (known: {})",
        name,
        known.join(", ")
    )
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DescriptorFileToml {
    #[serde(default)]
    dataset: Vec<DatasetToml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DatasetToml {
    name: String,
    base_folder: Option<String>,
    base_url: String,
    split_template: String,
    files: Vec<RemoteFileToml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RemoteFileToml {
    filename: String,
    md5: Option<String>,
    sha256: Option<String>,
}

/// Parse `[[dataset]]` tables from TOML text. `origin` only labels errors.
pub fn parse_descriptors(text: &str, origin: &Path) -> Result<Vec<DatasetDescriptor>> {
    let parsed: DescriptorFileToml = toml::from_str(text)
        .with_context(|| format!("parsing dataset descriptors '{}'", origin.display()))?;

    let mut out = Vec::with_capacity(parsed.dataset.len());
    for raw in parsed.dataset {
        let name = raw.name.trim().to_string();
        let mut files = Vec::with_capacity(raw.files.len());
        for file in raw.files {
            let checksum = match (file.md5.as_deref(), file.sha256.as_deref()) {
                (Some(md5), None) => Checksum::new(Algorithm::Md5, md5),
                (None, Some(sha256)) => Checksum::new(Algorithm::Sha256, sha256),
                _ => bail!(
                    "invalid descriptor '{}': file '{}' of dataset '{}' needs exactly one of md5 or sha256",
                    origin.display(),
                    file.filename,
                    name
                ),
            }
            .with_context(|| {
                format!(
                    "invalid descriptor '{}': dataset '{}' file '{}'",
                    origin.display(),
                    name,
                    file.filename
                )
            })?;
            files.push(RemoteFile {
                filename: file.filename.trim().to_string(),
                checksum,
            });
        }

        let descriptor = DatasetDescriptor {
            base_folder: raw
                .base_folder
                .map(|folder| folder.trim().to_string())
                .unwrap_or_else(|| name.clone()),
            name,
            base_url: raw.base_url.trim().to_string(),
            files,
            split_template: raw.split_template.trim().to_string(),
        };
        descriptor
            .validate()
            .with_context(|| format!("invalid descriptor '{}'", origin.display()))?;
        if out.iter().any(|d: &DatasetDescriptor| d.name == descriptor.name) {
            bail!(
                "invalid descriptor '{}': dataset '{}' is defined twice",
                origin.display(),
                descriptor.name
            );
        }
        out.push(descriptor);
    }
    Ok(out)
}

pub fn load_descriptors(path: &Path) -> Result<Vec<DatasetDescriptor>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading dataset descriptors '{}'", path.display()))?;
    parse_descriptors(&text, path)
}
