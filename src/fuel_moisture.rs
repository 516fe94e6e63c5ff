//! Reader for fuel-moisture sample directories.
//!
//! Each sample lives in its own directory with a `stac.json` item and the
//! `labels.geojson` feature it points at. The STAC item names the target
//! property (`label:properties`); every other numeric property of the
//! feature is an input feature.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use walkdir::WalkDir;

use crate::error::DatasetError;
use crate::extract::{extract, ExtractOutcome};
use crate::fixture::fuel_moisture::{DATA_DIR, LABELS_FILENAME, STAC_FILENAME};

#[derive(Debug, Deserialize)]
struct StacItem {
    id: String,
    properties: StacProperties,
    #[serde(default)]
    assets: BTreeMap<String, StacAsset>,
}

#[derive(Debug, Deserialize)]
struct StacProperties {
    datetime: String,
    #[serde(rename = "label:properties", default)]
    label_properties: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StacAsset {
    href: String,
}

#[derive(Debug, Deserialize)]
struct LabelFeature {
    properties: Map<String, Value>,
    geometry: PointGeometry,
}

#[derive(Debug, Deserialize)]
struct PointGeometry {
    #[serde(rename = "type")]
    kind: String,
    coordinates: Vec<f64>,
}

/// One parsed sample.
#[derive(Debug, Clone, PartialEq)]
pub struct FuelMoistureSample {
    pub id: String,
    pub dir: PathBuf,
    pub target_name: String,
    pub target: f64,
    pub site: Option<String>,
    pub date: Option<String>,
    pub longitude: f64,
    pub latitude: f64,
    pub datetime: OffsetDateTime,
    /// Numeric properties other than the target, keyed by name.
    pub features: BTreeMap<String, f64>,
}

#[derive(Debug, Clone)]
pub struct FuelMoistureDataset {
    root: PathBuf,
    samples: Vec<FuelMoistureSample>,
}

impl FuelMoistureDataset {
    /// Read every sample directory below `root` (a directory holding one
    /// subdirectory per sample). Samples are ordered by directory name.
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(DatasetError::NotFoundOrCorrupted {
                dir: root.to_path_buf(),
            }
            .into());
        }

        let dirs = sample_dirs(root)?;
        let samples = dirs
            .iter()
            .map(|dir| read_sample(dir))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(root = %root.display(), samples = samples.len(), "loaded fuel moisture samples");

        Ok(Self {
            root: root.to_path_buf(),
            samples,
        })
    }

    /// Unpack a `su_sar_moisture_content.tar.gz` into `dest_dir` and open it.
    pub fn open_archive(archive: &Path, dest_dir: &Path) -> Result<Self> {
        match extract(archive, dest_dir)? {
            ExtractOutcome::Unpacked { .. } => Self::open(&dest_dir.join(DATA_DIR)),
            other => bail!(
                "'{}' is not a tar archive (got {other:?})",
                archive.display()
            ),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[FuelMoistureSample] {
        &self.samples
    }

    pub fn get(&self, index: usize) -> Result<&FuelMoistureSample> {
        self.samples.get(index).ok_or_else(|| {
            DatasetError::IndexOutOfRange {
                index,
                len: self.samples.len(),
            }
            .into()
        })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let f = File::open(path).with_context(|| format!("opening '{}'", path.display()))?;
    serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("parsing '{}'", path.display()))
}

/// Parse one sample directory.
pub fn read_sample(dir: &Path) -> Result<FuelMoistureSample> {
    let stac_path = dir.join(STAC_FILENAME);
    let stac: StacItem = read_json(&stac_path)?;

    let labels_href = stac
        .assets
        .get("labels")
        .map(|a| a.href.as_str())
        .unwrap_or(LABELS_FILENAME);
    let labels_path = dir.join(labels_href);
    if !labels_path.starts_with(dir) || labels_href.contains("..") {
        bail!(
            "labels asset '{}' in '{}' escapes the sample directory",
            labels_href,
            stac_path.display()
        );
    }
    let labels: LabelFeature = read_json(&labels_path)?;

    let Some(target_name) = stac.properties.label_properties.first().cloned() else {
        bail!("'{}' names no label:properties", stac_path.display());
    };
    let Some(target) = labels.properties.get(&target_name).and_then(Value::as_f64) else {
        bail!(
            "'{}' has no numeric '{}' property",
            labels_path.display(),
            target_name
        );
    };

    if labels.geometry.kind != "Point" || labels.geometry.coordinates.len() < 2 {
        bail!(
            "'{}' geometry must be a Point with two coordinates",
            labels_path.display()
        );
    }

    let datetime = OffsetDateTime::parse(&stac.properties.datetime, &Rfc3339).with_context(|| {
        format!(
            "datetime '{}' in '{}' is not RFC 3339",
            stac.properties.datetime,
            stac_path.display()
        )
    })?;

    let features = labels
        .properties
        .iter()
        .filter(|(name, _)| **name != target_name)
        .filter_map(|(name, value)| value.as_f64().map(|v| (name.clone(), v)))
        .collect();
    let text = |key: &str| {
        labels
            .properties
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    Ok(FuelMoistureSample {
        id: stac.id,
        dir: dir.to_path_buf(),
        target,
        site: text("site"),
        date: text("date"),
        longitude: labels.geometry.coordinates[0],
        latitude: labels.geometry.coordinates[1],
        datetime,
        features,
        target_name,
    })
}

/// Sample directories directly below `root`, sorted by name.
pub fn sample_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for ent in WalkDir::new(root).min_depth(1).max_depth(1).sort_by_file_name() {
        let ent = ent.with_context(|| format!("walking '{}'", root.display()))?;
        if ent.file_type().is_dir() && ent.path().join(STAC_FILENAME).is_file() {
            out.push(ent.into_path());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::fuel_moisture::{generate, NUM_SAMPLES};
    use std::fs;
    use tempfile::TempDir;
    use time::macros::datetime;

    #[test]
    fn reads_generated_samples() {
        let tmp = TempDir::new().unwrap();
        let report = generate(tmp.path()).unwrap();
        let dataset = FuelMoistureDataset::open(&report.data_dir).unwrap();

        assert_eq!(dataset.len(), NUM_SAMPLES);
        let sample = dataset.get(0).unwrap();
        assert_eq!(sample.id, "su_sar_moisture_content_0001");
        assert_eq!(sample.target_name, "percent(t)");
        assert!((sample.target - 132.6666667).abs() < 1e-9);
        assert_eq!(sample.site.as_deref(), Some("Blackstone"));
        assert_eq!(sample.date.as_deref(), Some("6/30/15"));
        assert!((sample.latitude - 42.44111111).abs() < 1e-9);
        assert_eq!(sample.datetime, datetime!(2015-06-30 00:00 UTC));
        assert!(!sample.features.contains_key("percent(t)"));
        assert!(!sample.features.contains_key("site"));
        assert!(sample.features.contains_key("vh_vv(t-3)"));
    }

    #[test]
    fn samples_are_ordered_by_directory() {
        let tmp = TempDir::new().unwrap();
        let report = generate(tmp.path()).unwrap();
        let dataset = FuelMoistureDataset::open(&report.data_dir).unwrap();
        let dirs: Vec<_> = dataset.samples().iter().map(|s| s.dir.clone()).collect();
        assert_eq!(dirs, sample_dirs(&report.data_dir).unwrap());
    }

    #[test]
    fn opens_the_generated_archive() {
        let tmp = TempDir::new().unwrap();
        let report = generate(&tmp.path().join("out")).unwrap();
        let (archive, _) = &report.archives[0];

        let dataset = FuelMoistureDataset::open_archive(archive, &tmp.path().join("unpacked")).unwrap();
        assert_eq!(dataset.len(), NUM_SAMPLES);
    }

    #[test]
    fn out_of_range_index() {
        let tmp = TempDir::new().unwrap();
        let report = generate(tmp.path()).unwrap();
        let dataset = FuelMoistureDataset::open(&report.data_dir).unwrap();
        let err = dataset.get(NUM_SAMPLES).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn missing_root_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = FuelMoistureDataset::open(&tmp.path().join("nope")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::NotFoundOrCorrupted { .. })
        ));
    }

    #[test]
    fn bad_datetime_is_reported() {
        let tmp = TempDir::new().unwrap();
        let report = generate(tmp.path()).unwrap();
        let dir = sample_dirs(&report.data_dir).unwrap().remove(0);
        let stac = fs::read_to_string(dir.join(STAC_FILENAME)).unwrap();
        fs::write(
            dir.join(STAC_FILENAME),
            stac.replace("2015-06-30T00:00:00Z", "30/06/2015"),
        )
        .unwrap();

        let err = read_sample(&dir).unwrap_err();
        assert!(format!("{err:#}").contains("RFC 3339"));
    }
}
