//! Index-addressable image classification datasets.
//!
//! [`ClassificationDataset`] is the single generic loader: given a data root,
//! a [`DatasetDescriptor`] and a [`Split`], it optionally acquires the files,
//! refuses to continue unless every file verifies, reads the split file into
//! an ordered index and then decodes images on demand.
//!
//! # Example
//!
//! ```rust,ignore
//! use geo_datasets::dataset::ClassificationDataset;
//! use geo_datasets::descriptor::{cowc_detection, Split};
//!
//! let ds = ClassificationDataset::builder("data", cowc_detection())
//!     .split(Split::Test)
//!     .download(true)
//!     .build()?;
//! let sample = ds.get(0)?;
//! println!("{}x{} label={}", sample.image.width(), sample.image.height(), sample.label);
//! ```

use anyhow::{Context, Result};
use image::RgbImage;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::acquire::{acquire, dataset_is_intact};
use crate::descriptor::{cowc_counting, cowc_detection, DatasetDescriptor, Split};
use crate::error::DatasetError;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::split::{load_split, SplitEntry};

pub type ImageTransform = Box<dyn Fn(RgbImage) -> RgbImage + Send + Sync>;
pub type TargetTransform = Box<dyn Fn(i64) -> i64 + Send + Sync>;
pub type JointTransform = Box<dyn Fn(RgbImage, i64) -> (RgbImage, i64) + Send + Sync>;

/// A decoded image and its label.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub image: RgbImage,
    pub label: i64,
}

/// Builder for [`ClassificationDataset`].
pub struct ClassificationDatasetBuilder {
    root: PathBuf,
    descriptor: DatasetDescriptor,
    split: Split,
    download: bool,
    fetcher: Option<Box<dyn Fetcher>>,
    transform: Option<ImageTransform>,
    target_transform: Option<TargetTransform>,
    transforms: Option<JointTransform>,
}

impl ClassificationDatasetBuilder {
    pub fn split(mut self, split: Split) -> Self {
        self.split = split;
        self
    }

    /// Fetch missing or corrupt files before verifying.
    pub fn download(mut self, yes: bool) -> Self {
        self.download = yes;
        self
    }

    /// Source used when downloading. Defaults to [`HttpFetcher`].
    pub fn fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Some(Box::new(fetcher));
        self
    }

    /// Applied to every decoded image.
    pub fn transform(mut self, f: impl Fn(RgbImage) -> RgbImage + Send + Sync + 'static) -> Self {
        self.transform = Some(Box::new(f));
        self
    }

    /// Applied to every label.
    pub fn target_transform(mut self, f: impl Fn(i64) -> i64 + Send + Sync + 'static) -> Self {
        self.target_transform = Some(Box::new(f));
        self
    }

    /// Applied to the (image, label) pair after the individual transforms.
    pub fn transforms(
        mut self,
        f: impl Fn(RgbImage, i64) -> (RgbImage, i64) + Send + Sync + 'static,
    ) -> Self {
        self.transforms = Some(Box::new(f));
        self
    }

    pub fn build(self) -> Result<ClassificationDataset> {
        self.descriptor.validate()?;

        if self.download {
            let report = match self.fetcher.as_deref() {
                Some(fetcher) => acquire(&self.root, &self.descriptor, fetcher)?,
                None => acquire(&self.root, &self.descriptor, &HttpFetcher::new()?)?,
            };
            for name in report.unrecognized() {
                tracing::warn!(
                    dataset = %self.descriptor.name,
                    file = name,
                    "file was downloaded but not extracted"
                );
            }
        }

        if !dataset_is_intact(&self.root, &self.descriptor)? {
            return Err(DatasetError::NotFoundOrCorrupted {
                dir: self.descriptor.dataset_dir(&self.root),
            }
            .into());
        }

        let split_path = self.descriptor.split_path(&self.root, self.split);
        let entries = load_split(&split_path).with_context(|| {
            format!(
                "loading {} split of '{}'",
                self.split, self.descriptor.name
            )
        })?;
        tracing::debug!(
            dataset = %self.descriptor.name,
            split = %self.split,
            samples = entries.len(),
            "indexed split"
        );

        Ok(ClassificationDataset {
            dir: self.descriptor.dataset_dir(&self.root),
            descriptor: self.descriptor,
            split: self.split,
            entries,
            transform: self.transform,
            target_transform: self.target_transform,
            transforms: self.transforms,
        })
    }
}

/// Split-file indexed image dataset.
///
/// The index is fixed at construction; images are re-read from disk on every
/// [`get`](Self::get).
pub struct ClassificationDataset {
    descriptor: DatasetDescriptor,
    split: Split,
    dir: PathBuf,
    entries: Vec<SplitEntry>,
    transform: Option<ImageTransform>,
    target_transform: Option<TargetTransform>,
    transforms: Option<JointTransform>,
}

impl ClassificationDataset {
    pub fn builder(
        root: impl Into<PathBuf>,
        descriptor: DatasetDescriptor,
    ) -> ClassificationDatasetBuilder {
        ClassificationDatasetBuilder {
            root: root.into(),
            descriptor,
            split: Split::Train,
            download: false,
            fetcher: None,
            transform: None,
            target_transform: None,
            transforms: None,
        }
    }

    /// COWC car detection patches.
    pub fn cowc_detection(root: impl Into<PathBuf>) -> ClassificationDatasetBuilder {
        Self::builder(root, cowc_detection())
    }

    /// COWC car counting patches.
    pub fn cowc_counting(root: impl Into<PathBuf>) -> ClassificationDatasetBuilder {
        Self::builder(root, cowc_counting())
    }

    pub fn descriptor(&self) -> &DatasetDescriptor {
        &self.descriptor
    }

    pub fn split(&self) -> Split {
        self.split
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[SplitEntry] {
        &self.entries
    }

    /// Absolute path of the image behind `index`.
    pub fn image_path(&self, index: usize) -> Result<PathBuf> {
        Ok(self.dir.join(&self.entry(index)?.image))
    }

    /// Decode the image at `index` as 8-bit RGB and apply the transforms.
    pub fn get(&self, index: usize) -> Result<Sample> {
        let entry = self.entry(index)?;
        let path = self.dir.join(&entry.image);
        let mut image = image::open(&path)
            .with_context(|| format!("decoding image '{}'", path.display()))?
            .to_rgb8();
        let mut label = entry.label;

        if let Some(f) = &self.transform {
            image = f(image);
        }
        if let Some(f) = &self.target_transform {
            label = f(label);
        }
        if let Some(f) = &self.transforms {
            (image, label) = f(image, label);
        }

        Ok(Sample { image, label })
    }

    fn entry(&self, index: usize) -> Result<&SplitEntry> {
        self.entries.get(index).ok_or_else(|| {
            DatasetError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            }
            .into()
        })
    }
}

impl fmt::Debug for ClassificationDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassificationDataset")
            .field("dataset", &self.descriptor.name)
            .field("split", &self.split)
            .field("dir", &self.dir)
            .field("len", &self.entries.len())
            .field("transform", &self.transform.is_some())
            .field("target_transform", &self.target_transform.is_some())
            .field("transforms", &self.transforms.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{md5_file, Checksum};
    use crate::descriptor::RemoteFile;
    use image::Rgb;
    use std::fs;
    use tempfile::TempDir;

    /// Lays out an already-extracted dataset: two PNGs plus the split files.
    fn extracted_dataset(root: &Path) -> DatasetDescriptor {
        let dir = root.join("tiny");
        fs::create_dir_all(&dir).unwrap();
        RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]))
            .save(dir.join("img001.png"))
            .unwrap();
        image::GrayImage::from_pixel(3, 1, image::Luma([7]))
            .save(dir.join("img002.png"))
            .unwrap();
        fs::write(dir.join("train.txt"), "img001.png 1\nimg002.png 0").unwrap();
        fs::write(dir.join("test.txt"), "").unwrap();

        DatasetDescriptor {
            name: "tiny".to_string(),
            base_folder: "tiny".to_string(),
            base_url: "https://example.org/tiny/".to_string(),
            files: vec![RemoteFile {
                filename: "train.txt".to_string(),
                checksum: Checksum::md5(&md5_file(&dir.join("train.txt")).unwrap()).unwrap(),
            }],
            split_template: "{split}.txt".to_string(),
        }
    }

    #[test]
    fn labels_follow_split_rows() {
        let tmp = TempDir::new().unwrap();
        let descriptor = extracted_dataset(tmp.path());

        let ds = ClassificationDataset::builder(tmp.path(), descriptor)
            .build()
            .unwrap();
        assert_eq!(ds.len(), 2);

        let first = ds.get(0).unwrap();
        assert_eq!(first.label, 1);
        assert_eq!(first.image.dimensions(), (2, 2));
        assert_eq!(first.image.get_pixel(0, 0), &Rgb([255, 0, 0]));

        let second = ds.get(1).unwrap();
        assert_eq!(second.label, 0);
        assert_eq!(second.image.get_pixel(2, 0), &Rgb([7, 7, 7]), "grayscale is expanded");
    }

    #[test]
    fn index_equal_to_len_is_out_of_range() {
        let tmp = TempDir::new().unwrap();
        let descriptor = extracted_dataset(tmp.path());
        let ds = ClassificationDataset::builder(tmp.path(), descriptor)
            .build()
            .unwrap();

        let err = ds.get(ds.len()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::IndexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn empty_split_is_empty() {
        let tmp = TempDir::new().unwrap();
        let descriptor = extracted_dataset(tmp.path());
        let ds = ClassificationDataset::builder(tmp.path(), descriptor)
            .split(Split::Test)
            .build()
            .unwrap();
        assert!(ds.is_empty());
    }

    #[test]
    fn missing_data_without_download_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = ClassificationDataset::cowc_detection(tmp.path())
            .build()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::NotFoundOrCorrupted { .. })
        ));
        assert!(err.to_string().contains("download=true"));
    }

    #[test]
    fn corrupted_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let descriptor = extracted_dataset(tmp.path());
        fs::write(tmp.path().join("tiny/train.txt"), "img001.png 5\n").unwrap();

        let err = ClassificationDataset::builder(tmp.path(), descriptor)
            .build()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::NotFoundOrCorrupted { .. })
        ));
    }

    #[test]
    fn transforms_apply_in_order() {
        let tmp = TempDir::new().unwrap();
        let descriptor = extracted_dataset(tmp.path());
        let ds = ClassificationDataset::builder(tmp.path(), descriptor)
            .transform(|img| image::imageops::flip_horizontal(&img))
            .target_transform(|label| label + 10)
            .transforms(|img, label| (img, label * 2))
            .build()
            .unwrap();

        assert_eq!(ds.get(0).unwrap().label, 22);
        assert_eq!(ds.get(1).unwrap().label, 20);
    }

    #[test]
    fn every_access_rereads_disk() {
        let tmp = TempDir::new().unwrap();
        let descriptor = extracted_dataset(tmp.path());
        let ds = ClassificationDataset::builder(tmp.path(), descriptor)
            .build()
            .unwrap();
        assert_eq!(ds.get(0).unwrap().image.get_pixel(0, 0), &Rgb([255, 0, 0]));

        RgbImage::from_pixel(2, 2, Rgb([0, 0, 255]))
            .save(ds.image_path(0).unwrap())
            .unwrap();
        assert_eq!(ds.get(0).unwrap().image.get_pixel(0, 0), &Rgb([0, 0, 255]));
    }
}
