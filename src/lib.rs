//! Download, verify and load geospatial machine-learning datasets.
//!
//! A dataset is described by a [`DatasetDescriptor`]: where its files live
//! remotely, their published digests, and which split file indexes the
//! images. Built-in descriptors cover the COWC car patch sets; more can be
//! loaded from TOML.
//!
//! # Architecture
//!
//! ```text
//! descriptor ──► acquire ──────────────────────► dataset
//!                  │                               │
//!                  ├── fetch    (HTTP / mirror)    ├── split   (row index)
//!                  ├── checksum (MD5 / SHA-256)    └── image decode + transforms
//!                  └── extract  (tar.*, .bz2, .gz)
//!
//! fixture ──► archive (deterministic tar) ──► offline mirrors for tests
//! ```
//!
//! Setup failures (missing files, digest mismatch) surface while a dataset is
//! built; access failures (bad index, malformed row) surface where they are
//! used. See [`error::DatasetError`].

pub mod acquire;
pub mod archive;
pub mod checksum;
pub mod config;
pub mod dataset;
pub mod descriptor;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod fixture;
pub mod fuel_moisture;
pub mod logging;
pub mod split;

mod fsutil;

pub use acquire::{acquire, dataset_is_intact, AcquireReport};
pub use checksum::{check_integrity, Algorithm, Checksum};
pub use config::Settings;
pub use dataset::{ClassificationDataset, ClassificationDatasetBuilder, Sample};
pub use descriptor::{DatasetDescriptor, RemoteFile, Split};
pub use error::DatasetError;
pub use extract::{extract, ArchiveKind, ExtractOutcome};
pub use fetch::{DirectoryFetcher, Fetcher, HttpFetcher};
pub use fuel_moisture::{FuelMoistureDataset, FuelMoistureSample};
pub use split::SplitEntry;
