//! Loader settings: where datasets live, whether to download, and an
//! optional file of extra `[[dataset]]` descriptors.
//!
//! ```toml
//! root = "data"
//! download = true
//! descriptors = "datasets.toml"
//! ```
//!
//! Relative paths in a settings file resolve against the file's directory.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::descriptor::{load_descriptors, resolve, DatasetDescriptor};

pub const ROOT_ENV: &str = "GEO_DATASETS_ROOT";
pub const DEFAULT_ROOT: &str = "data";
const CACHE_SUBDIR: &str = "geo-datasets";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub root: PathBuf,
    pub download: bool,
    pub descriptors: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsToml {
    root: Option<String>,
    #[serde(default)]
    download: bool,
    descriptors: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            download: false,
            descriptors: None,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading settings '{}'", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&text, base)
            .with_context(|| format!("parsing settings '{}'", path.display()))
    }

    fn parse(text: &str, base: &Path) -> Result<Self> {
        let raw: SettingsToml = toml::from_str(text)?;
        let defaults = Self::default();
        Ok(Self {
            root: raw
                .root
                .map(|root| resolve_path(base, &root))
                .unwrap_or(defaults.root),
            download: raw.download,
            descriptors: raw.descriptors.map(|p| resolve_path(base, &p)),
        })
    }

    /// Defaults, with the root taken from `GEO_DATASETS_ROOT` when set.
    pub fn from_env() -> Self {
        Self::with_root_override(std::env::var_os(ROOT_ENV).map(PathBuf::from))
    }

    fn with_root_override(root: Option<PathBuf>) -> Self {
        let mut settings = Self::default();
        if let Some(root) = root.filter(|r| !r.as_os_str().is_empty()) {
            settings.root = root;
        }
        settings
    }

    /// Defaults rooted in the per-user cache directory, falling back to
    /// `./data` when the platform has none.
    pub fn cache_default() -> Self {
        let mut settings = Self::default();
        if let Some(cache) = dirs::cache_dir() {
            settings.root = cache.join(CACHE_SUBDIR);
        }
        settings
    }

    pub fn extra_descriptors(&self) -> Result<Vec<DatasetDescriptor>> {
        match &self.descriptors {
            Some(path) => load_descriptors(path),
            None => Ok(Vec::new()),
        }
    }

    /// Look up `name` among the built-in datasets and the extra descriptor file.
    pub fn resolve_descriptor(&self, name: &str) -> Result<DatasetDescriptor> {
        resolve(name, &self.extra_descriptors()?)
    }
}

fn resolve_path(base: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::COWC_COUNTING;
    use tempfile::TempDir;

    #[test]
    fn empty_file_gives_defaults() {
        let settings = Settings::parse("", Path::new("/etc")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.root, PathBuf::from("data"));
    }

    #[test]
    fn relative_paths_resolve_against_the_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("geo.toml");
        fs::write(
            &path,
            "root = \"cache\"\ndownload = true\ndescriptors = \"/opt/extra.toml\"\n",
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.root, tmp.path().join("cache"));
        assert!(settings.download);
        assert_eq!(settings.descriptors, Some(PathBuf::from("/opt/extra.toml")));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Settings::parse("rooot = \"x\"\n", Path::new(".")).unwrap_err();
        assert!(format!("{err:#}").contains("rooot"));
    }

    #[test]
    fn env_root_overrides_default() {
        let settings = Settings::with_root_override(Some(PathBuf::from("/srv/geo")));
        assert_eq!(settings.root, PathBuf::from("/srv/geo"));
        assert_eq!(
            Settings::with_root_override(Some(PathBuf::new())).root,
            PathBuf::from(DEFAULT_ROOT)
        );
    }

    #[test]
    fn resolves_builtin_and_extra_descriptors() {
        let tmp = TempDir::new().unwrap();
        let extra = tmp.path().join("datasets.toml");
        fs::write(
            &extra,
            r#"
[[dataset]]
name = "tiny"
base_url = "https://example.org/tiny"
split_template = "{split}.txt"

[[dataset.files]]
filename = "train.txt"
md5 = "5d41402abc4b2a76b9719d911017c592"
"#,
        )
        .unwrap();
        let settings = Settings {
            descriptors: Some(extra),
            ..Settings::default()
        };

        assert_eq!(settings.resolve_descriptor("tiny").unwrap().name, "tiny");
        assert_eq!(
            settings.resolve_descriptor(COWC_COUNTING).unwrap().name,
            COWC_COUNTING
        );
        assert!(settings.resolve_descriptor("missing").is_err());
    }
}
