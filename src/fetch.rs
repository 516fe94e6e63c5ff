//! Where downloaded bytes come from.
//!
//! Acquisition only needs "put the bytes behind this URL at this path".
//! [`HttpFetcher`] does a plain blocking GET; [`DirectoryFetcher`] serves the
//! same filenames from a local mirror, which is how offline machines and the
//! test suite feed the pipeline.

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::DatasetError;

/// Anything that can materialise a URL's contents at `dest`.
pub trait Fetcher {
    /// Write the resource behind `url` to `dest`, replacing any existing file.
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Blocking HTTP(S) GET via `reqwest`.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .context("building HTTP client")?;
        Ok(Self { client })
    }

    /// Use a preconfigured client (proxies, timeouts, TLS roots).
    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        tracing::info!(url, dest = %dest.display(), "downloading");
        let mut response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("GET {url}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DatasetError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let file =
            File::create(dest).with_context(|| format!("creating '{}'", dest.display()))?;
        let mut writer = BufWriter::new(file);
        let bytes = response
            .copy_to(&mut writer)
            .with_context(|| format!("streaming {url} to '{}'", dest.display()))?;
        writer
            .flush()
            .with_context(|| format!("flushing '{}'", dest.display()))?;
        tracing::debug!(url, bytes, "download finished");
        Ok(())
    }
}

/// Serves files from a local directory by the last path segment of the URL.
#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
    mirror: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(mirror: impl Into<PathBuf>) -> Self {
        Self {
            mirror: mirror.into(),
        }
    }

    pub fn mirror(&self) -> &Path {
        &self.mirror
    }
}

impl Fetcher for DirectoryFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let name = url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .with_context(|| format!("URL '{url}' has no filename"))?;
        let src = self.mirror.join(name);
        if !src.is_file() {
            bail!(
                "'{}' is not present in mirror '{}'",
                name,
                self.mirror.display()
            );
        }
        tracing::info!(src = %src.display(), dest = %dest.display(), "copying from mirror");
        fs::copy(&src, dest).with_context(|| {
            format!("copying '{}' to '{}'", src.display(), dest.display())
        })?;
        Ok(())
    }
}
