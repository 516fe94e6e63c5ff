//! File digests used to verify downloads.
//!
//! Published dataset tables carry MD5 sums; SHA-256 is accepted for
//! descriptors loaded from configuration.

use anyhow::{bail, Context, Result};
use md5::Md5;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Hash function a [`Checksum`] was computed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Md5,
    Sha256,
}

impl Algorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Md5 => "md5",
            Algorithm::Sha256 => "sha256",
        }
    }

    fn hex_len(self) -> usize {
        match self {
            Algorithm::Md5 => 32,
            Algorithm::Sha256 => 64,
        }
    }
}

/// An expected digest, stored as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum {
    algorithm: Algorithm,
    hex: String,
}

impl Checksum {
    pub fn new(algorithm: Algorithm, hex: &str) -> Result<Self> {
        let hex = hex.trim().to_ascii_lowercase();
        if hex.len() != algorithm.hex_len() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("invalid {} digest: '{}'", algorithm.as_str(), hex);
        }
        Ok(Self { algorithm, hex })
    }

    /// Digest from a compiled-in table; the tables are checked by unit tests.
    pub(crate) fn from_table(algorithm: Algorithm, hex: &str) -> Self {
        Self {
            algorithm,
            hex: hex.to_ascii_lowercase(),
        }
    }

    pub fn md5(hex: &str) -> Result<Self> {
        Self::new(Algorithm::Md5, hex)
    }

    pub fn sha256(hex: &str) -> Result<Self> {
        Self::new(Algorithm::Sha256, hex)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    pub fn matches(&self, actual_hex: &str) -> bool {
        self.hex.eq_ignore_ascii_case(actual_hex.trim())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.hex)
    }
}

/// Hex digest of a file.
pub fn digest_file(path: &Path, algorithm: Algorithm) -> Result<String> {
    let (hex, _size) = match algorithm {
        Algorithm::Md5 => hash_file::<Md5>(path)?,
        Algorithm::Sha256 => hash_file::<Sha256>(path)?,
    };
    Ok(hex)
}

pub fn md5_file(path: &Path) -> Result<String> {
    digest_file(path, Algorithm::Md5)
}

/// SHA-256 of a file together with its size in bytes.
pub fn sha256_file(path: &Path) -> Result<(String, u64)> {
    hash_file::<Sha256>(path)
}

/// `Ok(false)` when the file is missing or its digest differs.
pub fn check_integrity(path: &Path, expected: &Checksum) -> Result<bool> {
    if !path.is_file() {
        return Ok(false);
    }
    let actual = digest_file(path, expected.algorithm())?;
    let ok = expected.matches(&actual);
    tracing::debug!(
        path = %path.display(),
        expected = %expected,
        actual = %actual,
        ok,
        "checked integrity"
    );
    Ok(ok)
}

fn hash_file<D: Digest>(path: &Path) -> Result<(String, u64)> {
    let f = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut r = BufReader::new(f);
    let mut hasher = D::new();
    let mut buf = vec![0u8; 1024 * 1024];
    let mut size = 0u64;
    loop {
        let n = r
            .read(&mut buf)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    let hex = hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>();
    Ok((hex, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn md5_of_known_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("hello.txt");
        fs::write(&path, b"hello").unwrap();

        assert_eq!(md5_file(&path).unwrap(), "5d41402abc4b2a76b9719d911017c592");
        let (sha, size) = sha256_file(&path).unwrap();
        assert_eq!(
            sha,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(size, 5);
    }

    #[test]
    fn integrity_is_false_for_missing_file() {
        let tmp = TempDir::new().unwrap();
        let expected = Checksum::md5("5d41402abc4b2a76b9719d911017c592").unwrap();
        assert!(!check_integrity(&tmp.path().join("absent"), &expected).unwrap());
    }

    #[test]
    fn integrity_compares_case_insensitively() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("hello.txt");
        fs::write(&path, b"hello").unwrap();

        let upper = Checksum::md5("5D41402ABC4B2A76B9719D911017C592").unwrap();
        assert!(check_integrity(&path, &upper).unwrap());

        let other = Checksum::md5("c954a5a3dac08c220b10cfbeec83893c").unwrap();
        assert!(!check_integrity(&path, &other).unwrap());
    }

    #[test]
    fn checksum_rejects_wrong_length() {
        assert!(Checksum::md5("abc").is_err());
        assert!(Checksum::sha256("5d41402abc4b2a76b9719d911017c592").is_err());
        assert!(Checksum::md5("zz41402abc4b2a76b9719d911017c592").is_err());
    }
}
