//! Split files: one `relative/image/path label` record per line.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::DatasetError;
use crate::fsutil::is_contained_relative;

/// One row of a split file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitEntry {
    /// Image path relative to the dataset directory.
    pub image: PathBuf,
    pub label: i64,
}

/// Parse split records from `reader`. `origin` is only used in errors.
///
/// Fields are separated by whitespace; blank lines are skipped and anything
/// after the second field is ignored.
pub fn parse_split<R: BufRead>(reader: R, origin: &Path) -> Result<Vec<SplitEntry>> {
    let malformed = |line: usize, reason: String| DatasetError::MalformedRow {
        path: origin.to_path_buf(),
        line,
        reason,
    };

    let mut entries = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("reading '{}'", origin.display()))?;
        let mut fields = line.split_whitespace();
        let Some(image) = fields.next() else {
            continue;
        };
        let label = fields
            .next()
            .ok_or_else(|| malformed(line_no, format!("missing label after '{image}'")))?;
        let label = label
            .parse::<i64>()
            .map_err(|e| malformed(line_no, format!("label '{label}' is not an integer: {e}")))?;

        let image = PathBuf::from(image);
        if !is_contained_relative(&image) {
            return Err(malformed(
                line_no,
                format!(
                    "image path '{}' must be relative to the dataset directory",
                    image.display()
                ),
            )
            .into());
        }
        entries.push(SplitEntry { image, label });
    }
    Ok(entries)
}

pub fn load_split(path: &Path) -> Result<Vec<SplitEntry>> {
    let f = File::open(path)
        .with_context(|| format!("opening split file '{}'", path.display()))?;
    parse_split(BufReader::new(f), path)
}
