//! Deterministic tar archives.
//!
//! Entries are sorted by relative path and every header carries mtime 0,
//! uid/gid 0 and a fixed mode, so the same tree always produces the same
//! bytes (and therefore the same checksum). Gzip output also carries a zero
//! header timestamp.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tar::Builder as TarBuilder;
use walkdir::WalkDir;

/// Compression applied around the tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarCodec {
    None,
    Gzip,
    Bzip2,
    Zstd,
}

impl TarCodec {
    /// Conventional file extension including the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            TarCodec::None => ".tar",
            TarCodec::Gzip => ".tar.gz",
            TarCodec::Bzip2 => ".tbz",
            TarCodec::Zstd => ".tar.zst",
        }
    }
}

const DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;
const LINK_MODE: u32 = 0o777;

/// Archive the tree under `src_dir` into `out_path`.
///
/// With `prefix = Some("name")` every entry is stored under `name/` and a
/// directory entry for `name` itself comes first, which is the layout
/// `tar -C parent -czf out.tar.gz name` produces.
pub fn create_tar(
    src_dir: &Path,
    prefix: Option<&str>,
    out_path: &Path,
    codec: TarCodec,
) -> Result<()> {
    let out = File::create(out_path)
        .with_context(|| format!("Failed to create {}", out_path.display()))?;
    let out = BufWriter::new(out);

    match codec {
        TarCodec::None => {
            let mut out = append_tree(out, src_dir, prefix)?;
            out.flush()?;
        }
        TarCodec::Gzip => {
            let encoder = flate2::GzBuilder::new()
                .mtime(0)
                .write(out, flate2::Compression::default());
            append_tree(encoder, src_dir, prefix)?.finish()?.flush()?;
        }
        TarCodec::Bzip2 => {
            let encoder = bzip2::write::BzEncoder::new(out, bzip2::Compression::best());
            append_tree(encoder, src_dir, prefix)?.finish()?.flush()?;
        }
        TarCodec::Zstd => {
            let encoder = zstd::stream::Encoder::new(out, 3)?;
            append_tree(encoder, src_dir, prefix)?.finish()?.flush()?;
        }
    }
    Ok(())
}

fn append_tree<W: Write>(writer: W, src_dir: &Path, prefix: Option<&str>) -> Result<W> {
    let mut builder = TarBuilder::new(writer);

    // Collect paths deterministically.
    let mut entries: Vec<PathBuf> = vec![];
    for ent in WalkDir::new(src_dir).follow_links(false) {
        let ent = ent.with_context(|| format!("walking {}", src_dir.display()))?;
        let p = ent.path();
        if p == src_dir {
            continue;
        }
        entries.push(p.to_path_buf());
    }
    entries.sort_by(|a, b| {
        let ra = a.strip_prefix(src_dir).unwrap_or(a).to_string_lossy();
        let rb = b.strip_prefix(src_dir).unwrap_or(b).to_string_lossy();
        ra.cmp(&rb)
    });

    if let Some(prefix) = prefix {
        let mut header = base_header(tar::EntryType::Directory, DIR_MODE, 0);
        builder.append_data(&mut header, format!("{prefix}/"), std::io::empty())?;
    }

    for p in entries {
        let rel = p
            .strip_prefix(src_dir)
            .unwrap_or(&p)
            .to_string_lossy()
            .replace('\\', "/");
        let name = match prefix {
            Some(prefix) => format!("{prefix}/{rel}"),
            None => rel,
        };

        let md = fs::symlink_metadata(&p)?;
        if md.is_dir() {
            let mut header = base_header(tar::EntryType::Directory, DIR_MODE, 0);
            builder.append_data(&mut header, format!("{name}/"), std::io::empty())?;
            continue;
        }

        if md.file_type().is_symlink() {
            let target = fs::read_link(&p)?;
            let mut header = base_header(tar::EntryType::Symlink, LINK_MODE, 0);
            header.set_link_name(&target)?;
            builder.append_data(&mut header, name, std::io::empty())?;
            continue;
        }

        if md.is_file() {
            let f = File::open(&p).with_context(|| format!("opening {}", p.display()))?;
            let mut header = base_header(tar::EntryType::Regular, FILE_MODE, md.len());
            builder.append_data(&mut header, name, f)?;
        }
    }

    builder
        .into_inner()
        .with_context(|| "Failed to finalize tar builder")
}

fn base_header(kind: tar::EntryType, mode: u32, size: u64) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(kind);
    header.set_size(size);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(mode);
    header
}
