use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use geo_datasets::acquire::acquire;
use geo_datasets::checksum::check_integrity;
use geo_datasets::dataset::ClassificationDataset;
use geo_datasets::descriptor::Split;
use geo_datasets::fetch::HttpFetcher;
use geo_datasets::fixture::{cowc, fuel_moisture};
use geo_datasets::{logging, Settings};

const INSPECT_ROWS: usize = 5;

fn usage() -> &'static str {
    "Usage:\n  geo-datasets download <cowc_detection|cowc_counting|NAME> [--root DIR] [--config FILE]\n  geo-datasets verify <NAME> [--root DIR] [--config FILE]\n  geo-datasets inspect <NAME> <train|test> [--root DIR] [--config FILE]\n  geo-datasets fixture fuel-moisture <out_dir>\n  geo-datasets fixture cowc <NAME> <out_dir> [--config FILE]\n\nThe data root defaults to $GEO_DATASETS_ROOT, then ./data."
}

fn main() -> Result<()> {
    logging::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (args, settings) = parse_options(&args)?;

    match args.as_slice() {
        [cmd, name] if cmd == "download" => download(&settings, name),
        [cmd, name] if cmd == "verify" => verify(&settings, name),
        [cmd, name, split] if cmd == "inspect" => inspect(&settings, name, split.parse()?),
        [cmd, kind, out_dir] if cmd == "fixture" && kind == "fuel-moisture" => {
            fixture_fuel_moisture(Path::new(out_dir))
        }
        [cmd, kind, name, out_dir] if cmd == "fixture" && kind == "cowc" => {
            fixture_cowc(&settings, name, Path::new(out_dir))
        }
        _ => bail!(usage()),
    }
}

/// Strip `--root DIR` / `--config FILE` from `args`, returning the remaining
/// positional arguments and the effective settings.
fn parse_options(args: &[String]) -> Result<(Vec<String>, Settings)> {
    let mut positional = Vec::new();
    let mut root: Option<PathBuf> = None;
    let mut config: Option<PathBuf> = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--root" => {
                let value = iter.next().context("--root needs a directory")?;
                root = Some(PathBuf::from(value));
            }
            "--config" => {
                let value = iter.next().context("--config needs a file")?;
                config = Some(PathBuf::from(value));
            }
            "-h" | "--help" => {
                println!("{}", usage());
                std::process::exit(0);
            }
            other if other.starts_with("--") => bail!("unknown option '{}'\n\n{}", other, usage()),
            _ => positional.push(arg.clone()),
        }
    }

    let mut settings = match config {
        Some(path) => Settings::load(&path)?,
        None => Settings::from_env(),
    };
    if let Some(root) = root {
        settings.root = root;
    }
    Ok((positional, settings))
}

fn download(settings: &Settings, name: &str) -> Result<()> {
    let descriptor = settings.resolve_descriptor(name)?;
    let fetcher = HttpFetcher::new()?;
    let report = acquire(&settings.root, &descriptor, &fetcher)
        .with_context(|| format!("downloading dataset '{}'", descriptor.name))?;

    let dir = descriptor.dataset_dir(&settings.root);
    if report.was_complete() {
        println!(
            "[download:{}] already complete in '{}'",
            descriptor.name,
            dir.display()
        );
        return Ok(());
    }
    for file in &report.fetched {
        println!("[download:{}] fetched {}", descriptor.name, file);
    }
    for file in &report.already_valid {
        println!("[download:{}] reused {}", descriptor.name, file);
    }
    for file in report.unrecognized() {
        println!("[download:{}] left as-is (unknown format): {}", descriptor.name, file);
    }
    println!("[download:{}] ready in '{}'", descriptor.name, dir.display());
    Ok(())
}

fn verify(settings: &Settings, name: &str) -> Result<()> {
    let descriptor = settings.resolve_descriptor(name)?;
    let dir = descriptor.dataset_dir(&settings.root);

    let mut bad = 0usize;
    for file in &descriptor.files {
        let ok = check_integrity(&dir.join(&file.filename), &file.checksum)?;
        if !ok {
            bad += 1;
        }
        println!(
            "[verify:{}] {} {}",
            descriptor.name,
            if ok { "ok     " } else { "MISSING/BAD" },
            file.filename
        );
    }

    if bad > 0 {
        bail!(
            "dataset '{}' in '{}' has {} missing or corrupted file(s)",
            descriptor.name,
            dir.display(),
            bad
        );
    }
    println!("[verify:{}] all {} files verified", descriptor.name, descriptor.files.len());
    Ok(())
}

fn inspect(settings: &Settings, name: &str, split: Split) -> Result<()> {
    let descriptor = settings.resolve_descriptor(name)?;
    let dataset = ClassificationDataset::builder(&settings.root, descriptor)
        .split(split)
        .download(settings.download)
        .build()?;

    println!(
        "[inspect:{}] {} split: {} samples in '{}'",
        dataset.descriptor().name,
        split,
        dataset.len(),
        dataset.dir().display()
    );
    for entry in dataset.entries().iter().take(INSPECT_ROWS) {
        println!("  {} {}", entry.image.display(), entry.label);
    }
    if !dataset.is_empty() {
        let first = dataset.get(0)?;
        println!(
            "[inspect:{}] sample 0: {}x{} label={}",
            dataset.descriptor().name,
            first.image.width(),
            first.image.height(),
            first.label
        );
    }
    Ok(())
}

fn fixture_fuel_moisture(out_dir: &Path) -> Result<()> {
    let report = fuel_moisture::generate(out_dir)?;
    for (archive, md5) in &report.archives {
        println!("[fixture:fuel-moisture] {}: {}", archive.display(), md5);
    }
    Ok(())
}

fn fixture_cowc(settings: &Settings, name: &str, out_dir: &Path) -> Result<()> {
    let descriptor = settings.resolve_descriptor(name)?;
    let fixture = cowc::generate(&descriptor, out_dir, 4)?;
    for (path, md5) in &fixture.report.archives {
        println!("[fixture:{}] {}: {}", descriptor.name, path.display(), md5);
    }
    println!(
        "[fixture:{}] {} train / {} test rows in '{}'",
        descriptor.name,
        fixture.train.len(),
        fixture.test.len(),
        fixture.mirror.display()
    );
    Ok(())
}
