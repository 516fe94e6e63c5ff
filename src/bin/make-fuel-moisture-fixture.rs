use anyhow::{bail, Context, Result};
use geo_datasets::fixture::fuel_moisture::generate;
use geo_datasets::logging;

fn main() -> Result<()> {
    logging::init();
    if std::env::args().len() > 1 {
        bail!("Usage:\n  make-fuel-moisture-fixture\n\nWrites su_sar_moisture_content/ and its .tar.gz into the current directory.");
    }

    let cwd = std::env::current_dir().context("resolving current directory")?;
    let report = generate(&cwd)?;
    for (archive, md5) in &report.archives {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| archive.display().to_string());
        println!("{name}: {md5}");
    }
    Ok(())
}
