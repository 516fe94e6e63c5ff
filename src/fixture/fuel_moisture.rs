//! Fixture for the Western USA live fuel moisture dataset.
//!
//! Produces `NUM_SAMPLES` sample directories, each holding the same GeoJSON
//! label feature and STAC item, and packs them into `<DATA_DIR>.tar.gz`.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{json, Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::archive::{create_tar, TarCodec};
use crate::checksum::md5_file;

use super::FixtureReport;

pub const DATA_DIR: &str = "su_sar_moisture_content";
pub const NUM_SAMPLES: usize = 3;
pub const LABELS_FILENAME: &str = "labels.geojson";
pub const STAC_FILENAME: &str = "stac.json";

const TARGET_PROPERTY: &str = "percent(t)";
const TARGET_VALUE: f64 = 132.6666667;
const SITE: &str = "Blackstone";
const DATE: &str = "6/30/15";
const LONGITUDE: f64 = -115.8855556;
const LATITUDE: f64 = 42.44111111;

/// Per-timestep input features, in document order.
const FEATURES: &[(&str, f64)] = &[
    ("slope(t)", 0.599961042),
    ("elevation(t)", 1522.0),
    ("canopy_height(t)", 0.0),
    ("forest_cover(t)", 130.0),
    ("silt(t)", 36.0),
    ("sand(t)", 38.0),
    ("clay(t)", 26.0),
    ("vv(t)", -12.80108143),
    ("vh(t)", -20.86413967),
    ("red(t)", 2007.5),
    ("green(t)", 1669.5),
    ("blue(t)", 1234.5),
    ("swir(t)", 3226.5),
    ("nir(t)", 2764.5),
    ("ndvi(t)", 0.158611467),
    ("ndwi(t)", -0.07713057),
    ("nirv(t)", 438.5596345),
    ("vv_red(t)", -0.006376628),
    ("vv_green(t)", -0.007667614),
    ("vv_blue(t)", -0.010369446),
    ("vv_swir(t)", -0.003967482),
    ("vv_nir(t)", -0.004630523),
    ("vv_ndvi(t)", -80.70716267),
    ("vv_ndwi(t)", 165.9663796),
    ("vv_nirv(t)", -0.029188919),
    ("vh_red(t)", -0.010393096),
    ("vh_green(t)", -0.012497238),
    ("vh_blue(t)", -0.016900883),
    ("vh_swir(t)", -0.006466493),
    ("vh_nir(t)", -0.007547166),
    ("vh_ndvi(t)", -131.5424422),
    ("vh_ndwi(t)", 270.5041557),
    ("vh_nirv(t)", -0.047574236),
    ("vh_vv(t)", -8.063058239),
    ("slope(t-1)", 0.599961042),
    ("elevation(t-1)", 1522.0),
    ("canopy_height(t-1)", 0.0),
    ("forest_cover(t-1)", 130.0),
    ("silt(t-1)", 36.0),
    ("sand(t-1)", 38.0),
    ("clay(t-1)", 26.0),
    ("vv(t-1)", -12.93716855),
    ("vh(t-1)", -20.92368901),
    ("red(t-1)", 1792.0),
    ("green(t-1)", 1490.0),
    ("blue(t-1)", 1102.5),
    ("swir(t-1)", 3047.0),
    ("nir(t-1)", 2574.0),
    ("ndvi(t-1)", 0.179116009),
    ("ndwi(t-1)", -0.084146807),
    ("nirv(t-1)", 461.0691997),
    ("vv_red(t-1)", -0.007219402),
    ("vv_green(t-1)", -0.008682663),
    ("vv_blue(t-1)", -0.011734393),
    ("vv_swir(t-1)", -0.004245871),
    ("vv_nir(t-1)", -0.005026095),
    ("vv_ndvi(t-1)", -72.22787422),
    ("vv_ndwi(t-1)", 153.7452097),
    ("vv_nirv(t-1)", -0.02805906),
    ("vh_red(t-1)", -0.011676166),
    ("vh_green(t-1)", -0.014042744),
    ("vh_blue(t-1)", -0.018978403),
    ("vh_swir(t-1)", -0.00686698),
    ("vh_nir(t-1)", -0.008128861),
    ("vh_ndvi(t-1)", -116.8164094),
    ("vh_ndwi(t-1)", 248.6569562),
    ("vh_nirv(t-1)", -0.0453808),
    ("vh_vv(t-1)", -7.986520458),
    ("slope(t-2)", 0.599961042),
    ("elevation(t-2)", 1522.0),
    ("canopy_height(t-2)", 0.0),
    ("forest_cover(t-2)", 130.0),
    ("silt(t-2)", 36.0),
    ("sand(t-2)", 38.0),
    ("clay(t-2)", 26.0),
    ("vv(t-2)", -13.07325567),
    ("vh(t-2)", -20.98323835),
    ("red(t-2)", 1721.5),
    ("green(t-2)", 1432.0),
    ("blue(t-2)", 1056.5),
    ("swir(t-2)", 2950.0),
    ("nir(t-2)", 2476.0),
    ("ndvi(t-2)", 0.179768568),
    ("ndwi(t-2)", -0.087357002),
    ("nirv(t-2)", 445.0984812),
    ("vv_red(t-2)", -0.007594107),
    ("vv_green(t-2)", -0.009129368),
    ("vv_blue(t-2)", -0.012374118),
    ("vv_swir(t-2)", -0.004431612),
    ("vv_nir(t-2)", -0.00527999),
    ("vv_ndvi(t-2)", -72.72270011),
    ("vv_ndwi(t-2)", 149.6532084),
    ("vv_nirv(t-2)", -0.029371603),
    ("vh_red(t-2)", -0.012188927),
    ("vh_green(t-2)", -0.014653099),
    ("vh_blue(t-2)", -0.019861087),
    ("vh_swir(t-2)", -0.007112962),
    ("vh_nir(t-2)", -0.008474652),
    ("vh_ndvi(t-2)", -116.7236217),
    ("vh_ndwi(t-2)", 240.2009889),
    ("vh_nirv(t-2)", -0.047142912),
    ("vh_vv(t-2)", -7.909982677),
    ("slope(t-3)", 0.599961042),
    ("elevation(t-3)", 1522.0),
    ("canopy_height(t-3)", 0.0),
    ("forest_cover(t-3)", 130.0),
    ("silt(t-3)", 36.0),
    ("sand(t-3)", 38.0),
    ("clay(t-3)", 26.0),
    ("vv(t-3)", -12.35794964),
    ("vh(t-3)", -20.25746909),
    ("red(t-3)", 1367.333333),
    ("green(t-3)", 1151.0),
    ("blue(t-3)", 827.3333333),
    ("swir(t-3)", 2349.333333),
    ("nir(t-3)", 2051.0),
    ("ndvi(t-3)", 0.216978329),
    ("ndwi(t-3)", -0.050717071),
    ("nirv(t-3)", 413.3885932),
    ("vv_red(t-3)", -0.009037993),
    ("vv_green(t-3)", -0.010736707),
    ("vv_blue(t-3)", -0.014937087),
    ("vv_swir(t-3)", -0.005260194),
    ("vv_nir(t-3)", -0.006025329),
    ("vv_ndvi(t-3)", -56.95476465),
    ("vv_ndwi(t-3)", 243.6644995),
    ("vv_nirv(t-3)", -0.029894269),
    ("vh_red(t-3)", -0.014815311),
    ("vh_green(t-3)", -0.017599886),
    ("vh_blue(t-3)", -0.024485257),
    ("vh_swir(t-3)", -0.008622646),
    ("vh_nir(t-3)", -0.009876874),
    ("vh_ndvi(t-3)", -93.36171601),
    ("vh_ndwi(t-3)", 399.4211186),
    ("vh_nirv(t-3)", -0.049003454),
    ("vh_vv(t-3)", -7.899519455),
];

/// The GeoJSON `Feature` written to every sample's `labels.geojson`.
pub fn labels_document() -> Value {
    let mut properties = Map::new();
    properties.insert(TARGET_PROPERTY.to_string(), json!(TARGET_VALUE));
    properties.insert("site".to_string(), json!(SITE));
    properties.insert("date".to_string(), json!(DATE));
    for (name, value) in FEATURES {
        properties.insert(name.to_string(), json!(value));
    }

    json!({
        "type": "Feature",
        "properties": properties,
        "geometry": {"type": "Point", "coordinates": [LONGITUDE, LATITUDE]},
    })
}

/// The STAC item written to every sample's `stac.json`.
pub fn stac_document() -> Value {
    json!({
        "assets": {
            "documentation": {
                "href": "../_common/documentation.pdf",
                "type": "application/pdf",
            },
            "labels": {"href": LABELS_FILENAME, "type": "application/geo+json"},
            "training_features_descriptions": {
                "href": "../_common/training_features_descriptions.csv",
                "title": "Training Features Descriptions",
                "type": "text/csv",
            },
        },
        "bbox": [LONGITUDE, LATITUDE, LONGITUDE, LATITUDE],
        "collection": DATA_DIR,
        "geometry": {"coordinates": [LONGITUDE, LATITUDE], "type": "Point"},
        "id": format!("{DATA_DIR}_0001"),
        "links": [
            {"href": "../collection.json", "rel": "collection"},
            {"href": "../collection.json", "rel": "parent"},
        ],
        "properties": {
            "datetime": "2015-06-30T00:00:00Z",
            "label:description": "",
            "label:properties": [TARGET_PROPERTY],
            "label:type": "vector",
        },
        "stac_extensions": ["label"],
        "stac_version": "1.0.0-beta.2",
        "type": "Feature",
    })
}

/// Single-line JSON with `", "` and `": "` separators and non-ASCII text
/// escaped as `\uXXXX`, the layout the published fixture files use.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

/// Serialise `value` in the fixture's on-disk JSON layout.
pub fn to_fixture_json(value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
    value.serialize(&mut ser)?;
    Ok(out)
}

/// Write both documents into `sample_dir`.
pub fn write_sample(sample_dir: &Path) -> Result<()> {
    let labels_path = sample_dir.join(LABELS_FILENAME);
    fs::write(&labels_path, to_fixture_json(&labels_document())?)
        .with_context(|| format!("writing '{}'", labels_path.display()))?;

    let stac_path = sample_dir.join(STAC_FILENAME);
    fs::write(&stac_path, to_fixture_json(&stac_document())?)
        .with_context(|| format!("writing '{}'", stac_path.display()))?;
    Ok(())
}

/// Directory of sample `index` relative to the fixture root.
pub fn sample_dir_name(index: usize) -> String {
    format!("{DATA_DIR}_{index}")
}

/// Regenerate `<out_dir>/su_sar_moisture_content/` and its `.tar.gz`.
///
/// Any previous fixture directory is removed first.
pub fn generate(out_dir: &Path) -> Result<FixtureReport> {
    let data_dir = out_dir.join(DATA_DIR);
    if data_dir.is_dir() {
        fs::remove_dir_all(&data_dir)
            .with_context(|| format!("removing old fixture '{}'", data_dir.display()))?;
    }
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating fixture directory '{}'", data_dir.display()))?;

    for i in 0..NUM_SAMPLES {
        let sample_dir = data_dir.join(sample_dir_name(i));
        fs::create_dir_all(&sample_dir)
            .with_context(|| format!("creating '{}'", sample_dir.display()))?;
        write_sample(&sample_dir)?;
    }

    let archive: PathBuf = out_dir.join(format!("{DATA_DIR}{}", TarCodec::Gzip.extension()));
    create_tar(&data_dir, Some(DATA_DIR), &archive, TarCodec::Gzip)
        .with_context(|| format!("archiving fixture into '{}'", archive.display()))?;
    let md5 = md5_file(&archive)?;
    tracing::info!(archive = %archive.display(), md5 = %md5, "fixture written");

    Ok(FixtureReport {
        data_dir,
        archives: vec![(archive, md5)],
    })
}
