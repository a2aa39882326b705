use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use fitsio::FitsFile;
use serde::{Deserialize, Serialize};

use super::model::{Header, HeaderValue};
use super::telemetry::{DitherTelemetry, name_dither};

// ---------------------------------------------------------------------------
// Instrument
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    Apogee,
    Boss,
}

impl Instrument {
    /// HDU holding the exposure header.
    pub fn header_hdu(self) -> usize {
        match self {
            Instrument::Apogee => 1,
            Instrument::Boss => 0,
        }
    }

    /// Keywords the normalizer looks at.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Instrument::Apogee => &[
                "DITHPIX", "EXPTIME", "DATE-OBS", "PLATEID", "CARTID", "EXPTYPE", "LAMPUNE",
                "LAMPTHAR", "NREAD", "PLATETYP", "IMAGETYP", "SEEING",
            ],
            Instrument::Boss => &[
                "MGDPOS", "POINTING", "EXPTIME", "DATE-OBS", "PLATEID", "CARTID", "PLATETYP",
                "HARTMANN", "FLAVOR",
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// ExposureRecord – normalized header of one raw exposure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ExposureRecord {
    pub path: PathBuf,
    pub instrument: Instrument,
    pub exp_id: u64,
    pub exp_time: f64,
    /// DATE-OBS as written (UTC ISO-8601).
    pub isot: String,
    pub dither: String,
    pub plate_id: Option<i64>,
    pub cart_id: Option<i64>,
    /// APOGEE exposure type, e.g. `Object`, `Domeflat`, `ThAr Arc`.
    pub exp_type: Option<String>,
    /// BOSS flavor, e.g. `Science`, `Arc`, or `Hart` during Hartmann tests.
    pub flavor: Option<String>,
    /// BOSS Hartmann door state.
    pub hartmann: Option<String>,
    pub lead: String,
    pub n_read: Option<i64>,
    pub img_type: Option<String>,
    pub seeing: Option<f64>,
}

impl ExposureRecord {
    /// Type shown in reports: APOGEE exposure type or BOSS flavor.
    pub fn kind(&self) -> &str {
        self.exp_type
            .as_deref()
            .or(self.flavor.as_deref())
            .unwrap_or("Unknown")
    }

    /// Night directory name (the MJD) the raw file lives in.
    pub fn date_dir(&self) -> Option<&str> {
        self.path.parent()?.file_name()?.to_str()
    }
}

/// Read and normalize the header of a raw exposure.
pub fn read_exposure(
    path: &Path,
    instrument: Instrument,
    telemetry: &dyn DitherTelemetry,
    dither_tolerance: f64,
) -> Result<ExposureRecord> {
    let header = read_header(path, instrument.header_hdu(), instrument.keywords())?;
    match instrument {
        Instrument::Apogee => apogee_record(path, &header, telemetry, dither_tolerance),
        Instrument::Boss => boss_record(path, &header),
    }
}

/// Read `keys` from HDU `hdu`; absent keywords are left out of the map.
pub fn read_header(path: &Path, hdu: usize, keys: &[&str]) -> Result<Header> {
    let mut fits =
        FitsFile::open(path).with_context(|| format!("opening {}", path.display()))?;
    let hdu_handle = fits
        .hdu(hdu)
        .with_context(|| format!("moving to HDU {hdu} of {}", path.display()))?;

    let mut header = Header::new();
    for &key in keys {
        if let Ok(raw) = hdu_handle.read_key::<String>(&mut fits, key) {
            header.insert(key.to_string(), HeaderValue::parse(&raw));
        }
    }
    Ok(header)
}

/// Exposure number from a raw file name such as `apR-a-12345678.apz`.
pub fn exposure_id(path: &Path) -> Result<u64> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("no file name in {}", path.display()))?;
    let tail = name.rsplit('-').next().unwrap_or(name);
    let digits = tail.split('.').next().unwrap_or(tail);
    digits
        .parse::<u64>()
        .with_context(|| format!("no exposure number in {name}"))
}

pub fn apogee_record(
    path: &Path,
    header: &Header,
    telemetry: &dyn DitherTelemetry,
    dither_tolerance: f64,
) -> Result<ExposureRecord> {
    let isot = require_str(header, "DATE-OBS")?;
    let dithpix = require_f64(header, "DITHPIX")?;
    let dither = name_dither(dithpix, telemetry.named_positions(&isot), dither_tolerance);

    let raw_type = require_str(header, "EXPTYPE")?;
    let exp_type = if capitalize(&raw_type) == "Arclamp" {
        if flag(header, "LAMPUNE") {
            Some("UNe Arc".to_string())
        } else if flag(header, "LAMPTHAR") {
            Some("ThAr Arc".to_string())
        } else {
            log::warn!("Could not process exposure type of {}", path.display());
            None
        }
    } else {
        Some(capitalize(&raw_type))
    };

    let seeing = if raw_type == "OBJECT" {
        header.get("SEEING").and_then(HeaderValue::as_f64)
    } else {
        Some(0.0)
    };

    Ok(ExposureRecord {
        path: path.to_path_buf(),
        instrument: Instrument::Apogee,
        exp_id: exposure_id(path)?,
        exp_time: require_f64(header, "EXPTIME")?,
        isot,
        dither,
        plate_id: header.get("PLATEID").and_then(HeaderValue::as_i64),
        cart_id: header.get("CARTID").and_then(HeaderValue::as_i64),
        exp_type,
        flavor: None,
        hartmann: None,
        lead: optional_str(header, "PLATETYP"),
        n_read: header.get("NREAD").and_then(HeaderValue::as_i64),
        img_type: header.get("IMAGETYP").map(|v| capitalize(&v.to_string())),
        seeing,
    })
}

pub fn boss_record(path: &Path, header: &Header) -> Result<ExposureRecord> {
    // SDSS-IV wrote MGDPOS; SDSS-V only has POINTING.
    let dither = match header.get("MGDPOS") {
        Some(v) => v.to_string(),
        None => require_str(header, "POINTING")?
            .chars()
            .next()
            .map(String::from)
            .unwrap_or_default(),
    };

    // FPS-era headers carry a non-integer CARTID.
    let cart_id = header
        .get("CARTID")
        .map(|v| v.as_i64().unwrap_or(0));

    let raw_hartmann = require_str(header, "HARTMANN")?;
    let (hartmann, flavor) = if raw_hartmann.contains("Closed") {
        ("Closed".to_string(), capitalize(&require_str(header, "FLAVOR")?))
    } else if raw_hartmann.contains("Out") {
        ("Open".to_string(), capitalize(&require_str(header, "FLAVOR")?))
    } else {
        (raw_hartmann, "Hart".to_string())
    };

    Ok(ExposureRecord {
        path: path.to_path_buf(),
        instrument: Instrument::Boss,
        exp_id: exposure_id(path)?,
        exp_time: require_f64(header, "EXPTIME")?.trunc(),
        isot: require_str(header, "DATE-OBS")?,
        dither,
        plate_id: header.get("PLATEID").and_then(HeaderValue::as_i64),
        cart_id,
        exp_type: None,
        flavor: Some(flavor),
        hartmann: Some(hartmann),
        lead: optional_str(header, "PLATETYP"),
        n_read: None,
        img_type: None,
        seeing: None,
    })
}

// -- Header helpers --

fn require<'a>(header: &'a Header, key: &str) -> Result<&'a HeaderValue> {
    match header.get(key) {
        Some(HeaderValue::Null) | None => bail!("header has no {key}"),
        Some(v) => Ok(v),
    }
}

fn require_str(header: &Header, key: &str) -> Result<String> {
    Ok(require(header, key)?.to_string())
}

fn require_f64(header: &Header, key: &str) -> Result<f64> {
    require(header, key)?
        .as_f64()
        .with_context(|| format!("{key} is not numeric"))
}

fn optional_str(header: &Header, key: &str) -> String {
    header.get(key).map(|v| v.to_string()).unwrap_or_default()
}

fn flag(header: &Header, key: &str) -> bool {
    header
        .get(key)
        .and_then(HeaderValue::as_bool)
        .unwrap_or(false)
}

/// First character upper case, the rest lower case.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
