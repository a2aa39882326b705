use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::header::Instrument;

/// TAI-UTC in seconds, as used by the observatory SJD convention.
const TAI_UTC: f64 = 34.0;

/// SDSS-modified Julian date for a unix timestamp: MJD + 0.3, so the number
/// changes at 16:48 UTC and one observing night keeps one number.
pub fn sjd_at(unix_seconds: f64) -> u32 {
    ((unix_seconds + TAI_UTC) / 86400.0 + 40587.3) as u32
}

/// SJD of tonight's data.
pub fn sjd_now() -> u32 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    sjd_at(now)
}

/// Directory holding one night's raw exposures.
pub fn night_dir(root: &Path, instrument: Instrument, mjd: u32) -> PathBuf {
    match instrument {
        Instrument::Apogee => root.join("archive").join(mjd.to_string()),
        Instrument::Boss => root.join(mjd.to_string()),
    }
}

/// `(prefix, suffix)` of raw exposure file names.
fn raw_pattern(instrument: Instrument) -> (&'static str, &'static str) {
    match instrument {
        Instrument::Apogee => ("apR", ".apz"),
        Instrument::Boss => ("sdR", ".fit.gz"),
    }
}

/// Recursively collect raw exposures under `dir`, sorted by path.
pub fn collect_exposures(dir: &Path, instrument: Instrument) -> Vec<PathBuf> {
    let (prefix, suffix) = raw_pattern(instrument);
    let mut files = Vec::new();
    walk(dir, &mut |p: &Path| {
        let matches = p
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(prefix) && n.ends_with(suffix));
        if matches {
            files.push(p.to_path_buf());
        }
    });
    files.sort();
    files
}

fn walk(dir: &Path, visit: &mut dyn FnMut(&Path)) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        log::debug!("cannot read {}", dir.display());
        return;
    };
    for path in entries.flatten().map(|e| e.path()) {
        if path.is_dir() {
            walk(&path, visit);
        } else if path.is_file() {
            visit(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sjd_rolls_over_during_the_day() {
        // 2020-03-01T00:00:00Z is MJD 58909
        let midnight = 1_583_020_800.0;
        assert_eq!(sjd_at(midnight), 58909);
        // 17:00 UTC is past the rollover
        assert_eq!(sjd_at(midnight + 17.0 * 3600.0), 58910);
        // but 16:30 UTC is not
        assert_eq!(sjd_at(midnight + 16.5 * 3600.0), 58909);
    }

    #[test]
    fn night_directories() {
        let root = Path::new("/data/apogee");
        assert_eq!(
            night_dir(root, Instrument::Apogee, 59000),
            PathBuf::from("/data/apogee/archive/59000")
        );
        assert_eq!(
            night_dir(Path::new("/data/spectro"), Instrument::Boss, 59000),
            PathBuf::from("/data/spectro/59000")
        );
    }

    #[test]
    fn finds_raw_exposures_recursively() {
        let dir = std::env::temp_dir().join(format!("fibercheck-discover-{}", std::process::id()));
        let nested = dir.join("sub");
        std::fs::create_dir_all(&nested).unwrap();
        for name in ["apR-a-00000002.apz", "apR-b-00000002.apz", "notes.txt"] {
            std::fs::write(dir.join(name), b"").unwrap();
        }
        std::fs::write(nested.join("apR-a-00000001.apz"), b"").unwrap();
        std::fs::write(nested.join("sdR-b1-00000001.fit.gz"), b"").unwrap();

        let found = collect_exposures(&dir, Instrument::Apogee);
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["apR-a-00000002.apz", "apR-b-00000002.apz", "apR-a-00000001.apz"]);

        assert_eq!(collect_exposures(&dir, Instrument::Boss).len(), 1);
        assert!(collect_exposures(&dir.join("absent"), Instrument::Boss).is_empty());
    }
}
