use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Dither calibration positions
// ---------------------------------------------------------------------------

/// DITHPIX values of the named APOGEE dither positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DitherPositions {
    pub a: f64,
    pub b: f64,
}

impl Default for DitherPositions {
    fn default() -> Self {
        Self { a: 12.994, b: 13.499 }
    }
}

/// Dither calibration positions in force at a given DATE-OBS.
///
/// `None` means the lookup failed; dithers are then reported numerically.
pub trait DitherTelemetry {
    fn named_positions(&self, isot: &str) -> Option<DitherPositions>;
}

/// Serves the same calibration positions for every timestamp.
#[derive(Debug, Clone, Default)]
pub struct FixedDithers {
    pub positions: DitherPositions,
}

impl FixedDithers {
    pub fn new(positions: DitherPositions) -> Self {
        Self { positions }
    }
}

impl DitherTelemetry for FixedDithers {
    fn named_positions(&self, _isot: &str) -> Option<DitherPositions> {
        Some(self.positions)
    }
}

/// Name a dither: `A` or `B` when `dithpix` is within `tolerance` of a
/// calibration position, otherwise the value with one decimal.
pub fn name_dither(dithpix: f64, positions: Option<DitherPositions>, tolerance: f64) -> String {
    match positions {
        Some(p) if (dithpix - p.a).abs() < tolerance => "A".to_string(),
        Some(p) if (dithpix - p.b).abs() < tolerance => "B".to_string(),
        _ => format!("{dithpix:.1}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_dithers() {
        let p = Some(DitherPositions::default());
        assert_eq!(name_dither(12.99, p, 0.05), "A");
        assert_eq!(name_dither(13.52, p, 0.05), "B");
        assert_eq!(name_dither(14.23, p, 0.05), "14.2");
        assert_eq!(name_dither(12.5, p, 0.05), "12.5");
    }

    #[test]
    fn no_telemetry_falls_back_to_value() {
        assert_eq!(name_dither(12.994, None, 0.05), "13.0");
    }

    #[test]
    fn fixed_dithers_ignore_time() {
        let t = FixedDithers::new(DitherPositions { a: 1.0, b: 2.0 });
        assert_eq!(t.named_positions("2020-01-01T00:00:00").map(|p| p.b), Some(2.0));
    }
}
