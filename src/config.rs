use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::bundles::CollapseRule;
use crate::data::offset::LineFit;
use crate::data::telemetry::DitherPositions;

// ---------------------------------------------------------------------------
// Run configuration
// ---------------------------------------------------------------------------

/// Tunables of a diagnostic run. Every field has a default, so a JSON file
/// only needs the keys it changes:
///
/// ```json
/// { "window": [900, 910], "collapse": "within_bundle" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Pixel window `[lo, hi)` averaged into each fiber's flux.
    pub window: (usize, usize),
    /// How runs of fibers are reported as whole bundles.
    pub collapse: CollapseRule,
    /// Fallback dither calibration positions.
    pub dithers: DitherPositions,
    pub dither_tolerance: f64,
    pub thar: LineFit,
    pub une: LineFit,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            window: (900, 910),
            collapse: CollapseRule::default(),
            dithers: DitherPositions::default(),
            dither_tolerance: 0.05,
            thar: LineFit::thar(),
            une: LineFit::une(),
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}
