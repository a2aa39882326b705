use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use super::error::{DiagnosticError, DiagnosticResult};

/// Fibers per physical bundle (one cable / slit block).
pub const BUNDLE_SIZE: u32 = 30;

/// Physical bundle number of a 1-based fiber ID.
fn bundle_of(fiber: u32) -> u32 {
    fiber.saturating_sub(1) / BUNDLE_SIZE
}

/// True when `fiber` is the first fiber of its bundle.
fn starts_bundle(fiber: u32) -> bool {
    fiber % BUNDLE_SIZE == 1
}

// ---------------------------------------------------------------------------
// CollapseRule – when a run is reported as a whole bundle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollapseRule {
    /// Only a run covering all 30 fibers of one bundle.
    #[default]
    FullBundle,
    /// Any multi-fiber run inside one bundle. This is what the legacy
    /// observer tools printed.
    WithinBundle,
}

impl CollapseRule {
    fn collapses(self, low: u32, high: u32) -> bool {
        match self {
            CollapseRule::FullBundle => starts_bundle(low) && high == low + BUNDLE_SIZE - 1,
            CollapseRule::WithinBundle => bundle_of(low) == bundle_of(high),
        }
    }
}

// ---------------------------------------------------------------------------
// BundleLabel – one entry of a compressed fiber list
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleLabel {
    Single(u32),
    Range(u32, u32),
    /// A run reported by its bundle; `high` is kept so no fiber is lost.
    BundleSpan { low: u32, high: u32 },
}

impl BundleLabel {
    /// Fiber IDs this label stands for.
    pub fn fibers(&self) -> RangeInclusive<u32> {
        match *self {
            BundleLabel::Single(id) => id..=id,
            BundleLabel::Range(low, high) | BundleLabel::BundleSpan { low, high } => low..=high,
        }
    }
}

impl fmt::Display for BundleLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleLabel::Single(id) => write!(f, "{id}"),
            BundleLabel::Range(low, high) => write!(f, "{low}-{high}"),
            BundleLabel::BundleSpan { low, .. } => write!(f, "{low} bundle"),
        }
    }
}

/// A closed run of contiguous fibers within one bundle.
#[derive(Debug, Clone, Copy)]
struct Run {
    low: u32,
    high: u32,
}

impl Run {
    fn label(self, rule: CollapseRule) -> BundleLabel {
        if self.low == self.high {
            BundleLabel::Single(self.low)
        } else if rule.collapses(self.low, self.high) {
            BundleLabel::BundleSpan {
                low: self.low,
                high: self.high,
            }
        } else {
            BundleLabel::Range(self.low, self.high)
        }
    }
}

/// Compress fiber IDs with the default [`CollapseRule::FullBundle`].
pub fn compress(fiber_ids: &[u32]) -> DiagnosticResult<Vec<BundleLabel>> {
    compress_with(fiber_ids, CollapseRule::default())
}

/// Compress strictly increasing 1-based fiber IDs into labels.
///
/// Contiguous IDs form runs, but a run never crosses a bundle boundary: a
/// fiber with `id % 30 == 1` always opens a new run. Runs are then rendered
/// as singles, ranges, or bundle spans according to `rule`.
pub fn compress_with(fiber_ids: &[u32], rule: CollapseRule) -> DiagnosticResult<Vec<BundleLabel>> {
    validate(fiber_ids)?;

    let runs = fiber_ids.iter().fold(Vec::<Run>::new(), |mut runs, &fib| {
        match runs.last_mut() {
            Some(run) if fib == run.high + 1 && !starts_bundle(fib) => run.high = fib,
            _ => runs.push(Run { low: fib, high: fib }),
        }
        runs
    });

    Ok(runs.into_iter().map(|run| run.label(rule)).collect())
}

fn validate(fiber_ids: &[u32]) -> DiagnosticResult<()> {
    if let Some(pos) = fiber_ids.iter().position(|&id| id == 0) {
        return Err(DiagnosticError::MalformedSequence(format!(
            "fiber ID 0 at position {pos}; IDs are 1-based"
        )));
    }
    if let Some(pos) = fiber_ids.windows(2).position(|w| w[1] <= w[0]) {
        return Err(DiagnosticError::MalformedSequence(format!(
            "{} follows {} at position {}; IDs must be strictly increasing",
            fiber_ids[pos + 1],
            fiber_ids[pos],
            pos + 1
        )));
    }
    Ok(())
}

/// Render labels the way the report prints them: `[50-52, 61 bundle, 80]`.
pub fn format_labels(labels: &[BundleLabel]) -> String {
    let parts: Vec<String> = labels.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}
