use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

use super::error::{DiagnosticError, DiagnosticResult};

// ---------------------------------------------------------------------------
// HeaderValue – a single FITS header card value
// ---------------------------------------------------------------------------

/// A dynamically-typed FITS keyword value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::String(s) => write!(f, "{s}"),
            HeaderValue::Integer(i) => write!(f, "{i}"),
            HeaderValue::Float(v) => write!(f, "{v}"),
            HeaderValue::Bool(b) => write!(f, "{}", if *b { "T" } else { "F" }),
            HeaderValue::Null => write!(f, "<null>"),
        }
    }
}

impl HeaderValue {
    /// Guess the type of a raw keyword value as cfitsio hands it back.
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim();
        if s.is_empty() {
            return HeaderValue::Null;
        }
        if let Ok(i) = s.parse::<i64>() {
            return HeaderValue::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return HeaderValue::Float(f);
        }
        match s {
            "T" => HeaderValue::Bool(true),
            "F" => HeaderValue::Bool(false),
            _ => HeaderValue::String(s.to_string()),
        }
    }

    /// Try to interpret the value as an `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Float(v) => Some(*v),
            HeaderValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HeaderValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// FITS logicals, plus the integer 0/1 some writers use instead.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HeaderValue::Bool(b) => Some(*b),
            HeaderValue::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }
}

/// Keyword → value map for one HDU.
pub type Header = BTreeMap<String, HeaderValue>;

// ---------------------------------------------------------------------------
// QuickredFrame – the extracted 2-D spectra of one exposure
// ---------------------------------------------------------------------------

/// Quick-reduction output: one extracted spectrum per fiber.
///
/// Data layout: row-major, `n_fibers` rows of `n_pixels` values.
/// Index: `data[fiber * n_pixels + pixel]`
#[derive(Debug, Clone)]
pub struct QuickredFrame {
    pub n_fibers: usize,
    pub n_pixels: usize,
    pub data: Vec<f64>,
}

impl QuickredFrame {
    pub fn new(n_fibers: usize, n_pixels: usize, data: Vec<f64>) -> DiagnosticResult<Self> {
        if n_fibers == 0 || n_pixels == 0 {
            return Err(DiagnosticError::InvalidInput(format!(
                "quickred frame has shape {n_fibers}x{n_pixels}"
            )));
        }
        if data.len() != n_fibers * n_pixels {
            return Err(DiagnosticError::InvalidInput(format!(
                "quickred frame expects {} values, got {}",
                n_fibers * n_pixels,
                data.len()
            )));
        }
        Ok(Self {
            n_fibers,
            n_pixels,
            data,
        })
    }

    /// Build a frame from per-fiber rows, which must all have the same length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> DiagnosticResult<Self> {
        let n_fibers = rows.len();
        let n_pixels = rows.first().map(Vec::len).unwrap_or(0);
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_pixels) {
            return Err(DiagnosticError::InvalidInput(format!(
                "fiber row {i} has {} pixels, expected {n_pixels}",
                row.len()
            )));
        }
        Self::new(n_fibers, n_pixels, rows.into_iter().flatten().collect())
    }

    pub fn row(&self, fiber: usize) -> &[f64] {
        &self.data[fiber * self.n_pixels..(fiber + 1) * self.n_pixels]
    }

    /// Mean over `fibers` (rows) for each pixel in `pixels`.
    ///
    /// Both ranges are clipped to the frame, the way array slicing clips.
    pub fn average_fibers(&self, fibers: Range<usize>, pixels: Range<usize>) -> Vec<f64> {
        let fibers = clip(fibers, self.n_fibers);
        let pixels = clip(pixels, self.n_pixels);
        let n = fibers.len() as f64;
        pixels
            .map(|p| {
                let sum: f64 = fibers.clone().map(|f| self.row(f)[p]).sum();
                if n > 0.0 { sum / n } else { f64::NAN }
            })
            .collect()
    }

    /// Per-fiber mean over the pixel window `[lo, hi)`.
    pub fn window_profile(&self, window: (usize, usize)) -> DiagnosticResult<FluxProfile> {
        let pixels = clip(window.0..window.1, self.n_pixels);
        if pixels.is_empty() {
            return Err(DiagnosticError::InvalidInput(format!(
                "pixel window {}..{} is empty for a frame {} pixels wide",
                window.0, window.1, self.n_pixels
            )));
        }
        let width = pixels.len() as f64;
        let values = (0..self.n_fibers)
            .map(|f| self.row(f)[pixels.clone()].iter().sum::<f64>() / width)
            .collect();
        FluxProfile::new(values)
    }
}

fn clip(range: Range<usize>, len: usize) -> Range<usize> {
    let end = range.end.min(len);
    range.start.min(end)..end
}

// ---------------------------------------------------------------------------
// FluxProfile / MasterColumn – classifier inputs
// ---------------------------------------------------------------------------

/// One flux value per fiber; index `i` is fiber ID `i + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxProfile {
    values: Vec<f64>,
}

impl FluxProfile {
    pub fn new(values: Vec<f64>) -> DiagnosticResult<Self> {
        if values.is_empty() {
            return Err(DiagnosticError::InvalidInput(
                "flux profile has no fibers".to_string(),
            ));
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of fibers.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Reference throughput used as the ratio denominator.
#[derive(Debug, Clone, PartialEq)]
pub enum MasterColumn {
    Scalar(f64),
    PerFiber(Vec<f64>),
}

impl MasterColumn {
    /// Reference value for fiber index `i`.
    pub fn at(&self, i: usize) -> f64 {
        match self {
            MasterColumn::Scalar(v) => *v,
            MasterColumn::PerFiber(vs) => vs[i],
        }
    }
}
