use serde::{Deserialize, Serialize};

use super::model::QuickredFrame;

// ---------------------------------------------------------------------------
// Arc line offset
// ---------------------------------------------------------------------------

/// Where to look for a bright arc line and how wide it is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineFit {
    /// Fiber rows averaged together, `[start, end)`.
    pub fibers: (usize, usize),
    /// Expected line centre in pixels.
    pub w0: usize,
    /// Width of the fitted window in pixels.
    pub dw: usize,
    pub sigma: f64,
}

impl LineFit {
    /// Defaults for ThAr lamp exposures.
    pub fn thar() -> Self {
        Self {
            fibers: (30, 35),
            w0: 939,
            dw: 40,
            sigma: 1.2745,
        }
    }

    /// Defaults for UNe lamp exposures.
    pub fn une() -> Self {
        Self {
            fibers: (30, 35),
            w0: 1761,
            dw: 20,
            sigma: 3.0,
        }
    }
}

const MAX_ITER: usize = 100;
const STEP_TOL: f64 = 1e-9;

/// Pixel offset of an arc line from its expected position.
///
/// The selected fibers are averaged over `[w0 - dw/2, w0 + dw/2)`, the line
/// is scaled to a unit peak, and the centre of a unit Gaussian of width
/// `sigma` is fitted by damped Gauss-Newton least squares. Returns
/// `centre - w0`, or `None` when the window falls outside the frame or holds
/// no usable signal.
pub fn compute_offset(frame: &QuickredFrame, fit: &LineFit) -> Option<f64> {
    let lower = fit.w0.saturating_sub(fit.dw / 2);
    let upper = fit.w0 + fit.dw / 2;
    let line = frame.average_fibers(fit.fibers.0..fit.fibers.1, lower..upper);

    let peak = line.iter().copied().filter(|v| v.is_finite()).fold(f64::NAN, f64::max);
    if line.is_empty() || !(peak > 0.0) {
        return None;
    }
    let samples: Vec<(f64, f64)> = line
        .iter()
        .enumerate()
        .filter(|(_, y)| y.is_finite())
        .map(|(i, y)| ((lower + i) as f64, y / peak))
        .collect();

    let centre = fit_centre(&samples, fit.w0 as f64, fit.sigma);
    Some(centre - fit.w0 as f64)
}

fn gaussian(x: f64, centre: f64, sigma: f64) -> f64 {
    (-0.5 * ((x - centre) / sigma).powi(2)).exp()
}

fn cost(samples: &[(f64, f64)], centre: f64, sigma: f64) -> f64 {
    samples
        .iter()
        .map(|&(x, y)| (gaussian(x, centre, sigma) - y).powi(2))
        .sum()
}

fn fit_centre(samples: &[(f64, f64)], start: f64, sigma: f64) -> f64 {
    let mut centre = start;
    let mut current = cost(samples, centre, sigma);

    for _ in 0..MAX_ITER {
        // d/dc of the model is g * (x - c) / sigma^2
        let (num, den) = samples.iter().fold((0.0, 0.0), |(num, den), &(x, y)| {
            let g = gaussian(x, centre, sigma);
            let j = g * (x - centre) / (sigma * sigma);
            (num + j * (g - y), den + j * j)
        });
        if den <= f64::EPSILON {
            break;
        }

        let mut step = -num / den;
        // Halve the step until the residual drops.
        while step.abs() > STEP_TOL {
            let trial = cost(samples, centre + step, sigma);
            if trial < current {
                centre += step;
                current = trial;
                break;
            }
            step /= 2.0;
        }
        if step.abs() <= STEP_TOL {
            break;
        }
    }
    centre
}
