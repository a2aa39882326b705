use super::error::{DiagnosticError, DiagnosticResult};
use super::model::{FluxProfile, MasterColumn};

/// Ratios below this are missing fibers.
pub const MISSING_BELOW: f64 = 0.2;
/// Ratios below this (and at or above [`MISSING_BELOW`]) are faint fibers.
pub const FAINT_BELOW: f64 = 0.7;

// ---------------------------------------------------------------------------
// Band – throughput class of one fiber
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    Missing,
    Faint,
    Bright,
}

impl Band {
    /// NaN ratios fail both comparisons and land in `Bright`.
    pub fn of_ratio(ratio: f64) -> Self {
        if ratio < MISSING_BELOW {
            Band::Missing
        } else if ratio < FAINT_BELOW {
            Band::Faint
        } else {
            Band::Bright
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Band::Missing => "Missing",
            Band::Faint => "Faint",
            Band::Bright => "Bright",
        }
    }
}

// ---------------------------------------------------------------------------
// BandPartition – classifier output
// ---------------------------------------------------------------------------

/// Per-fiber ratios plus the three disjoint 0-based index sets.
#[derive(Debug, Clone, PartialEq)]
pub struct BandPartition {
    pub ratios: Vec<f64>,
    pub missing: Vec<usize>,
    pub faint: Vec<usize>,
    pub bright: Vec<usize>,
}

impl BandPartition {
    pub fn indices(&self, band: Band) -> &[usize] {
        match band {
            Band::Missing => &self.missing,
            Band::Faint => &self.faint,
            Band::Bright => &self.bright,
        }
    }

    /// 1-based fiber IDs of `band`, ready for the bundle compressor.
    pub fn fiber_ids(&self, band: Band) -> Vec<u32> {
        self.indices(band).iter().map(|&i| i as u32 + 1).collect()
    }
}

/// Split fibers into missing / faint / bright by their throughput ratio.
///
/// The master column is required: `None` is an [`DiagnosticError::InvalidInput`].
/// Master values must be finite and positive, and a per-fiber master must
/// match the profile length. Flux values are not checked; a NaN flux gives a
/// NaN ratio and classifies as bright.
pub fn classify(
    profile: &FluxProfile,
    master: Option<&MasterColumn>,
) -> DiagnosticResult<BandPartition> {
    let master = master.ok_or_else(|| {
        DiagnosticError::InvalidInput("no master column supplied".to_string())
    })?;
    validate_master(master, profile.len())?;

    let ratios: Vec<f64> = profile
        .values()
        .iter()
        .enumerate()
        .map(|(i, &flux)| flux / master.at(i))
        .collect();

    let mut partition = BandPartition {
        missing: Vec::new(),
        faint: Vec::new(),
        bright: Vec::new(),
        ratios: Vec::new(),
    };
    for (i, &ratio) in ratios.iter().enumerate() {
        match Band::of_ratio(ratio) {
            Band::Missing => partition.missing.push(i),
            Band::Faint => partition.faint.push(i),
            Band::Bright => partition.bright.push(i),
        }
    }
    partition.ratios = ratios;
    Ok(partition)
}

fn validate_master(master: &MasterColumn, n_fibers: usize) -> DiagnosticResult<()> {
    let bad = |i: Option<usize>, v: f64| {
        let at = i.map(|i| format!(" at fiber {}", i + 1)).unwrap_or_default();
        DiagnosticError::InvalidInput(format!(
            "master column value {v}{at} is not a positive number"
        ))
    };
    match master {
        MasterColumn::Scalar(v) => {
            if !(v.is_finite() && *v > 0.0) {
                return Err(bad(None, *v));
            }
        }
        MasterColumn::PerFiber(vs) => {
            if vs.len() != n_fibers {
                return Err(DiagnosticError::InvalidInput(format!(
                    "master column has {} values for {n_fibers} fibers",
                    vs.len()
                )));
            }
            if let Some((i, v)) = vs
                .iter()
                .enumerate()
                .find(|(_, v)| !(v.is_finite() && **v > 0.0))
            {
                return Err(bad(Some(i), *v));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(values: &[f64]) -> FluxProfile {
        FluxProfile::new(values.to_vec()).unwrap()
    }

    #[test]
    fn thresholds_belong_to_the_upper_band() {
        let p = profile(&[0.1999, 0.2, 0.6999, 0.7, 1.3]);
        let part = classify(&p, Some(&MasterColumn::Scalar(1.0))).unwrap();
        assert_eq!(part.missing, vec![0]);
        assert_eq!(part.faint, vec![1, 2]);
        assert_eq!(part.bright, vec![3, 4]);
    }

    #[test]
    fn partition_is_disjoint_and_complete() {
        let values: Vec<f64> = (0..300).map(|i| (i % 17) as f64 * 0.09 - 0.1).collect();
        let master: Vec<f64> = (0..300).map(|i| 0.5 + (i % 5) as f64 * 0.25).collect();
        let part = classify(&profile(&values), Some(&MasterColumn::PerFiber(master))).unwrap();

        let mut all: Vec<usize> = part
            .missing
            .iter()
            .chain(&part.faint)
            .chain(&part.bright)
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..300).collect::<Vec<_>>());
        assert_eq!(part.ratios.len(), 300);
    }

    #[test]
    fn per_fiber_master_divides_element_wise() {
        let part = classify(
            &profile(&[1.0, 1.0, 1.0]),
            Some(&MasterColumn::PerFiber(vec![10.0, 2.0, 1.0])),
        )
        .unwrap();
        assert_eq!(part.ratios, vec![0.1, 0.5, 1.0]);
        assert_eq!(part.fiber_ids(Band::Missing), vec![1]);
        assert_eq!(part.fiber_ids(Band::Faint), vec![2]);
        assert_eq!(part.fiber_ids(Band::Bright), vec![3]);
    }

    #[test]
    fn missing_master_is_invalid_input() {
        let err = classify(&profile(&[1.0]), None).unwrap_err();
        assert!(matches!(err, DiagnosticError::InvalidInput(_)));
    }

    #[test]
    fn zero_negative_and_nan_master_are_rejected() {
        for m in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = classify(&profile(&[1.0]), Some(&MasterColumn::Scalar(m))).unwrap_err();
            assert!(matches!(err, DiagnosticError::InvalidInput(_)), "master {m}");
        }
        let err = classify(
            &profile(&[1.0, 1.0]),
            Some(&MasterColumn::PerFiber(vec![1.0, 0.0])),
        )
        .unwrap_err();
        assert!(matches!(err, DiagnosticError::InvalidInput(_)));
    }

    #[test]
    fn master_length_must_match() {
        let err = classify(
            &profile(&[1.0, 1.0]),
            Some(&MasterColumn::PerFiber(vec![1.0])),
        )
        .unwrap_err();
        assert!(matches!(err, DiagnosticError::InvalidInput(_)));
    }

    #[test]
    fn nan_flux_classifies_bright() {
        let part = classify(&profile(&[f64::NAN, 0.0]), Some(&MasterColumn::Scalar(1.0))).unwrap();
        assert_eq!(part.bright, vec![0]);
        assert_eq!(part.missing, vec![1]);
    }
}
