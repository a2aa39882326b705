use std::fmt;
use std::path::Path;

use anyhow::Result;

use crate::config::RunConfig;
use crate::data::bundles::{BundleLabel, CollapseRule, compress_with, format_labels};
use crate::data::classify::{Band, BandPartition, classify};
use crate::data::error::{DiagnosticError, DiagnosticResult};
use crate::data::header::{ExposureRecord, Instrument, read_exposure};
use crate::data::loader::{load_frame, quickred_path};
use crate::data::model::{FluxProfile, MasterColumn, QuickredFrame};
use crate::data::offset::{LineFit, compute_offset};
use crate::data::telemetry::DitherTelemetry;

// ---------------------------------------------------------------------------
// FiberReport – compressed bands of one exposure
// ---------------------------------------------------------------------------

/// Classified fibers of one exposure, each band compressed into labels.
///
/// The default value is the "no data" sentinel: no partition, no labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FiberReport {
    pub partition: Option<BandPartition>,
    pub missing: Vec<BundleLabel>,
    pub faint: Vec<BundleLabel>,
    pub bright: Vec<BundleLabel>,
}

impl FiberReport {
    pub fn is_available(&self) -> bool {
        self.partition.is_some()
    }

    /// Re-render the labels from the stored partition under another rule.
    pub fn recompress(&mut self, rule: CollapseRule) -> DiagnosticResult<()> {
        let Some(partition) = &self.partition else {
            return Ok(());
        };
        self.missing = compress_with(&partition.fiber_ids(Band::Missing), rule)?;
        self.faint = compress_with(&partition.fiber_ids(Band::Faint), rule)?;
        self.bright = compress_with(&partition.fiber_ids(Band::Bright), rule)?;
        Ok(())
    }

    pub fn labels(&self, band: Band) -> &[BundleLabel] {
        match band {
            Band::Missing => &self.missing,
            Band::Faint => &self.faint,
            Band::Bright => &self.bright,
        }
    }
}

impl fmt::Display for FiberReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Missing Fibers: {}", format_labels(&self.missing))?;
        write!(f, "Faint Fibers: {}", format_labels(&self.faint))
    }
}

/// Classify a flux profile and compress every band.
pub fn fiber_report(
    profile: &FluxProfile,
    master: Option<&MasterColumn>,
    rule: CollapseRule,
) -> DiagnosticResult<FiberReport> {
    let partition = classify(profile, master)?;
    let missing = compress_with(&partition.fiber_ids(Band::Missing), rule)?;
    let faint = compress_with(&partition.fiber_ids(Band::Faint), rule)?;
    let bright = compress_with(&partition.fiber_ids(Band::Bright), rule)?;
    Ok(FiberReport {
        partition: Some(partition),
        missing,
        faint,
        bright,
    })
}

// ---------------------------------------------------------------------------
// FrameSource – where quickred frames come from
// ---------------------------------------------------------------------------

pub trait FrameSource {
    /// Quickred frame of `exposure`, or [`DiagnosticError::DataUnavailable`].
    fn frame(&self, exposure: &ExposureRecord) -> DiagnosticResult<QuickredFrame>;
}

/// Reads frames from the quickred tree next to the raw archive.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuickredArchive;

impl FrameSource for QuickredArchive {
    fn frame(&self, exposure: &ExposureRecord) -> DiagnosticResult<QuickredFrame> {
        let path = quickred_path(&exposure.path, exposure.exp_id).ok_or_else(|| {
            DiagnosticError::DataUnavailable {
                path: exposure.path.clone(),
                reason: "raw file is not inside an archive/<date> directory".to_string(),
            }
        })?;
        load_frame(&path).map_err(|e| DiagnosticError::DataUnavailable {
            path,
            reason: format!("{e:#}"),
        })
    }
}

/// Fiber throughput test of one exposure on its quickred frame.
///
/// A missing master column fails immediately. An unavailable frame (`None`)
/// or one whose shape does not fit the pixel window or a per-fiber master is
/// logged and yields the empty [`FiberReport`] so a night's loop can carry on.
pub fn ap_test(
    exposure: &ExposureRecord,
    master: Option<&MasterColumn>,
    frame: Option<&QuickredFrame>,
    config: &RunConfig,
) -> DiagnosticResult<FiberReport> {
    let Some(master) = master else {
        return Err(DiagnosticError::InvalidInput(format!(
            "fiber test of {} did not receive a master column",
            exposure.exp_id
        )));
    };
    let Some(frame) = frame else {
        return Ok(FiberReport::default());
    };
    if let Some(reason) = shape_mismatch(frame, master, config.window) {
        log::warn!("Fiber test for {} skipped: {reason}", exposure.path.display());
        return Ok(FiberReport::default());
    }

    let profile = frame.window_profile(config.window)?;
    let report = fiber_report(&profile, Some(master), config.collapse)?;
    log::debug!(
        "{}: {} missing, {} faint, {} bright",
        exposure.exp_id,
        report.partition.as_ref().map_or(0, |p| p.missing.len()),
        report.partition.as_ref().map_or(0, |p| p.faint.len()),
        report.partition.as_ref().map_or(0, |p| p.bright.len()),
    );
    Ok(report)
}

/// Why `frame` cannot be tested against `master` over `window`, if it can't.
fn shape_mismatch(
    frame: &QuickredFrame,
    master: &MasterColumn,
    window: (usize, usize),
) -> Option<String> {
    if window.0 >= window.1.min(frame.n_pixels) {
        return Some(format!(
            "pixel window {}..{} is empty for a frame {} pixels wide",
            window.0, window.1, frame.n_pixels
        ));
    }
    match master {
        MasterColumn::PerFiber(vs) if vs.len() != frame.n_fibers => Some(format!(
            "frame has {} fibers but the master column has {}",
            frame.n_fibers,
            vs.len()
        )),
        _ => None,
    }
}

/// Line to fit for lamp exposures; `None` for anything else.
pub fn arc_line(exposure: &ExposureRecord, config: &RunConfig) -> Option<LineFit> {
    match exposure.exp_type.as_deref() {
        Some("ThAr Arc") => Some(config.thar),
        Some("UNe Arc") => Some(config.une),
        _ => None,
    }
}

/// Read a quickred frame, turning [`DiagnosticError::DataUnavailable`] into a
/// logged `None`.
pub fn fetch_frame(
    exposure: &ExposureRecord,
    source: &dyn FrameSource,
) -> DiagnosticResult<Option<QuickredFrame>> {
    match source.frame(exposure) {
        Ok(frame) => Ok(Some(frame)),
        Err(e @ DiagnosticError::DataUnavailable { .. }) => {
            log::warn!("Quickred frame for {} produced this error: {e}", exposure.path.display());
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Night loop
// ---------------------------------------------------------------------------

/// Everything learned about one raw exposure.
#[derive(Debug, Clone)]
pub struct ExposureDiagnostic {
    pub record: ExposureRecord,
    /// `None` when no fiber test was run (BOSS, or no master column).
    pub fibers: Option<FiberReport>,
    pub offset: Option<f64>,
}

impl fmt::Display for ExposureDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.record;
        write!(
            f,
            "{:>8}  {:<10} {:>6.0}s  dither {:<4}  {}",
            r.exp_id,
            r.kind(),
            r.exp_time,
            r.dither,
            r.isot
        )?;
        if let Some(plate) = r.plate_id {
            write!(f, "  plate {plate}")?;
        }
        if let Some(offset) = self.offset {
            write!(f, "  offset {offset:+.2} px")?;
        }
        if let Some(fibers) = &self.fibers {
            if fibers.is_available() {
                write!(f, "\n{fibers}")?;
            } else {
                write!(f, "\n(no quickred frame)")?;
            }
        }
        Ok(())
    }
}

/// Collaborators and settings for a night's run.
pub struct NightRun<'a> {
    pub instrument: Instrument,
    pub master: Option<&'a MasterColumn>,
    pub config: &'a RunConfig,
    pub telemetry: &'a dyn DitherTelemetry,
    pub source: &'a dyn FrameSource,
    /// Only fiber-test exposures of this type (APOGEE exposure type).
    pub only_type: Option<&'a str>,
}

impl NightRun<'_> {
    /// Diagnose every exposure in `paths`.
    ///
    /// Unreadable headers skip the exposure. Classifier and compressor
    /// errors abort the run.
    pub fn run(&self, paths: &[impl AsRef<Path>]) -> Result<Vec<ExposureDiagnostic>> {
        if self.instrument == Instrument::Apogee && self.master.is_none() {
            log::info!("No master column given; skipping fiber tests");
        }

        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let record = match read_exposure(
                path,
                self.instrument,
                self.telemetry,
                self.config.dither_tolerance,
            ) {
                Ok(record) => record,
                Err(e) => {
                    log::warn!("Skipping {}: {e:#}", path.display());
                    continue;
                }
            };
            out.push(self.diagnose(record)?);
        }
        log::info!("Diagnosed {} of {} exposures", out.len(), paths.len());
        Ok(out)
    }

    /// Fiber test and arc offset for one already-normalized exposure.
    ///
    /// The quickred frame is read at most once and shared by both steps.
    pub fn diagnose(&self, record: ExposureRecord) -> DiagnosticResult<ExposureDiagnostic> {
        let apogee = self.instrument == Instrument::Apogee;
        let wanted = self
            .only_type
            .map_or(true, |t| record.kind().eq_ignore_ascii_case(t));
        let master = self.master.filter(|_| apogee && wanted);
        let line = arc_line(&record, self.config).filter(|_| apogee);

        let frame = if master.is_some() || line.is_some() {
            fetch_frame(&record, self.source)?
        } else {
            None
        };

        let fibers = match master {
            Some(master) => Some(ap_test(&record, Some(master), frame.as_ref(), self.config)?),
            None => None,
        };
        let offset = line.zip(frame.as_ref()).and_then(|(fit, frame)| compute_offset(frame, &fit));
        Ok(ExposureDiagnostic {
            record,
            fibers,
            offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::path::PathBuf;

    use super::*;
    use crate::data::telemetry::FixedDithers;

    fn record(exp_type: &str) -> ExposureRecord {
        ExposureRecord {
            path: PathBuf::from("/data/apogee/archive/59000/apR-a-35880001.apz"),
            instrument: Instrument::Apogee,
            exp_id: 35880001,
            exp_time: 478.0,
            isot: "2020-05-31T03:00:00".to_string(),
            dither: "A".to_string(),
            plate_id: Some(15000),
            cart_id: Some(7),
            exp_type: Some(exp_type.to_string()),
            flavor: None,
            hartmann: None,
            lead: String::new(),
            n_read: Some(47),
            img_type: None,
            seeing: Some(0.0),
        }
    }

    /// `n_pixels` wide, 300 fibers, flux 1.0 except the listed fibers.
    fn flat(n_pixels: usize, dips: &[(usize, f64)]) -> QuickredFrame {
        let rows = (1..=300)
            .map(|fiber| {
                let flux = dips
                    .iter()
                    .find(|(f, _)| *f == fiber)
                    .map_or(1.0, |(_, v)| *v);
                vec![flux; n_pixels]
            })
            .collect();
        QuickredFrame::from_rows(rows).unwrap()
    }

    /// Serves one fixed frame and counts how often it was asked for it.
    struct Frames {
        frame: QuickredFrame,
        reads: Cell<usize>,
    }

    impl Frames {
        fn new(frame: QuickredFrame) -> Self {
            Self {
                frame,
                reads: Cell::new(0),
            }
        }
    }

    impl FrameSource for Frames {
        fn frame(&self, _exposure: &ExposureRecord) -> DiagnosticResult<QuickredFrame> {
            self.reads.set(self.reads.get() + 1);
            Ok(self.frame.clone())
        }
    }

    struct NoFrames;

    impl FrameSource for NoFrames {
        fn frame(&self, exposure: &ExposureRecord) -> DiagnosticResult<QuickredFrame> {
            Err(DiagnosticError::DataUnavailable {
                path: exposure.path.clone(),
                reason: "No such file".to_string(),
            })
        }
    }

    fn night<'a>(
        master: Option<&'a MasterColumn>,
        config: &'a RunConfig,
        source: &'a dyn FrameSource,
        telemetry: &'a FixedDithers,
    ) -> NightRun<'a> {
        NightRun {
            instrument: Instrument::Apogee,
            master,
            config,
            telemetry,
            source,
            only_type: None,
        }
    }

    fn text(labels: &[BundleLabel]) -> Vec<String> {
        labels.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn end_to_end_three_hundred_fibers() {
        let frame = flat(1000, &[(50, 0.1), (51, 0.1), (52, 0.1), (80, 0.5)]);
        let master = MasterColumn::Scalar(1.0);
        let report = ap_test(
            &record("Domeflat"),
            Some(&master),
            Some(&frame),
            &RunConfig::default(),
        )
        .unwrap();

        assert_eq!(text(&report.missing), vec!["50-52"]);
        assert_eq!(text(&report.faint), vec!["80"]);
        assert_eq!(
            text(&report.bright),
            vec![
                "1 bundle", "31-49", "53-60", "61-79", "81-90", "91 bundle", "121 bundle",
                "151 bundle", "181 bundle", "211 bundle", "241 bundle", "271 bundle",
            ]
        );
        assert_eq!(
            report.to_string(),
            "Missing Fibers: [50-52]\nFaint Fibers: [80]"
        );
    }

    #[test]
    fn bright_labels_cover_the_remainder() {
        let frame = flat(1000, &[(50, 0.1), (51, 0.1), (52, 0.1), (80, 0.5)]);
        let report = ap_test(
            &record("Domeflat"),
            Some(&MasterColumn::Scalar(1.0)),
            Some(&frame),
            &RunConfig::default(),
        )
        .unwrap();
        let covered: Vec<u32> = report.bright.iter().flat_map(BundleLabel::fibers).collect();
        let expected: Vec<u32> = (1..=300).filter(|f| !(50..=52).contains(f) && *f != 80).collect();
        assert_eq!(covered, expected);
    }

    #[test]
    fn recompress_switches_rules_without_rereading() {
        let frame = flat(1000, &[(29, 0.1), (30, 0.1), (31, 0.1), (32, 0.1)]);
        let mut report = ap_test(
            &record("Domeflat"),
            Some(&MasterColumn::Scalar(1.0)),
            Some(&frame),
            &RunConfig::default(),
        )
        .unwrap();
        assert_eq!(text(report.labels(Band::Missing)), vec!["29-30", "31-32"]);

        report.recompress(CollapseRule::WithinBundle).unwrap();
        assert_eq!(text(report.labels(Band::Missing)), vec!["29 bundle", "31 bundle"]);
        assert_eq!(text(&report.bright)[0], "1 bundle");

        let mut empty = FiberReport::default();
        empty.recompress(CollapseRule::WithinBundle).unwrap();
        assert_eq!(empty, FiberReport::default());
    }

    #[test]
    fn missing_master_fails_fast() {
        let frame = flat(1000, &[]);
        let err = ap_test(&record("Domeflat"), None, Some(&frame), &RunConfig::default())
            .unwrap_err();
        assert!(matches!(err, DiagnosticError::InvalidInput(_)));

        let err = ap_test(&record("Domeflat"), None, None, &RunConfig::default()).unwrap_err();
        assert!(matches!(err, DiagnosticError::InvalidInput(_)));
    }

    #[test]
    fn unavailable_frame_gives_the_empty_report() {
        let master = MasterColumn::Scalar(1.0);
        let config = RunConfig::default();
        let telemetry = FixedDithers::default();
        let diag = night(Some(&master), &config, &NoFrames, &telemetry)
            .diagnose(record("Domeflat"))
            .unwrap();
        let report = diag.fibers.unwrap();
        assert_eq!(report, FiberReport::default());
        assert!(!report.is_available());
    }

    #[test]
    fn narrow_frame_is_skipped_not_fatal() {
        let source = Frames::new(flat(100, &[]));
        let master = MasterColumn::Scalar(1.0);
        let config = RunConfig::default();
        let telemetry = FixedDithers::default();
        let diag = night(Some(&master), &config, &source, &telemetry)
            .diagnose(record("Domeflat"))
            .unwrap();
        assert_eq!(diag.fibers, Some(FiberReport::default()));
    }

    #[test]
    fn master_length_mismatch_is_skipped_not_fatal() {
        let source = Frames::new(flat(1000, &[]));
        let master = MasterColumn::PerFiber(vec![1.0; 250]);
        let config = RunConfig::default();
        let telemetry = FixedDithers::default();
        let diag = night(Some(&master), &config, &source, &telemetry)
            .diagnose(record("Domeflat"))
            .unwrap();
        assert_eq!(diag.fibers, Some(FiberReport::default()));
    }

    #[test]
    fn bad_master_values_still_fail_fast() {
        let source = Frames::new(flat(1000, &[]));
        let master = MasterColumn::Scalar(0.0);
        let config = RunConfig::default();
        let telemetry = FixedDithers::default();
        let err = night(Some(&master), &config, &source, &telemetry)
            .diagnose(record("Domeflat"))
            .unwrap_err();
        assert!(matches!(err, DiagnosticError::InvalidInput(_)));
    }

    #[test]
    fn night_run_filters_by_type_and_keeps_going() {
        let master = MasterColumn::Scalar(1.0);
        let config = RunConfig::default();
        let telemetry = FixedDithers::default();
        let run = NightRun {
            only_type: Some("domeflat"),
            ..night(Some(&master), &config, &NoFrames, &telemetry)
        };
        let flat = run.diagnose(record("Domeflat")).unwrap();
        assert_eq!(flat.fibers, Some(FiberReport::default()));
        assert!(flat.to_string().ends_with("(no quickred frame)"));

        let object = run.diagnose(record("Object")).unwrap();
        assert_eq!(object.fibers, None);
    }

    #[test]
    fn unreadable_headers_are_skipped() {
        let config = RunConfig::default();
        let telemetry = FixedDithers::default();
        let out = night(None, &config, &NoFrames, &telemetry)
            .run(&[PathBuf::from("/nonexistent/archive/1/apR-a-1.apz")])
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn arc_line_only_for_lamps() {
        let config = RunConfig::default();
        assert_eq!(arc_line(&record("Domeflat"), &config), None);
        assert_eq!(arc_line(&record("ThAr Arc"), &config), Some(LineFit::thar()));
        assert_eq!(arc_line(&record("UNe Arc"), &config), Some(LineFit::une()));
    }

    #[test]
    fn arc_exposure_reads_its_frame_once() {
        let line = LineFit::thar();
        let rows = (0..300)
            .map(|_| {
                (0..1000)
                    .map(|p| {
                        let x = (p as f64 - 940.0) / line.sigma;
                        10.0 + 50_000.0 * (-0.5 * x * x).exp()
                    })
                    .collect()
            })
            .collect();
        let source = Frames::new(QuickredFrame::from_rows(rows).unwrap());
        let master = MasterColumn::Scalar(10.0);
        let config = RunConfig::default();
        let telemetry = FixedDithers::default();

        let diag = night(Some(&master), &config, &source, &telemetry)
            .diagnose(record("ThAr Arc"))
            .unwrap();
        assert_eq!(source.reads.get(), 1);
        assert!(diag.fibers.as_ref().is_some_and(FiberReport::is_available));
        let offset = diag.offset.unwrap();
        assert!((offset - 1.0).abs() < 0.01, "offset {offset}");
    }

    #[test]
    fn boss_exposures_read_no_frames() {
        let source = Frames::new(flat(1000, &[]));
        let master = MasterColumn::Scalar(1.0);
        let config = RunConfig::default();
        let telemetry = FixedDithers::default();
        let run = NightRun {
            instrument: Instrument::Boss,
            ..night(Some(&master), &config, &source, &telemetry)
        };
        let diag = run.diagnose(record("ThAr Arc")).unwrap();
        assert_eq!((diag.fibers, diag.offset), (None, None));
        assert_eq!(source.reads.get(), 0);
    }
}
