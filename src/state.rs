use std::path::{Path, PathBuf};

use crate::config::RunConfig;
use crate::data::bundles::CollapseRule;
use crate::data::discover::collect_exposures;
use crate::data::header::Instrument;
use crate::data::model::MasterColumn;
use crate::data::telemetry::FixedDithers;
use crate::diagnostic::{ExposureDiagnostic, NightRun, QuickredArchive};

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// What a night run needs, kept so the viewer can open another night.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub instrument: Instrument,
    pub master: Option<MasterColumn>,
    pub config: RunConfig,
    pub only_type: Option<String>,
}

/// The full UI state, independent of rendering.
pub struct AppState {
    pub settings: RunSettings,

    /// Night directory the diagnostics came from.
    pub night: Option<PathBuf>,

    /// Diagnosed exposures, in file order.
    pub diagnostics: Vec<ExposureDiagnostic>,

    /// Index into `diagnostics` of the plotted exposure.
    pub selected: Option<usize>,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,
}

impl AppState {
    pub fn new(settings: RunSettings) -> Self {
        Self {
            settings,
            night: None,
            diagnostics: Vec::new(),
            selected: None,
            status_message: None,
        }
    }

    /// Ingest a night's diagnostics and select the first one with fibers.
    pub fn set_diagnostics(
        &mut self,
        night: Option<PathBuf>,
        diagnostics: Vec<ExposureDiagnostic>,
    ) {
        self.selected = diagnostics
            .iter()
            .position(|d| d.fibers.as_ref().is_some_and(|f| f.is_available()))
            .or(if diagnostics.is_empty() { None } else { Some(0) });
        self.diagnostics = diagnostics;
        self.night = night;
        self.status_message = None;
    }

    /// Discover and diagnose every exposure under `dir`.
    pub fn load_night(&mut self, dir: &Path) {
        let paths = collect_exposures(dir, self.settings.instrument);
        let telemetry = FixedDithers::new(self.settings.config.dithers);
        let run = NightRun {
            instrument: self.settings.instrument,
            master: self.settings.master.as_ref(),
            config: &self.settings.config,
            telemetry: &telemetry,
            source: &QuickredArchive,
            only_type: self.settings.only_type.as_deref(),
        };
        match run.run(&paths) {
            Ok(diagnostics) => {
                log::info!("Loaded {} exposures from {}", diagnostics.len(), dir.display());
                self.set_diagnostics(Some(dir.to_path_buf()), diagnostics);
            }
            Err(e) => {
                log::error!("Failed to diagnose {}: {e:#}", dir.display());
                self.status_message = Some(format!("Error: {e:#}"));
            }
        }
    }

    pub fn selected_diagnostic(&self) -> Option<&ExposureDiagnostic> {
        self.selected.and_then(|i| self.diagnostics.get(i))
    }

    /// Switch the bundle collapse rule and re-render every report.
    pub fn set_collapse(&mut self, rule: CollapseRule) {
        self.settings.config.collapse = rule;
        for diag in &mut self.diagnostics {
            if let Some(fibers) = &mut diag.fibers {
                if let Err(e) = fibers.recompress(rule) {
                    log::error!("Re-labelling {} failed: {e}", diag.record.exp_id);
                    self.status_message = Some(format!("Error: {e}"));
                }
            }
        }
    }
}
