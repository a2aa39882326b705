mod app;
mod color;
mod config;
mod data;
mod diagnostic;
mod state;
mod ui;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use eframe::egui;

use app::FiberCheckApp;
use config::RunConfig;
use data::discover::{collect_exposures, night_dir, sjd_now};
use data::header::Instrument;
use data::loader::{load_frame, load_master_column};
use data::model::MasterColumn;
use data::offset::compute_offset;
use data::telemetry::FixedDithers;
use diagnostic::{NightRun, QuickredArchive, fiber_report};
use state::{AppState, RunSettings};

#[derive(Parser)]
#[command(
    name = "fibercheck",
    about = "Summarize a night of APOGEE/BOSS exposures and test APOGEE fiber throughput"
)]
struct Args {
    /// Use tonight's SJD (must be run after 00:00Z)
    #[arg(short, long)]
    today: bool,

    /// The MJD to search when not using --today
    #[arg(short, long)]
    mjd: Option<u32>,

    #[arg(short, long, value_enum, default_value = "apogee")]
    instrument: Instrument,

    /// Instrument data root (default /data/apogee or /data/spectro)
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Scalar master column for the fiber test
    #[arg(long, conflicts_with = "master_file")]
    master_col: Option<f64>,

    /// Per-fiber master column (.json array or one value per line)
    #[arg(long)]
    master_file: Option<PathBuf>,

    /// JSON run configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only fiber-test exposures of this type, e.g. Domeflat
    #[arg(long)]
    only_type: Option<String>,

    /// Test a single quickred frame (.fits.fz, .parquet, .json, .csv) instead of a night
    #[arg(long, conflicts_with_all = ["today", "mjd"])]
    frame: Option<PathBuf>,

    /// With --frame: also fit the arc line of this lamp
    #[arg(long, value_enum, requires = "frame")]
    arc: Option<Lamp>,

    /// Open the interactive fiber plot after the run
    #[arg(long, conflicts_with = "frame")]
    plot: bool,

    /// Show details, can be stacked
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Lamp {
    Thar,
    Une,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    // RUST_LOG, when set, wins over -v.
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

/// Fiber test (and optional arc fit) of one quickred frame file.
fn check_frame(
    path: &Path,
    master: Option<&MasterColumn>,
    lamp: Option<Lamp>,
    config: &RunConfig,
) -> Result<()> {
    let frame = load_frame(path).with_context(|| format!("loading {}", path.display()))?;
    log::info!(
        "{}: {} fibers x {} pixels",
        path.display(),
        frame.n_fibers,
        frame.n_pixels
    );

    if master.is_some() {
        let profile = frame.window_profile(config.window)?;
        println!("{}", fiber_report(&profile, master, config.collapse)?);
    } else if lamp.is_none() {
        bail!("nothing to do: give a master column or --arc");
    }

    if let Some(lamp) = lamp {
        let fit = match lamp {
            Lamp::Thar => config.thar,
            Lamp::Une => config.une,
        };
        match compute_offset(&frame, &fit) {
            Some(offset) => println!("Arc offset: {offset:+.2} px"),
            None => println!("Arc offset: no usable line near pixel {}", fit.w0),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    let master = match (&args.master_file, args.master_col) {
        (Some(path), _) => Some(
            load_master_column(path)
                .with_context(|| format!("loading master column {}", path.display()))?,
        ),
        (None, Some(value)) => Some(MasterColumn::Scalar(value)),
        (None, None) => None,
    };

    if let Some(frame) = &args.frame {
        return check_frame(frame, master.as_ref(), args.arc, &config);
    }

    let mjd = if args.today {
        sjd_now()
    } else if let Some(mjd) = args.mjd {
        mjd
    } else {
        bail!("No date specified: use --today or --mjd");
    };

    let root = args.data_root.clone().unwrap_or_else(|| match args.instrument {
        Instrument::Apogee => PathBuf::from("/data/apogee"),
        Instrument::Boss => PathBuf::from("/data/spectro"),
    });
    let dir = night_dir(&root, args.instrument, mjd);
    println!("{}", dir.display());

    let paths = collect_exposures(&dir, args.instrument);
    log::info!("Found {} exposures in {}", paths.len(), dir.display());

    let telemetry = FixedDithers::new(config.dithers);
    let run = NightRun {
        instrument: args.instrument,
        master: master.as_ref(),
        config: &config,
        telemetry: &telemetry,
        source: &QuickredArchive,
        only_type: args.only_type.as_deref(),
    };
    let diagnostics = run.run(&paths)?;
    for diag in &diagnostics {
        println!("{diag}");
        if diag.fibers.is_some() {
            println!();
        }
    }

    if !args.plot {
        return Ok(());
    }

    let mut state = AppState::new(RunSettings {
        instrument: args.instrument,
        master,
        config,
        only_type: args.only_type,
    });
    state.set_diagnostics(Some(dir), diagnostics);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 700.0])
            .with_min_inner_size([600.0, 400.0]),
        ..Default::default()
    };

    eframe::run_native(
        "fibercheck – APOGEE fiber throughput",
        options,
        Box::new(|_cc| Ok(Box::new(FiberCheckApp::new(state)))),
    )
    .map_err(|e| anyhow::anyhow!("eframe error: {e}"))
}
