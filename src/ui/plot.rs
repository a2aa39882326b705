use eframe::egui::{Ui, Vec2b};
use egui_plot::{HLine, Plot, PlotPoints, Points};

use crate::color::band_color;
use crate::data::classify::{Band, FAINT_BELOW, MISSING_BELOW};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Fiber throughput plot (central panel)
// ---------------------------------------------------------------------------

const FIBER_AXIS: (f64, f64) = (1.0, 300.0);
const RATIO_AXIS: (f64, f64) = (-0.2, 1.35);

/// Scatter of each fiber's throughput ratio, coloured by band.
pub fn fiber_plot(ui: &mut Ui, state: &AppState) {
    let Some(diag) = state.selected_diagnostic() else {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("Open a night to inspect fibers  (File → Open night…)");
        });
        return;
    };

    let Some(partition) = diag.fibers.as_ref().and_then(|f| f.partition.as_ref()) else {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading(format!("No fiber test for exposure {}", diag.record.exp_id));
        });
        return;
    };

    ui.vertical_centered(|ui: &mut Ui| {
        ui.heading(format!("APOGEE Fiber Relative Intensity – {}", diag.record.exp_id));
    });

    Plot::new("fiber_plot")
        .legend(egui_plot::Legend::default())
        .x_axis_label("Fiber ID")
        .y_axis_label("Throughput Efficiency")
        .include_x(FIBER_AXIS.0)
        .include_x(FIBER_AXIS.1)
        .include_y(RATIO_AXIS.0)
        .include_y(RATIO_AXIS.1)
        .auto_bounds(Vec2b::new(false, false))
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .show(ui, |plot_ui| {
            for band in [Band::Bright, Band::Faint, Band::Missing] {
                let points: PlotPoints = partition
                    .indices(band)
                    .iter()
                    .map(|&i| [(i + 1) as f64, partition.ratios[i]])
                    .collect();
                plot_ui.points(
                    Points::new(points)
                        .name(band.label())
                        .color(band_color(band))
                        .radius(3.0),
                );
            }

            plot_ui.hline(HLine::new(FAINT_BELOW).color(band_color(Band::Bright)));
            plot_ui.hline(HLine::new(MISSING_BELOW).color(band_color(Band::Faint)));
        });
}
