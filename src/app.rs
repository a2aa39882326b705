use eframe::egui;

use crate::state::AppState;
use crate::ui::{panels, plot};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

pub struct FiberCheckApp {
    pub state: AppState,
}

impl FiberCheckApp {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

impl eframe::App for FiberCheckApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ---- Top panel: menu bar ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, &mut self.state);
        });

        // ---- Left side panel: exposures ----
        egui::SidePanel::left("exposure_panel")
            .default_width(320.0)
            .resizable(true)
            .show(ctx, |ui| {
                panels::side_panel(ui, &mut self.state);
            });

        // ---- Central panel: fiber throughput plot ----
        egui::CentralPanel::default().show(ctx, |ui| {
            plot::fiber_plot(ui, &self.state);
        });
    }
}
