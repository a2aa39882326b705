use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};

use crate::color::band_color;
use crate::data::bundles::{CollapseRule, format_labels};
use crate::data::classify::Band;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Left side panel – exposure list
// ---------------------------------------------------------------------------

/// Render the left exposure panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Exposures");
    if let Some(night) = &state.night {
        ui.label(night.display().to_string());
    }
    ui.separator();

    if state.diagnostics.is_empty() {
        ui.label("No exposures loaded.");
        return;
    }

    let mut clicked = None;
    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            for (i, diag) in state.diagnostics.iter().enumerate() {
                let rec = &diag.record;
                let title = format!("{}  {}  {}", rec.exp_id, rec.kind(), rec.dither);
                let is_selected = state.selected == Some(i);
                if ui
                    .selectable_label(is_selected, RichText::new(title).strong())
                    .clicked()
                {
                    clicked = Some(i);
                }

                if let Some(offset) = diag.offset {
                    ui.label(format!("Arc offset: {offset:+.2} px"));
                }
                match &diag.fibers {
                    Some(fibers) if fibers.is_available() => {
                        for band in [Band::Missing, Band::Faint] {
                            ui.label(
                                RichText::new(format!(
                                    "{}: {}",
                                    band.label(),
                                    format_labels(fibers.labels(band))
                                ))
                                .color(band_color(band)),
                            );
                        }
                    }
                    Some(_) => {
                        ui.label(RichText::new("No quickred frame").italics());
                    }
                    None => {}
                }
                ui.separator();
            }
        });

    if clicked.is_some() {
        state.selected = clicked;
    }
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open night…").clicked() {
                open_night_dialog(state);
                ui.close_menu();
            }
        });

        ui.separator();

        let tested = state
            .diagnostics
            .iter()
            .filter(|d| d.fibers.as_ref().is_some_and(|f| f.is_available()))
            .count();
        ui.label(format!(
            "{} exposures, {} fiber tests",
            state.diagnostics.len(),
            tested
        ));

        ui.separator();

        let legacy = state.settings.config.collapse == CollapseRule::WithinBundle;
        if ui
            .selectable_label(legacy, "Legacy bundle labels")
            .clicked()
        {
            state.set_collapse(if legacy {
                CollapseRule::FullBundle
            } else {
                CollapseRule::WithinBundle
            });
        }

        if let Some(msg) = &state.status_message {
            ui.label(RichText::new(msg).color(Color32::RED));
        }
    });
}

// ---------------------------------------------------------------------------
// Directory dialog
// ---------------------------------------------------------------------------

pub fn open_night_dialog(state: &mut AppState) {
    let dir = rfd::FileDialog::new()
        .set_title("Open night directory")
        .pick_folder();

    if let Some(dir) = dir {
        state.load_night(&dir);
    }
}
