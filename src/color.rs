use eframe::egui::Color32;

use crate::data::classify::Band;

// ---------------------------------------------------------------------------
// Band colours
// ---------------------------------------------------------------------------

pub const BRIGHT: Color32 = Color32::from_rgb(0, 153, 136);
pub const FAINT: Color32 = Color32::from_rgb(238, 119, 51);
pub const MISSING: Color32 = Color32::from_rgb(204, 51, 17);

/// Colour of a band's points and its threshold line.
pub fn band_color(band: Band) -> Color32 {
    match band {
        Band::Bright => BRIGHT,
        Band::Faint => FAINT,
        Band::Missing => MISSING,
    }
}
