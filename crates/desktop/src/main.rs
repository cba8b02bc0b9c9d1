//! Natter Desktop: application entry.

mod app;

use eframe::egui;
use natter::app::AppState;

const DEFAULT_SIZE: [f32; 2] = [1100.0, 760.0];

/// Parse a saved "WxH" geometry. Anything after the height (e.g. "+X+Y" offsets) is ignored.
fn parse_geometry(geometry: &str) -> Option<[f32; 2]> {
    let (w, rest) = geometry.trim().split_once('x')?;
    let h: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let w: f32 = w.parse().ok()?;
    let h: f32 = h.parse().ok()?;
    (w >= 200.0 && h >= 200.0).then_some([w, h])
}

fn main() -> eframe::Result<()> {
    app::install_logger();

    let state = AppState::open(None);
    let size = state
        .config()
        .geometry
        .as_deref()
        .and_then(parse_geometry)
        .unwrap_or(DEFAULT_SIZE);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(size)
            .with_min_inner_size([640.0, 480.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Natter",
        options,
        Box::new(move |cc| Box::new(app::NatterApp::new(cc, state))),
    )
}
