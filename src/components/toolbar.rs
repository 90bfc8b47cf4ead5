use eframe::egui;

use crate::store::{MAX_ZOOM, MIN_ZOOM};

/// Top-bar buttons that need app-level handling (dialogs, IO, settings).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolbarAction {
    OpenImage,
    ExportPng,
    ChooseExportDir,
    ZoomIn,
    ZoomOut,
    ResetZoom,
    ClearCanvas,
}

pub fn zoom_label(zoom: f32) -> String {
    format!("{:.0}%", zoom * 100.0)
}

/// Draws the toolbar and returns the action clicked this frame, if any.
pub fn show(ui: &mut egui::Ui, zoom: f32, busy: bool) -> Option<ToolbarAction> {
    let mut action = None;
    ui.horizontal(|ui| {
        if ui.button("📂 Open image").clicked() {
            action = Some(ToolbarAction::OpenImage);
        }
        if ui.add_enabled(!busy, egui::Button::new("💾 Export PNG")).clicked() {
            action = Some(ToolbarAction::ExportPng);
        }
        if ui.button("Export folder…").clicked() {
            action = Some(ToolbarAction::ChooseExportDir);
        }
        ui.separator();

        if ui.add_enabled(zoom > MIN_ZOOM, egui::Button::new("−")).on_hover_text("Zoom out").clicked() {
            action = Some(ToolbarAction::ZoomOut);
        }
        if ui.button(zoom_label(zoom)).on_hover_text("Reset zoom").clicked() {
            action = Some(ToolbarAction::ResetZoom);
        }
        if ui.add_enabled(zoom < MAX_ZOOM, egui::Button::new("+")).on_hover_text("Zoom in").clicked() {
            action = Some(ToolbarAction::ZoomIn);
        }
        ui.separator();

        if ui.button("Clear").on_hover_text("Remove every layer").clicked() {
            action = Some(ToolbarAction::ClearCanvas);
        }
        if busy {
            ui.spinner();
        }
    });
    action
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_label_is_a_rounded_percentage() {
        assert_eq!(zoom_label(1.0), "100%");
        assert_eq!(zoom_label(0.1), "10%");
        assert_eq!(zoom_label(1.2000001), "120%");
    }
}
