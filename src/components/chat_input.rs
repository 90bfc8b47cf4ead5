use eframe::egui;
use egui::Color32;

use crate::chatlog::parse_chatlog;
use crate::components::properties::PRESET_COLORS;
use crate::layer::{LayerId, Rgb};
use crate::store::LayerStore;

/// "Add text" form and the chatlog paste area.
pub struct ChatInputPanel {
    pub text: String,
    pub color: Rgb,
    pub use_explicit_y: bool,
    pub explicit_y: f32,
    pub chatlog: String,
    pub start_y: f32,
}

impl ChatInputPanel {
    pub fn new(start_y: f32) -> Self {
        Self {
            text: String::new(),
            color: Rgb::WHITE,
            use_explicit_y: false,
            explicit_y: start_y,
            chatlog: String::new(),
            start_y,
        }
    }

    /// Add the typed text as a new layer. Blank input adds nothing.
    pub fn add_text(&mut self, store: &mut LayerStore) -> Option<LayerId> {
        if self.text.trim().is_empty() {
            return None;
        }
        let y = self.use_explicit_y.then_some(self.explicit_y);
        let id = store.add_text_layer(&self.text, self.color, y);
        self.text.clear();
        Some(id)
    }

    /// Parse the pasted chatlog into one layer per line. The paste area is
    /// emptied once something was added.
    pub fn add_chat_lines(&mut self, store: &mut LayerStore) -> usize {
        let records = parse_chatlog(&self.chatlog, self.start_y);
        let added = store.bulk_add_text_layers(&records).len();
        if added > 0 {
            self.chatlog.clear();
        }
        added
    }

    pub fn show(&mut self, ui: &mut egui::Ui, store: &mut LayerStore) {
        ui.heading("Add text");
        ui.add(
            egui::TextEdit::multiline(&mut self.text)
                .hint_text("Caption text")
                .desired_rows(2)
                .desired_width(f32::INFINITY),
        );
        ui.horizontal_wrapped(|ui| {
            for (name, preset) in PRESET_COLORS {
                let fill = Color32::from_rgb(preset.r, preset.g, preset.b);
                let selected = self.color == *preset;
                let button = egui::Button::new("")
                    .fill(fill)
                    .min_size(egui::vec2(18.0, 18.0))
                    .stroke(if selected {
                        egui::Stroke::new(2.0, ui.visuals().selection.stroke.color)
                    } else {
                        egui::Stroke::NONE
                    });
                if ui.add(button).on_hover_text(*name).clicked() {
                    self.color = *preset;
                }
            }
        });
        ui.horizontal(|ui| {
            ui.checkbox(&mut self.use_explicit_y, "At y");
            ui.add_enabled(self.use_explicit_y, egui::DragValue::new(&mut self.explicit_y).speed(1.0));
        });
        if ui.add_enabled(!self.text.trim().is_empty(), egui::Button::new("Add text")).clicked() {
            self.add_text(store);
        }

        ui.add_space(8.0);
        ui.separator();
        ui.heading("Chatlog");
        egui::ScrollArea::vertical()
            .id_source("chatlog_scroll")
            .max_height(160.0)
            .show(ui, |ui| {
                ui.add(
                    egui::TextEdit::multiline(&mut self.chatlog)
                        .hint_text("[12:00:00] Name says: Paste your chatlog here")
                        .font(egui::TextStyle::Monospace)
                        .desired_rows(6)
                        .desired_width(f32::INFINITY),
                );
            });
        ui.horizontal(|ui| {
            ui.label("Start y");
            ui.add(egui::DragValue::new(&mut self.start_y).speed(1.0));
        });
        if ui.add_enabled(!self.chatlog.trim().is_empty(), egui::Button::new("Add chat lines")).clicked() {
            let n = self.add_chat_lines(store);
            log::info!("Chatlog paste produced {} lines", n);
        }
    }
}
