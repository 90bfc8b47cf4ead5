use eframe::egui;
use egui::{Color32, RichText};

use crate::layer::{LayerId, LayerKind, LayerPatch};
use crate::store::LayerStore;

const ROW_HEIGHT: f32 = 22.0;

/// One click in the layer list, applied after the list has been drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerAction {
    Select(LayerId),
    ToggleVisible(LayerId),
    ToggleLocked(LayerId),
    MoveUp(LayerId),
    MoveDown(LayerId),
    Duplicate(LayerId),
    Delete(LayerId),
}

pub fn apply_layer_action(store: &mut LayerStore, action: LayerAction) {
    match action {
        LayerAction::Select(id) => store.select(Some(id)),
        LayerAction::ToggleVisible(id) => {
            if let Some(layer) = store.layer(id) {
                let patch = LayerPatch { visible: Some(!layer.visible), ..Default::default() };
                store.update_layer(id, &patch);
            }
        }
        LayerAction::ToggleLocked(id) => {
            if let Some(layer) = store.layer(id) {
                let patch = LayerPatch { locked: Some(!layer.locked), ..Default::default() };
                store.update_layer(id, &patch);
            }
        }
        LayerAction::MoveUp(id) => store.move_layer_up(id),
        LayerAction::MoveDown(id) => store.move_layer_down(id),
        LayerAction::Duplicate(id) => {
            store.duplicate_layer(id);
        }
        LayerAction::Delete(id) => {
            store.delete_layer(id);
        }
    }
}

#[derive(Default)]
pub struct LayersPanel {
    pending: Vec<LayerAction>,
}

impl LayersPanel {
    /// Top-most layer first. Locked layers can still be selected here.
    pub fn show(&mut self, ui: &mut egui::Ui, store: &mut LayerStore) {
        let selected = store.selected_id();

        ui.horizontal(|ui| {
            ui.heading("Layers");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.weak(format!("{}", store.len()));
            });
        });
        ui.separator();

        if store.is_empty() {
            ui.weak("Open an image or add text to start.");
        }

        egui::ScrollArea::vertical()
            .id_source("layer_list")
            .auto_shrink([false, true])
            .max_height((ui.available_height() - 40.0).max(60.0))
            .show(ui, |ui| {
                for layer in store.layers().iter().rev() {
                    let id = layer.id;
                    ui.horizontal(|ui| {
                        ui.set_min_height(ROW_HEIGHT);
                        let eye = if layer.visible { "👁" } else { "—" };
                        if ui.small_button(eye).on_hover_text("Toggle visibility").clicked() {
                            self.pending.push(LayerAction::ToggleVisible(id));
                        }
                        let lock = if layer.locked { "🔒" } else { "🔓" };
                        if ui.small_button(lock).on_hover_text("Toggle lock").clicked() {
                            self.pending.push(LayerAction::ToggleLocked(id));
                        }
                        let kind = match &layer.kind {
                            LayerKind::Image(_) => "🖼",
                            LayerKind::Text(_) => "T",
                        };
                        let mut label = RichText::new(format!("{} {}", kind, layer.name));
                        if !layer.visible {
                            label = label.color(Color32::GRAY);
                        }
                        if ui.selectable_label(selected == Some(id), label).clicked() {
                            self.pending.push(LayerAction::Select(id));
                        }
                    });
                }
            });

        ui.separator();
        ui.add_enabled_ui(selected.is_some(), |ui| {
            ui.horizontal(|ui| {
                let Some(id) = selected else { return };
                if ui.button("⬆").on_hover_text("Move up").clicked() {
                    self.pending.push(LayerAction::MoveUp(id));
                }
                if ui.button("⬇").on_hover_text("Move down").clicked() {
                    self.pending.push(LayerAction::MoveDown(id));
                }
                if ui.button("Duplicate").clicked() {
                    self.pending.push(LayerAction::Duplicate(id));
                }
                if ui.button("Delete").clicked() {
                    self.pending.push(LayerAction::Delete(id));
                }
            });
        });

        for action in self.pending.drain(..) {
            apply_layer_action(store, action);
        }
    }
}
