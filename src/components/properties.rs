use eframe::egui;
use egui::{Color32, RichText, Vec2};

use crate::chatlog::{ACTION_COLOR, OOC_COLOR, SPEECH_COLOR};
use crate::layer::{Layer, LayerKind, LayerPatch, Rgb};
use crate::ops::text::enumerate_system_fonts;
use crate::store::LayerStore;

/// Swatches offered next to every colour field.
pub const PRESET_COLORS: &[(&str, Rgb)] = &[
    ("Speech", SPEECH_COLOR),
    ("Action", ACTION_COLOR),
    ("OOC", OOC_COLOR),
    ("Black", Rgb::BLACK),
    ("Radio", Rgb::new(0xFF, 0xEC, 0x8B)),
    ("Shout", Rgb::new(0xFF, 0x6B, 0x6B)),
    ("Whisper", Rgb::new(0xB5, 0xB5, 0xB5)),
    ("Phone", Rgb::new(0xF2, 0xC9, 0x4C)),
];

const SWATCH_SIZE: f32 = 16.0;

/// Editor for the selected layer. Widgets work on a scratch copy; whatever
/// differs afterwards is sent to the store as one patch.
#[derive(Default)]
pub struct PropertiesPanel {
    font_families: Option<Vec<String>>,
}

impl PropertiesPanel {
    pub fn show(&mut self, ui: &mut egui::Ui, store: &mut LayerStore) {
        let Some(before) = store.selected_layer().cloned() else {
            ui.weak("No layer selected");
            return;
        };
        let mut after = before.clone();

        common_fields(ui, &mut after);
        ui.separator();
        if after.is_text() {
            self.text_fields(ui, &mut after);
        } else {
            image_fields(ui, &mut after);
        }

        let patch = patch_between(&before, &after);
        if !patch.is_empty() {
            store.update_layer(before.id, &patch);
        }
    }

    fn text_fields(&mut self, ui: &mut egui::Ui, layer: &mut Layer) {
        let LayerKind::Text(text) = &mut layer.kind else { return };
        let families = self.font_families.get_or_insert_with(enumerate_system_fonts);

        ui.label("Content");
        ui.add(egui::TextEdit::multiline(&mut text.content).desired_rows(3).desired_width(f32::INFINITY));

        egui::Grid::new("text_props").num_columns(2).spacing([8.0, 6.0]).show(ui, |ui| {
            ui.label("Font");
            egui::ComboBox::from_id_source("font_family_combo")
                .selected_text(text.font_family.clone())
                .width(150.0)
                .show_ui(ui, |ui: &mut egui::Ui| {
                    for family in families.iter() {
                        ui.selectable_value(&mut text.font_family, family.clone(), family);
                    }
                });
            ui.end_row();

            ui.label("Size");
            ui.add(slider(&mut text.font_size, 8.0..=72.0).suffix(" px"));
            ui.end_row();

            ui.label("Fill");
            color_field(ui, &mut text.color);
            ui.end_row();

            ui.label("Outline");
            color_field(ui, &mut text.stroke_color);
            ui.end_row();

            ui.label("Outline width");
            ui.add(slider(&mut text.stroke_width, 0.0..=10.0));
            ui.end_row();

            ui.label("Shadow blur");
            ui.add(slider(&mut text.shadow_blur, 0.0..=20.0));
            ui.end_row();

            ui.label("Line height");
            ui.add(slider(&mut text.line_height, 0.8..=3.0).fixed_decimals(2));
            ui.end_row();

            ui.label("Style");
            ui.horizontal(|ui| {
                ui.toggle_value(&mut text.bold, RichText::new("B").strong());
                ui.toggle_value(&mut text.italic, RichText::new("I").italics());
            });
            ui.end_row();
        });
    }
}

fn common_fields(ui: &mut egui::Ui, layer: &mut Layer) {
    egui::Grid::new("common_props").num_columns(2).spacing([8.0, 6.0]).show(ui, |ui| {
        ui.label("Name");
        ui.text_edit_singleline(&mut layer.name);
        ui.end_row();

        ui.label("Position");
        ui.horizontal(|ui| {
            ui.add(egui::DragValue::new(&mut layer.x).prefix("x ").speed(1.0));
            ui.add(egui::DragValue::new(&mut layer.y).prefix("y ").speed(1.0));
        });
        ui.end_row();

        ui.label("Flags");
        ui.horizontal(|ui| {
            ui.checkbox(&mut layer.visible, "Visible");
            ui.checkbox(&mut layer.locked, "Locked");
        });
        ui.end_row();
    });
}

fn image_fields(ui: &mut egui::Ui, layer: &mut Layer) {
    let LayerKind::Image(img) = &mut layer.kind else { return };
    egui::Grid::new("image_props").num_columns(2).spacing([8.0, 6.0]).show(ui, |ui| {
        ui.label("Scale");
        ui.add(slider(&mut img.scale, 0.1..=3.0).fixed_decimals(2));
        ui.end_row();

        ui.label("Rotation");
        ui.add(slider(&mut img.rotation, -180.0..=180.0).suffix("°"));
        ui.end_row();

        ui.label("Brightness");
        ui.add(slider(&mut img.filters.brightness, 0.0..=200.0).suffix("%"));
        ui.end_row();

        ui.label("Contrast");
        ui.add(slider(&mut img.filters.contrast, 0.0..=200.0).suffix("%"));
        ui.end_row();

        ui.label("Saturation");
        ui.add(slider(&mut img.filters.saturation, 0.0..=200.0).suffix("%"));
        ui.end_row();

        ui.label("Blur");
        ui.add(slider(&mut img.filters.blur, 0.0..=20.0).suffix(" px"));
        ui.end_row();
    });
    if ui.button("Reset filters").clicked() {
        img.filters = Default::default();
    }
}

/// A slider that shows, but never forces, its declared range.
fn slider(value: &mut f32, range: std::ops::RangeInclusive<f32>) -> egui::Slider<'_> {
    egui::Slider::new(value, range).clamp_to_range(false)
}

/// Colour button plus the preset swatches.
fn color_field(ui: &mut egui::Ui, color: &mut Rgb) {
    ui.horizontal(|ui| {
        let mut rgb = color.to_array();
        if ui.color_edit_button_srgb(&mut rgb).changed() {
            *color = Rgb::from_array(rgb);
        }
        for (name, preset) in PRESET_COLORS {
            let fill = Color32::from_rgb(preset.r, preset.g, preset.b);
            let swatch = egui::Button::new("").fill(fill).min_size(Vec2::splat(SWATCH_SIZE));
            if ui.add(swatch).on_hover_text(format!("{} {}", name, preset)).clicked() {
                *color = *preset;
            }
        }
    });
}

/// Every field that differs between the two snapshots of the same layer.
pub fn patch_between(before: &Layer, after: &Layer) -> LayerPatch {
    let mut patch = LayerPatch {
        name: changed(&before.name, &after.name),
        visible: changed(&before.visible, &after.visible),
        locked: changed(&before.locked, &after.locked),
        x: changed_num(before.x, after.x),
        y: changed_num(before.y, after.y),
        ..Default::default()
    };
    match (&before.kind, &after.kind) {
        (LayerKind::Image(a), LayerKind::Image(b)) => {
            patch.scale = changed_num(a.scale, b.scale);
            patch.rotation = changed_num(a.rotation, b.rotation);
            patch.brightness = changed_num(a.filters.brightness, b.filters.brightness);
            patch.contrast = changed_num(a.filters.contrast, b.filters.contrast);
            patch.saturation = changed_num(a.filters.saturation, b.filters.saturation);
            patch.blur = changed_num(a.filters.blur, b.filters.blur);
        }
        (LayerKind::Text(a), LayerKind::Text(b)) => {
            patch.content = changed(&a.content, &b.content);
            patch.font_size = changed_num(a.font_size, b.font_size);
            patch.font_family = changed(&a.font_family, &b.font_family);
            patch.color = changed(&a.color, &b.color);
            patch.stroke_color = changed(&a.stroke_color, &b.stroke_color);
            patch.stroke_width = changed_num(a.stroke_width, b.stroke_width);
            patch.shadow_blur = changed_num(a.shadow_blur, b.shadow_blur);
            patch.line_height = changed_num(a.line_height, b.line_height);
            patch.bold = changed(&a.bold, &b.bold);
            patch.italic = changed(&a.italic, &b.italic);
        }
        _ => {}
    }
    patch
}

/// Bitwise, so a NaN left in a field does not count as an edit every frame.
fn changed_num(before: f32, after: f32) -> Option<f32> {
    (before.to_bits() != after.to_bits()).then_some(after)
}

fn changed<T: Clone + PartialEq>(before: &T, after: &T) -> Option<T> {
    (before != after).then(|| after.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{Bitmap, LayerId};
    use image::RgbaImage;

    fn text() -> (LayerStore, LayerId) {
        let mut store = LayerStore::default();
        let id = store.add_text_layer("hi", Rgb::WHITE, None);
        (store, id)
    }

    #[test]
    fn unchanged_layer_gives_empty_patch() {
        let (store, id) = text();
        let layer = store.layer(id).unwrap();
        assert!(patch_between(layer, layer).is_empty());
    }

    #[test]
    fn patch_carries_only_edited_fields() {
        let (mut store, id) = text();
        let before = store.layer(id).unwrap().clone();
        let mut after = before.clone();
        after.y = 99.0;
        if let LayerKind::Text(t) = &mut after.kind {
            t.color = ACTION_COLOR;
            t.italic = true;
        }
        let patch = patch_between(&before, &after);
        assert_eq!(
            patch,
            LayerPatch {
                y: Some(99.0),
                color: Some(ACTION_COLOR),
                italic: Some(true),
                ..Default::default()
            }
        );
        store.update_layer(id, &patch);
        assert_eq!(store.layer(id), Some(&after));
    }

    #[test]
    fn image_filters_round_trip_through_patch() {
        let mut store = LayerStore::default();
        let id = store.add_image_layer(Bitmap::new(RgbaImage::new(2, 2)));
        let before = store.layer(id).unwrap().clone();
        let mut after = before.clone();
        if let LayerKind::Image(img) = &mut after.kind {
            img.filters.blur = 250.0;
            img.rotation = -45.0;
        }
        store.update_layer(id, &patch_between(&before, &after));
        assert_eq!(store.layer(id), Some(&after));
    }

    #[test]
    fn nan_fields_are_not_edits() {
        let (mut store, id) = text();
        store.update_layer(id, &LayerPatch { font_size: Some(f32::NAN), ..Default::default() });
        let layer = store.layer(id).unwrap();
        assert!(patch_between(layer, &layer.clone()).is_empty());
    }

    #[test]
    fn presets_include_chat_colours() {
        let colors: Vec<Rgb> = PRESET_COLORS.iter().map(|(_, c)| *c).collect();
        assert!(colors.contains(&ACTION_COLOR));
        assert!(colors.contains(&OOC_COLOR));
        assert!(colors.contains(&SPEECH_COLOR));
    }
}
