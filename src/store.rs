// ============================================================================
// LAYER STORE: the single owner of session state and its mutation surface
// ============================================================================

use crate::chatlog::ChatLine;
use crate::layer::{
    Bitmap, ImageLayer, Layer, LayerId, LayerKind, LayerPatch, Rgb, TextLayer,
};

pub const DEFAULT_CANVAS_WIDTH: u32 = 1280;
pub const DEFAULT_CANVAS_HEIGHT: u32 = 720;
pub const DEFAULT_FONT_FAMILY: &str = "Arial";

pub const MIN_ZOOM: f32 = 0.1;
pub const MAX_ZOOM: f32 = 3.0;
pub const ZOOM_STEP: f32 = 0.1;

/// y of the first text layer when no text layer exists yet.
pub const FIRST_TEXT_Y: f32 = 50.0;
pub const TEXT_X: f32 = 20.0;
pub const DUPLICATE_OFFSET: f32 = 20.0;

/// Defaults for a single "Add text" action.
const TEXT_FONT_SIZE: f32 = 14.0;
const TEXT_LINE_HEIGHT: f32 = 1.2;
/// Defaults for bulk-added chat lines.
const CHAT_FONT_SIZE: f32 = 13.0;
const CHAT_LINE_HEIGHT: f32 = 1.1;
const STROKE_WIDTH: f32 = 2.0;

/// Ordered layers (index 0 paints first), selection, canvas size and zoom.
///
/// Every method that changes anything bumps `revision`, which the view
/// compares against the last rendered revision to decide when to redraw.
/// Operations that name an unknown layer id do nothing.
pub struct LayerStore {
    layers: Vec<Layer>,
    selected: Option<LayerId>,
    width: u32,
    height: u32,
    zoom: f32,
    font_family: String,
    revision: u64,
}

impl Default for LayerStore {
    fn default() -> Self {
        Self::new(DEFAULT_CANVAS_WIDTH, DEFAULT_CANVAS_HEIGHT)
    }
}

impl LayerStore {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            layers: Vec::new(),
            selected: None,
            width,
            height,
            zoom: 1.0,
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            revision: 0,
        }
    }

    // -- Queries -------------------------------------------------------------

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn selected_id(&self) -> Option<LayerId> {
        self.selected
    }

    pub fn selected_layer(&self) -> Option<&Layer> {
        self.selected.and_then(|id| self.layer(id))
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn default_font_family(&self) -> &str {
        &self.font_family
    }

    // -- Layer creation --------------------------------------------------------

    /// Insert a locked image layer at the bottom and snap the canvas to the
    /// bitmap's natural size. Selection is left alone.
    pub fn add_image_layer(&mut self, bitmap: Bitmap) -> LayerId {
        let id = LayerId::new();
        self.width = bitmap.width();
        self.height = bitmap.height();
        self.layers.insert(
            0,
            Layer {
                id,
                name: "Background".to_string(),
                visible: true,
                locked: true,
                x: 0.0,
                y: 0.0,
                kind: LayerKind::Image(ImageLayer::from_bitmap(bitmap)),
            },
        );
        log::info!("Added image layer {} ({}x{})", id, self.width, self.height);
        self.touch();
        id
    }

    /// Append a text layer and select it. Without an explicit y the layer
    /// stacks right below the last text layer's first line block.
    pub fn add_text_layer(&mut self, content: &str, color: Rgb, explicit_y: Option<f32>) -> LayerId {
        let y = explicit_y.unwrap_or_else(|| self.next_text_y());
        let layer = self.text_layer("Text", content, color, y, TEXT_FONT_SIZE, TEXT_LINE_HEIGHT);
        let id = layer.id;
        self.layers.push(layer);
        self.selected = Some(id);
        self.touch();
        id
    }

    /// Append one "Chat Line" layer per record, in order. Selection is left alone.
    pub fn bulk_add_text_layers(&mut self, records: &[ChatLine]) -> Vec<LayerId> {
        let mut ids = Vec::with_capacity(records.len());
        for rec in records {
            let layer = self.text_layer(
                "Chat Line",
                &rec.content,
                rec.color,
                rec.y,
                CHAT_FONT_SIZE,
                CHAT_LINE_HEIGHT,
            );
            ids.push(layer.id);
            self.layers.push(layer);
        }
        if !ids.is_empty() {
            log::info!("Added {} chat lines", ids.len());
            self.touch();
        }
        ids
    }

    fn text_layer(
        &self,
        name: &str,
        content: &str,
        color: Rgb,
        y: f32,
        font_size: f32,
        line_height: f32,
    ) -> Layer {
        Layer {
            id: LayerId::new(),
            name: name.to_string(),
            visible: true,
            locked: false,
            x: TEXT_X,
            y,
            kind: LayerKind::Text(TextLayer {
                content: content.to_string(),
                font_size,
                font_family: self.font_family.clone(),
                color,
                stroke_color: Rgb::BLACK,
                stroke_width: STROKE_WIDTH,
                shadow_blur: 0.0,
                line_height,
                bold: true,
                italic: false,
            }),
        }
    }

    fn next_text_y(&self) -> f32 {
        self.layers
            .iter()
            .rev()
            .find_map(|l| l.as_text().map(|t| l.y + t.font_size * t.line_height))
            .unwrap_or(FIRST_TEXT_Y)
    }

    // -- Mutation ----------------------------------------------------------------

    /// Merge `patch` into the layer; fields of the other variant are ignored.
    pub fn update_layer(&mut self, id: LayerId, patch: &LayerPatch) {
        if patch.is_empty() {
            return;
        }
        if let Some(layer) = self.layers.iter_mut().find(|l| l.id == id) {
            patch.apply_to(layer);
            self.touch();
        }
    }

    pub fn set_position(&mut self, id: LayerId, x: f32, y: f32) {
        self.update_layer(id, &LayerPatch::position(x, y));
    }

    /// Remove a layer and hand it back. Clears the selection if it pointed here.
    pub fn delete_layer(&mut self, id: LayerId) -> Option<Layer> {
        let idx = self.index_of(id)?;
        let removed = self.layers.remove(idx);
        if self.selected == Some(id) {
            self.selected = None;
        }
        log::info!("Deleted layer '{}' ({})", removed.name, id);
        self.touch();
        Some(removed)
    }

    /// Clone a layer on top of the stack, offset by (+20, +20), and select it.
    pub fn duplicate_layer(&mut self, id: LayerId) -> Option<LayerId> {
        let src = self.layer(id)?;
        let new_id = LayerId::new();
        let dup = Layer {
            id: new_id,
            name: format!("{} (Copy)", src.name),
            x: src.x + DUPLICATE_OFFSET,
            y: src.y + DUPLICATE_OFFSET,
            ..src.clone()
        };
        self.layers.push(dup);
        self.selected = Some(new_id);
        self.touch();
        Some(new_id)
    }

    /// Move the layer at `from` to `to`. Out-of-bounds indices do nothing.
    pub fn reorder(&mut self, from: usize, to: usize) {
        let len = self.layers.len();
        if from >= len || to >= len || from == to {
            return;
        }
        let layer = self.layers.remove(from);
        self.layers.insert(to, layer);
        self.touch();
    }

    /// One step towards the top of the paint order.
    pub fn move_layer_up(&mut self, id: LayerId) {
        if let Some(idx) = self.index_of(id) {
            self.reorder(idx, idx + 1);
        }
    }

    /// One step towards the bottom of the paint order.
    pub fn move_layer_down(&mut self, id: LayerId) {
        if let Some(idx) = self.index_of(id)
            && idx > 0
        {
            self.reorder(idx, idx - 1);
        }
    }

    /// Select a layer (locked ones included) or clear the selection.
    pub fn select(&mut self, id: Option<LayerId>) {
        if let Some(id) = id
            && self.index_of(id).is_none()
        {
            return;
        }
        if self.selected != id {
            self.selected = id;
            self.touch();
        }
    }

    // -- Canvas --------------------------------------------------------------------

    pub fn set_canvas_size(&mut self, width: u32, height: u32) {
        if (width, height) != (self.width, self.height) {
            self.width = width;
            self.height = height;
            self.touch();
        }
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        if !zoom.is_finite() {
            return;
        }
        let zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        if zoom != self.zoom {
            self.zoom = zoom;
            self.touch();
        }
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(round_zoom(self.zoom + ZOOM_STEP));
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(round_zoom(self.zoom - ZOOM_STEP));
    }

    pub fn reset_zoom(&mut self) {
        self.set_zoom(1.0);
    }

    /// Font family given to newly created text layers.
    pub fn set_default_font_family(&mut self, family: &str) {
        self.font_family = family.to_string();
    }

    /// Drop every layer and return to the given canvas size.
    pub fn clear(&mut self, width: u32, height: u32) {
        self.layers.clear();
        self.selected = None;
        self.width = width;
        self.height = height;
        self.touch();
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

/// Keep repeated ±0.1 steps on the one-decimal grid.
fn round_zoom(z: f32) -> f32 {
    (z * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatlog::{DEFAULT_START_Y, parse_chatlog};
    use image::RgbaImage;

    fn bitmap(w: u32, h: u32) -> Bitmap {
        Bitmap::new(RgbaImage::new(w, h))
    }

    fn store_with_three() -> (LayerStore, [LayerId; 3]) {
        let mut store = LayerStore::default();
        let a = store.add_text_layer("a", Rgb::WHITE, Some(10.0));
        let b = store.add_text_layer("b", Rgb::WHITE, Some(20.0));
        let c = store.add_text_layer("c", Rgb::WHITE, Some(30.0));
        (store, [a, b, c])
    }

    #[test]
    fn text_layers_stack_below_previous_text() {
        let mut store = LayerStore::default();
        let first = store.add_text_layer("one", Rgb::WHITE, None);
        assert_eq!(store.layer(first).unwrap().y, 50.0);

        let second = store.add_text_layer("two", Rgb::WHITE, None);
        let y = store.layer(second).unwrap().y;
        assert!((y - 66.8).abs() < 1e-4, "got {y}");
        assert_eq!(store.selected_id(), Some(second));
    }

    #[test]
    fn explicit_y_wins_and_image_layers_do_not_count_for_stacking() {
        let mut store = LayerStore::default();
        store.add_image_layer(bitmap(10, 10));
        let t = store.add_text_layer("x", Rgb::WHITE, None);
        assert_eq!(store.layer(t).unwrap().y, FIRST_TEXT_Y);
        let u = store.add_text_layer("y", Rgb::WHITE, Some(400.0));
        assert_eq!(store.layer(u).unwrap().y, 400.0);
    }

    #[test]
    fn text_defaults() {
        let mut store = LayerStore::default();
        let id = store.add_text_layer("hi", Rgb::new(1, 2, 3), None);
        let layer = store.layer(id).unwrap();
        let text = layer.as_text().unwrap();
        assert_eq!(layer.name, "Text");
        assert!(!layer.locked && layer.visible);
        assert_eq!(text.font_size, 14.0);
        assert_eq!(text.line_height, 1.2);
        assert_eq!(text.stroke_width, 2.0);
        assert!(text.bold && !text.italic);
        assert_eq!(text.color, Rgb::new(1, 2, 3));
    }

    #[test]
    fn image_layer_goes_to_bottom_locked_and_resizes_canvas() {
        let (mut store, [a, ..]) = store_with_three();
        store.select(Some(a));
        let img = store.add_image_layer(bitmap(640, 480));
        assert_eq!(store.layers()[0].id, img);
        assert!(store.layers()[0].locked);
        assert_eq!(store.canvas_size(), (640, 480));
        assert_eq!(store.selected_id(), Some(a));
        let data = store.layers()[0].as_image().unwrap();
        assert_eq!((data.width, data.height, data.scale, data.rotation), (640, 480, 1.0, 0.0));
        assert!(data.filters.is_neutral());
    }

    #[test]
    fn bulk_add_keeps_order_and_selection() {
        let mut store = LayerStore::default();
        let keep = store.add_text_layer("keep", Rgb::WHITE, None);
        let lines = parse_chatlog("* waves\nBob says: yo", DEFAULT_START_Y);
        let ids = store.bulk_add_text_layers(&lines);
        assert_eq!(ids.len(), 2);
        assert_eq!(store.selected_id(), Some(keep));
        let last = store.layers().last().unwrap();
        assert_eq!(last.id, ids[1]);
        assert_eq!(last.name, "Chat Line");
        assert_eq!(last.y, 74.0);
        let text = last.as_text().unwrap();
        assert_eq!((text.font_size, text.line_height), (13.0, 1.1));
        assert_eq!(text.content, "Bob says: yo");
    }

    #[test]
    fn reorder_out_of_bounds_is_noop() {
        let (mut store, ids) = store_with_three();
        let rev = store.revision();
        store.reorder(0, 5);
        store.reorder(7, 0);
        let order: Vec<LayerId> = store.layers().iter().map(|l| l.id).collect();
        assert_eq!(order, ids);
        assert_eq!(store.revision(), rev);
    }

    #[test]
    fn reorder_moves_one_element() {
        let (mut store, [a, b, c]) = store_with_three();
        store.reorder(0, 2);
        let order: Vec<LayerId> = store.layers().iter().map(|l| l.id).collect();
        assert_eq!(order, [b, c, a]);
        store.move_layer_down(a);
        store.move_layer_up(b);
        let order: Vec<LayerId> = store.layers().iter().map(|l| l.id).collect();
        assert_eq!(order, [c, b, a]);
    }

    #[test]
    fn delete_clears_selection_only_when_selected() {
        let (mut store, [a, b, c]) = store_with_three();
        assert_eq!(store.selected_id(), Some(c));
        store.delete_layer(a);
        assert_eq!(store.selected_id(), Some(c));
        store.delete_layer(c);
        assert_eq!(store.selected_id(), None);
        assert_eq!(store.len(), 1);
        assert_eq!(store.layers()[0].id, b);
    }

    #[test]
    fn unknown_ids_are_noops() {
        let (mut store, _) = store_with_three();
        let ghost = LayerId::new();
        let rev = store.revision();
        store.update_layer(ghost, &LayerPatch::position(1.0, 1.0));
        assert!(store.delete_layer(ghost).is_none());
        assert!(store.duplicate_layer(ghost).is_none());
        store.select(Some(ghost));
        assert_eq!(store.revision(), rev);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn duplicate_then_delete_original() {
        let mut store = LayerStore::default();
        let original_id = store.add_text_layer("caption", Rgb::WHITE, None);
        store.set_position(original_id, 100.0, 200.0);
        let original = store.layer(original_id).unwrap().clone();

        let dup = store.duplicate_layer(original_id).unwrap();
        assert_eq!(store.selected_id(), Some(dup));
        assert_eq!(store.layers().last().unwrap().id, dup);
        store.delete_layer(original_id);

        assert_eq!(store.len(), 1);
        let copy = &store.layers()[0];
        assert_eq!(copy.id, dup);
        assert_eq!(copy.name, "Text (Copy)");
        assert_eq!((copy.x, copy.y), (120.0, 220.0));
        assert_eq!(copy.kind, original.kind);
        assert_eq!((copy.visible, copy.locked), (original.visible, original.locked));
        assert_eq!(store.selected_id(), Some(dup));
    }

    #[test]
    fn selection_is_single_and_allows_locked_layers() {
        let mut store = LayerStore::default();
        let img = store.add_image_layer(bitmap(4, 4));
        let t = store.add_text_layer("t", Rgb::WHITE, None);
        assert_eq!(store.selected_id(), Some(t));
        store.select(Some(img));
        assert_eq!(store.selected_id(), Some(img));
        store.select(None);
        assert!(store.selected_layer().is_none());
    }

    #[test]
    fn zoom_is_clamped_and_stepped() {
        let mut store = LayerStore::default();
        store.set_zoom(10.0);
        assert_eq!(store.zoom(), MAX_ZOOM);
        store.set_zoom(0.0);
        assert_eq!(store.zoom(), MIN_ZOOM);
        store.zoom_out();
        assert_eq!(store.zoom(), MIN_ZOOM);
        store.reset_zoom();
        store.zoom_in();
        store.zoom_in();
        assert!((store.zoom() - 1.2).abs() < 1e-6);
        store.set_zoom(f32::NAN);
        assert!((store.zoom() - 1.2).abs() < 1e-6);
    }

    #[test]
    fn update_preserves_variant_and_bumps_revision() {
        let mut store = LayerStore::default();
        let img = store.add_image_layer(bitmap(2, 2));
        let rev = store.revision();
        store.update_layer(
            img,
            &LayerPatch { content: Some("nope".into()), rotation: Some(45.0), ..Default::default() },
        );
        let layer = store.layer(img).unwrap();
        assert!(layer.is_image());
        assert_eq!(layer.as_image().unwrap().rotation, 45.0);
        assert!(store.revision() > rev);
    }
}
