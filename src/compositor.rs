// ============================================================================
// COMPOSITOR: flattens the layer store into one RGBA surface
// ============================================================================
//
// Surface pixels are layer units multiplied by the zoom factor. Every layer
// is drawn source-over onto an opaque black background, bottom to top.

use std::collections::HashMap;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::layer::{Bitmap, ImageFilters, ImageLayer, Layer, LayerId, LayerKind, Rgb, TextLayer};
use crate::ops::filters::{apply_filters, bitmap_blur_sigma};
use crate::ops::text::{
    CoverageMask, FontBook, MAX_DILATE_RADIUS, TextRun, blur_mask, dilate, rasterize_text,
};
use crate::store::LayerStore;

/// Outline colour of the selected layer.
pub const SELECTION_COLOR: Rgb = Rgb::new(0x3B, 0x82, 0xF6);
/// Outline thickness in surface pixels, independent of zoom.
const SELECTION_WIDTH: i32 = 2;
/// Dash pattern (on, off) for text selections, in surface pixels.
const SELECTION_DASH: (i32, i32) = (6, 4);

const SHADOW_OPACITY: f32 = 0.8;
/// Shadow blur sigma cap, in surface pixels.
const MAX_SHADOW_SIGMA: f32 = 32.0;
/// Larger em sizes are not rasterized.
const MAX_TEXT_PX: f32 = 2048.0;
/// Larger surfaces are not allocated.
const MAX_SURFACE_PIXELS: u64 = 16384 * 16384;

struct FilteredBitmap {
    source: Bitmap,
    filters: ImageFilters,
    blur_sigma: f32,
    image: Arc<RgbaImage>,
}

/// Owns the font cache and the per-layer filter cache between frames.
pub struct Compositor {
    fonts: FontBook,
    filtered: HashMap<LayerId, FilteredBitmap>,
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compositor {
    pub fn new() -> Self {
        Self::with_fonts(FontBook::new())
    }

    pub fn with_fonts(fonts: FontBook) -> Self {
        Self { fonts, filtered: HashMap::new() }
    }

    /// Surface for the canvas view: current zoom, selection outline included.
    pub fn render(&mut self, store: &LayerStore) -> RgbaImage {
        self.compose(store, store.zoom(), store.selected_id())
    }

    /// Surface for PNG export: natural size, no selection outline.
    pub fn render_for_export(&mut self, store: &LayerStore) -> RgbaImage {
        self.compose(store, 1.0, None)
    }

    /// `selected` gets its outline right after the layer itself is painted.
    fn compose(&mut self, store: &LayerStore, zoom: f32, selected: Option<LayerId>) -> RgbaImage {
        self.filtered.retain(|id, _| store.layer(*id).is_some());

        let (w, h) = surface_size(store.canvas_size(), zoom);
        let mut surface = RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255]));

        for layer in store.layers().iter().filter(|l| l.visible) {
            match &layer.kind {
                LayerKind::Image(img) => {
                    if let Some(bitmap) = self.filtered_bitmap(layer.id, img) {
                        draw_image(&mut surface, &bitmap, layer, img, zoom);
                    }
                }
                LayerKind::Text(text) => self.draw_text(&mut surface, layer, text, zoom),
            }
            if selected == Some(layer.id) {
                draw_selection(&mut surface, layer, zoom);
            }
        }
        surface
    }

    /// The layer's bitmap with its filters applied. The last result is reused
    /// until the bitmap or its filter inputs change.
    fn filtered_bitmap(&mut self, id: LayerId, img: &ImageLayer) -> Option<Arc<RgbaImage>> {
        let source = img.bitmap.as_ref()?;
        let blur_sigma = bitmap_blur_sigma(img.filters.blur, img.scale);
        if let Some(hit) = self.filtered.get(&id)
            && hit.source == *source
            && hit.filters == img.filters
            && hit.blur_sigma == blur_sigma
        {
            return Some(Arc::clone(&hit.image));
        }
        let image = Arc::new(apply_filters(source.image(), &img.filters, blur_sigma));
        self.filtered.insert(
            id,
            FilteredBitmap {
                source: source.clone(),
                filters: img.filters,
                blur_sigma,
                image: Arc::clone(&image),
            },
        );
        Some(image)
    }

    fn draw_text(&mut self, surface: &mut RgbaImage, layer: &Layer, text: &TextLayer, zoom: f32) {
        let size = text.font_size * zoom;
        let line_step = text.line_step() * zoom;
        if !(size > 0.0 && size <= MAX_TEXT_PX) || !line_step.is_finite() {
            return;
        }
        let (ox, oy) = (layer.x * zoom, layer.y * zoom);
        if !ox.is_finite() || !oy.is_finite() {
            return;
        }
        let Some(face) = self.fonts.resolve(&text.font_family, text.bold, text.italic) else {
            return;
        };

        let stroke = positive(text.stroke_width).map(|w| w * zoom / 2.0);
        let shadow = positive(text.shadow_blur).map(|b| (b * zoom / 2.0).min(MAX_SHADOW_SIGMA));
        let pad = stroke.map_or(0.0, |r| r.min(MAX_DILATE_RADIUS))
            + shadow.map_or(0.0, |s| s * 3.0 + zoom)
            + 2.0;
        let margin = pad.ceil() as i32;

        let lines: Vec<&str> = text.lines().collect();
        let run = TextRun {
            lines: &lines,
            size,
            line_step,
            origin: (ox, oy),
            clip: Some((-margin, -margin, surface.width() as i32 + margin, surface.height() as i32 + margin)),
        };
        let mask = rasterize_text(&face, &run, pad);
        if mask.is_empty() {
            return;
        }

        if let Some(radius) = stroke {
            paint_mask(surface, &dilate(&mask, radius), text.stroke_color, 1.0, (0, 0));
        }
        if let Some(sigma) = shadow {
            let offset = zoom.round() as i32;
            paint_mask(surface, &blur_mask(&mask, sigma), Rgb::BLACK, SHADOW_OPACITY, (offset, offset));
        }
        paint_mask(surface, &mask, text.color, 1.0, (0, 0));
    }
}

fn positive(v: f32) -> Option<f32> {
    (v.is_finite() && v > 0.0).then_some(v)
}

/// `ceil(w * zoom) x ceil(h * zoom)`, collapsed to 0x0 when unreasonable.
pub fn surface_size((w, h): (u32, u32), zoom: f32) -> (u32, u32) {
    let sw = (w as f32 * zoom).ceil();
    let sh = (h as f32 * zoom).ceil();
    if !(sw >= 0.0 && sh >= 0.0) || (sw as u64).saturating_mul(sh as u64) > MAX_SURFACE_PIXELS {
        log::warn!("Surface {}x{} at zoom {} is out of range", w, h, zoom);
        return (0, 0);
    }
    (sw as u32, sh as u32)
}

// ---------------------------------------------------------------------------
//  Image layers
// ---------------------------------------------------------------------------

/// Draw a (filtered) bitmap scaled into its layer box and rotated about the
/// box centre, by inverse-mapping each covered surface pixel.
fn draw_image(surface: &mut RgbaImage, src: &RgbaImage, layer: &Layer, img: &ImageLayer, zoom: f32) {
    let (bw, bh) = img.scaled_size();
    if !(bw > 0.0 && bh > 0.0) || !bw.is_finite() || !bh.is_finite() {
        return;
    }
    if src.width() == 0 || src.height() == 0 || !layer.x.is_finite() || !layer.y.is_finite() {
        return;
    }
    let angle = if img.rotation.is_finite() { img.rotation.to_radians() } else { 0.0 };
    let (sin, cos) = angle.sin_cos();

    // Box centre and half extents in surface pixels.
    let cx = (layer.x + bw / 2.0) * zoom;
    let cy = (layer.y + bh / 2.0) * zoom;
    let (hw, hh) = (bw * zoom / 2.0, bh * zoom / 2.0);

    let ex = hw * cos.abs() + hh * sin.abs();
    let ey = hw * sin.abs() + hh * cos.abs();
    let (sw, sh) = (surface.width() as f32, surface.height() as f32);
    let x_start = (cx - ex).floor().clamp(0.0, sw) as usize;
    let x_end = (cx + ex).ceil().clamp(0.0, sw) as usize;
    let y_start = (cy - ey).floor().clamp(0.0, sh) as usize;
    let y_end = (cy + ey).ceil().clamp(0.0, sh) as usize;
    if x_start >= x_end || y_start >= y_end {
        return;
    }

    // Surface offset from centre -> bitmap pixel coordinates.
    let sx_per = src.width() as f32 / (hw * 2.0);
    let sy_per = src.height() as f32 / (hh * 2.0);

    let stride = surface.width() as usize * 4;
    let data: &mut [u8] = &mut **surface;
    data.par_chunks_mut(stride)
        .enumerate()
        .skip(y_start)
        .take(y_end - y_start)
        .for_each(|(y, row)| {
            let dy = y as f32 + 0.5 - cy;
            for x in x_start..x_end {
                let dx = x as f32 + 0.5 - cx;
                // Undo the rotation.
                let u = dx * cos + dy * sin + hw;
                let v = -dx * sin + dy * cos + hh;
                if u < 0.0 || v < 0.0 || u > hw * 2.0 || v > hh * 2.0 {
                    continue;
                }
                let p = bilinear_sample(src, u * sx_per - 0.5, v * sy_per - 0.5);
                if p[3] > 0 {
                    let o = x * 4;
                    blend_over(&mut row[o..o + 4], [p[0], p[1], p[2]], p[3] as f32 / 255.0);
                }
            }
        });
}

/// Edge-clamped bilinear sample.
fn bilinear_sample(img: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let max_x = img.width() as i32 - 1;
    let max_y = img.height() as i32 - 1;
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let sample = |sx: i32, sy: i32| -> [f32; 4] {
        let p = img.get_pixel(sx.clamp(0, max_x) as u32, sy.clamp(0, max_y) as u32);
        [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
    };

    let tl = sample(x0, y0);
    let tr = sample(x0 + 1, y0);
    let bl = sample(x0, y0 + 1);
    let br = sample(x0 + 1, y0 + 1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = lerp(tl[c], tr[c], fx);
        let bot = lerp(bl[c], br[c], fx);
        out[c] = lerp(top, bot, fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

// ---------------------------------------------------------------------------
//  Blending
// ---------------------------------------------------------------------------

/// Source-over of a straight-alpha colour onto one RGBA pixel.
fn blend_over(dst: &mut [u8], src: [u8; 3], alpha: f32) {
    let a = alpha.clamp(0.0, 1.0);
    if a <= 0.0 {
        return;
    }
    if a >= 1.0 {
        dst[..3].copy_from_slice(&src);
        dst[3] = 255;
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = a + da * (1.0 - a);
    for c in 0..3 {
        let v = (src[c] as f32 * a + dst[c] as f32 * da * (1.0 - a)) / out_a;
        dst[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round() as u8;
}

/// Fill `color` through a coverage mask shifted by `offset` surface pixels.
fn paint_mask(surface: &mut RgbaImage, mask: &CoverageMask, color: Rgb, opacity: f32, offset: (i32, i32)) {
    if mask.is_empty() {
        return;
    }
    let (sw, sh) = (surface.width() as i32, surface.height() as i32);
    let ox = mask.x0.saturating_add(offset.0);
    let oy = mask.y0.saturating_add(offset.1);
    let x_start = ox.max(0);
    let x_end = ox.saturating_add(mask.width as i32).min(sw);
    let y_start = oy.max(0);
    let y_end = oy.saturating_add(mask.height as i32).min(sh);
    if x_start >= x_end || y_start >= y_end {
        return;
    }

    let rgb = color.to_array();
    let stride = sw as usize * 4;
    let data: &mut [u8] = &mut **surface;
    data.par_chunks_mut(stride)
        .enumerate()
        .skip(y_start as usize)
        .take((y_end - y_start) as usize)
        .for_each(|(y, row)| {
            let my = (y as i32 - oy) as u32;
            for x in x_start..x_end {
                let cov = mask.get((x - ox) as u32, my) * opacity;
                if cov > 0.0 {
                    let o = x as usize * 4;
                    blend_over(&mut row[o..o + 4], rgb, cov);
                }
            }
        });
}

// ---------------------------------------------------------------------------
//  Selection outline
// ---------------------------------------------------------------------------

/// Outline the layer's bounds: dashed for text, solid for images. The
/// band is centred on the rectangle edge.
fn draw_selection(surface: &mut RgbaImage, layer: &Layer, zoom: f32) {
    let b = layer.bounds();
    let left = (b.x * zoom).round();
    let top = (b.y * zoom).round();
    let right = ((b.x + b.w) * zoom).round();
    let bottom = ((b.y + b.h) * zoom).round();
    if ![left, top, right, bottom].iter().all(|v| v.is_finite() && v.abs() < 1e7) {
        return;
    }
    let (l, t, r, btm) = (left as i32, top as i32, right as i32, bottom as i32);
    let dashed = layer.is_text();
    let half = SELECTION_WIDTH / 2;
    let color = SELECTION_COLOR.to_array();
    let (sw, sh) = (surface.width() as i32, surface.height() as i32);

    let on_dash = |along: i32| {
        !dashed || along.rem_euclid(SELECTION_DASH.0 + SELECTION_DASH.1) < SELECTION_DASH.0
    };
    let mut put = |x: i32, y: i32| {
        if x >= 0 && y >= 0 && x < sw && y < sh {
            surface.put_pixel(x as u32, y as u32, Rgba([color[0], color[1], color[2], 255]));
        }
    };

    for x in (l - half).max(-1)..=(r + half).min(sw) {
        if !on_dash(x - l) {
            continue;
        }
        for d in -half..SELECTION_WIDTH - half {
            put(x, t + d);
            put(x, btm + d);
        }
    }
    for y in (t - half).max(-1)..=(btm + half).min(sh) {
        if !on_dash(y - t) {
            continue;
        }
        for d in -half..SELECTION_WIDTH - half {
            put(l + d, y);
            put(r + d, y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LayerPatch;

    fn compositor() -> Compositor {
        Compositor::with_fonts(FontBook::bundled_only())
    }

    fn solid(w: u32, h: u32, c: [u8; 4]) -> Bitmap {
        Bitmap::new(RgbaImage::from_pixel(w, h, Rgba(c)))
    }

    #[test]
    fn empty_store_is_black_at_zoomed_size() {
        let mut store = LayerStore::new(10, 5);
        store.set_zoom(1.5);
        let out = compositor().render(&store);
        assert_eq!(out.dimensions(), (15, 8));
        assert!(out.pixels().all(|p| p.0 == [0, 0, 0, 255]));
    }

    #[test]
    fn later_layers_paint_over_earlier_ones() {
        let mut store = LayerStore::new(8, 8);
        store.add_image_layer(solid(8, 8, [255, 0, 0, 255]));
        let green = store.add_image_layer(solid(8, 8, [0, 255, 0, 255]));
        // Image layers insert at the bottom: red now sits above green.
        assert_eq!(store.index_of(green), Some(0));
        let out = compositor().render_for_export(&store);
        assert_eq!(out.get_pixel(4, 4).0, [255, 0, 0, 255]);

        store.reorder(0, 1);
        let out = compositor().render_for_export(&store);
        assert_eq!(out.get_pixel(4, 4).0, [0, 255, 0, 255]);
    }

    #[test]
    fn invisible_layers_are_skipped() {
        let mut store = LayerStore::new(4, 4);
        let id = store.add_image_layer(solid(4, 4, [200, 200, 200, 255]));
        store.update_layer(id, &LayerPatch { visible: Some(false), ..Default::default() });
        let out = compositor().render(&store);
        assert!(out.pixels().all(|p| p.0 == [0, 0, 0, 255]));
    }

    #[test]
    fn image_is_scaled_into_its_box() {
        let mut store = LayerStore::new(4, 4);
        let id = store.add_image_layer(solid(4, 4, [255, 255, 255, 255]));
        store.update_layer(id, &LayerPatch { scale: Some(0.5), ..Default::default() });
        let out = compositor().render_for_export(&store);
        assert_eq!(out.get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_eq!(out.get_pixel(1, 1).0, [255, 255, 255, 255]);
        assert_eq!(out.get_pixel(3, 3).0, [0, 0, 0, 255]);
    }

    #[test]
    fn unloaded_bitmap_is_not_drawn() {
        let pending = ImageLayer { bitmap: None, ..ImageLayer::from_bitmap(solid(4, 4, [255; 4])) };
        let mut c = compositor();
        assert!(c.filtered_bitmap(LayerId::new(), &pending).is_none());
        assert!(c.filtered.is_empty());
    }

    #[test]
    fn filtered_bitmap_is_cached_until_filters_change() {
        let mut store = LayerStore::new(2, 2);
        let id = store.add_image_layer(solid(2, 2, [100, 100, 100, 255]));
        let mut c = compositor();
        let img = store.layer(id).unwrap().as_image().unwrap().clone();
        let a = c.filtered_bitmap(id, &img).unwrap();
        let b = c.filtered_bitmap(id, &img).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let mut brighter = img.clone();
        brighter.filters.brightness = 200.0;
        let d = c.filtered_bitmap(id, &brighter).unwrap();
        assert!(!Arc::ptr_eq(&a, &d));
        assert_eq!(d.get_pixel(0, 0).0, [200, 200, 200, 255]);

        store.delete_layer(id);
        c.render(&store);
        assert!(c.filtered.is_empty());
    }

    #[test]
    fn text_paints_fill_and_stroke() {
        let mut store = LayerStore::new(200, 60);
        store.add_text_layer("Hello", Rgb::new(255, 0, 0), Some(10.0));
        let out = compositor().render_for_export(&store);
        assert!(out.pixels().any(|p| p.0[0] > 200 && p.0[1] < 50));
        // nothing outside the text block
        assert_eq!(out.get_pixel(199, 59).0, [0, 0, 0, 255]);
    }

    #[test]
    fn selection_outline_only_in_view_render() {
        let mut store = LayerStore::new(40, 40);
        let id = store.add_image_layer(solid(20, 20, [0, 0, 0, 255]));
        store.set_canvas_size(40, 40);
        store.select(Some(id));
        let mut c = compositor();
        let view = c.render(&store);
        let blue = [SELECTION_COLOR.r, SELECTION_COLOR.g, SELECTION_COLOR.b, 255];
        assert_eq!(view.get_pixel(10, 20).0, blue);
        assert_eq!(view.get_pixel(20, 10).0, blue);
        let export = c.render_for_export(&store);
        assert!(export.pixels().all(|p| p.0 != blue));
    }

    #[test]
    fn hidden_selected_layer_has_no_outline() {
        let mut store = LayerStore::new(40, 40);
        let id = store.add_image_layer(solid(20, 20, [0, 0, 0, 255]));
        store.set_canvas_size(40, 40);
        store.select(Some(id));
        store.update_layer(id, &LayerPatch { visible: Some(false), ..Default::default() });
        let view = compositor().render(&store);
        let blue = [SELECTION_COLOR.r, SELECTION_COLOR.g, SELECTION_COLOR.b, 255];
        assert!(view.pixels().all(|p| p.0 != blue));
    }

    #[test]
    fn layers_above_cover_the_selection_outline() {
        let mut store = LayerStore::new(40, 40);
        store.add_image_layer(solid(40, 40, [255, 0, 0, 255]));
        // image layers insert at the bottom, so this one sits under the red one
        let below = store.add_image_layer(solid(20, 20, [0, 0, 0, 255]));
        store.set_canvas_size(40, 40);
        store.select(Some(below));
        let view = compositor().render(&store);
        assert_eq!(view.get_pixel(10, 20).0, [255, 0, 0, 255]);
        assert_eq!(view.get_pixel(20, 10).0, [255, 0, 0, 255]);
    }

    #[test]
    fn text_selection_outline_is_dashed() {
        let mut store = LayerStore::new(200, 60);
        let id = store.add_text_layer("Hello", Rgb::WHITE, Some(10.0));
        assert_eq!(store.selected_id(), Some(id));
        let b = store.layer(id).unwrap().bounds();
        assert_eq!((b.x, b.y), (20.0, 10.0));

        let view = compositor().render(&store);
        let blue = [SELECTION_COLOR.r, SELECTION_COLOR.g, SELECTION_COLOR.b, 255];
        // top edge band covers rows 9 and 10; dashes are 6 on, 4 off from x = 20
        for row in [9, 10] {
            assert_eq!(view.get_pixel(22, row).0, blue);
            assert_eq!(view.get_pixel(25, row).0, blue);
            assert_ne!(view.get_pixel(26, row).0, blue);
            assert_ne!(view.get_pixel(29, row).0, blue);
            assert_eq!(view.get_pixel(30, row).0, blue);
        }
    }

    #[test]
    fn blur_is_measured_in_canvas_pixels() {
        let mut store = LayerStore::new(8, 8);
        let id = store.add_image_layer(solid(8, 8, [100, 100, 100, 255]));
        store.update_layer(id, &LayerPatch { blur: Some(2.0), ..Default::default() });
        let mut c = compositor();
        let img = store.layer(id).unwrap().as_image().unwrap().clone();
        let a = c.filtered_bitmap(id, &img).unwrap();
        assert_eq!(c.filtered[&id].blur_sigma, 2.0);

        let half = ImageLayer { scale: 0.5, ..img.clone() };
        let b = c.filtered_bitmap(id, &half).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(c.filtered[&id].blur_sigma, 4.0);

        // without blur the scale does not matter to the cache
        let sharp = ImageLayer { filters: ImageFilters::default(), ..img };
        let d = c.filtered_bitmap(id, &sharp).unwrap();
        let e = c.filtered_bitmap(id, &ImageLayer { scale: 3.0, ..sharp }).unwrap();
        assert!(Arc::ptr_eq(&d, &e));
    }

    #[test]
    fn out_of_range_values_do_not_panic() {
        let mut store = LayerStore::new(16, 16);
        let img = store.add_image_layer(solid(16, 16, [10, 20, 30, 255]));
        let text = store.add_text_layer("wild\nvalues", Rgb::WHITE, None);
        store.update_layer(
            img,
            &LayerPatch {
                scale: Some(-3.0),
                rotation: Some(f32::NAN),
                blur: Some(1e6),
                brightness: Some(-100.0),
                ..Default::default()
            },
        );
        store.update_layer(
            text,
            &LayerPatch {
                font_size: Some(1e9),
                stroke_width: Some(f32::INFINITY),
                shadow_blur: Some(-4.0),
                line_height: Some(f32::NAN),
                x: Some(-1e30),
                ..Default::default()
            },
        );
        store.set_zoom(3.0);
        let out = compositor().render(&store);
        assert_eq!(out.dimensions(), (48, 48));

        store.reset_zoom();
        store.update_layer(
            text,
            &LayerPatch {
                font_size: Some(12.0),
                line_height: Some(1.0),
                x: Some(0.0),
                stroke_width: Some(500.0),
                shadow_blur: Some(300.0),
                ..Default::default()
            },
        );
        let out = compositor().render(&store);
        assert_eq!(out.dimensions(), (16, 16));
    }

    #[test]
    fn rotated_image_keeps_its_centre() {
        let mut store = LayerStore::new(10, 10);
        let id = store.add_image_layer(solid(10, 4, [255, 255, 255, 255]));
        store.set_canvas_size(10, 10);
        store.update_layer(id, &LayerPatch { rotation: Some(90.0), y: Some(3.0), ..Default::default() });
        let out = compositor().render_for_export(&store);
        // 10x4 box centred at (5, 5), turned upright: 4 wide, 10 tall
        assert_eq!(out.get_pixel(5, 1).0, [255, 255, 255, 255]);
        assert_eq!(out.get_pixel(1, 5).0, [0, 0, 0, 255]);
    }
}
