use ab_glyph::{Font, FontArc, GlyphId, PxScale, ScaleFont, point};
use rayon::prelude::*;
use std::collections::{HashMap, VecDeque};

use crate::ops::filters::build_gaussian_kernel;

/// Horizontal shear applied when an italic face has to be synthesized.
const SYNTHETIC_ITALIC_SHEAR: f32 = 0.2;

/// Family names commonly offered in the font picker.
pub const COMMON_FAMILIES: &[&str] = &[
    "Arial",
    "Verdana",
    "Tahoma",
    "Trebuchet MS",
    "Times New Roman",
    "Georgia",
    "Courier New",
    "DejaVu Sans",
    "Liberation Sans",
];

/// A loaded face plus the styling the face itself could not provide.
#[derive(Clone)]
pub struct FontFace {
    pub font: FontArc,
    pub synthetic_bold: bool,
    pub synthetic_italic: bool,
}

/// Resolves (family, bold, italic) to a face, caching lookups.
/// Misses fall back to the sans face bundled with egui, with bold/italic
/// synthesized.
pub struct FontBook {
    cache: HashMap<(String, bool, bool), Option<FontFace>>,
    fallback: Option<FontArc>,
    use_system_fonts: bool,
}

impl Default for FontBook {
    fn default() -> Self {
        Self::new()
    }
}

impl FontBook {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
            fallback: bundled_font(),
            use_system_fonts: true,
        }
    }

    /// Only the bundled face; results don't depend on installed fonts.
    pub fn bundled_only() -> Self {
        Self {
            use_system_fonts: false,
            ..Self::new()
        }
    }

    pub fn resolve(&mut self, family: &str, bold: bool, italic: bool) -> Option<FontFace> {
        let key = (family.to_string(), bold, italic);
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }
        let system = if self.use_system_fonts {
            load_system_font(family, if bold { 700 } else { 400 }, italic)
        } else {
            None
        };
        let face = match system {
            Some(font) => Some(FontFace { font, synthetic_bold: false, synthetic_italic: false }),
            None => {
                if self.use_system_fonts {
                    log::warn!("Font '{}' not found, using bundled fallback", family);
                }
                self.fallback.clone().map(|font| FontFace {
                    font,
                    synthetic_bold: bold,
                    synthetic_italic: italic,
                })
            }
        };
        if face.is_none() {
            log::error!("No usable font for '{}'", family);
        }
        self.cache.insert(key, face.clone());
        face
    }
}

/// The proportional face egui ships with its default font definitions.
fn bundled_font() -> Option<FontArc> {
    let defs = egui::FontDefinitions::default();
    let data = ["Ubuntu-Light", "Hack"]
        .iter()
        .find_map(|name| defs.font_data.get(*name))
        .or_else(|| defs.font_data.values().next())?;
    FontArc::try_from_vec(data.font.to_vec()).ok()
}

/// Load a font by family name, weight, and style from the system.
/// `weight` is a CSS-style weight value (100=Thin, 400=Regular, 700=Bold, etc.)
/// Returns None if the font cannot be found.
pub fn load_system_font(family: &str, weight: u16, italic: bool) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::{Properties, Style, Weight};
    use font_kit::source::SystemSource;

    let mut props = Properties::new();
    props.weight = Weight(weight as f32);
    if italic {
        props.style = Style::Italic;
    }

    let handle = SystemSource::new()
        .select_best_match(&[FamilyName::Title(family.to_string())], &props)
        .ok()?;
    let font_data = handle.load().ok()?;
    let bytes: Vec<u8> = (*font_data.copy_font_data()?).clone();
    FontArc::try_from_vec(bytes).ok()
}

/// Scale so that one em equals `px` pixels (CSS font-size semantics).
pub fn em_scale(font: &FontArc, px: f32) -> PxScale {
    match font.units_per_em() {
        Some(upem) if upem > 0.0 => PxScale::from(px * font.height_unscaled() / upem),
        _ => PxScale::from(px),
    }
}

/// Lay out one line left-aligned at x = 0: `(glyph, pen_x)` pairs and the advance width.
pub fn layout_line(font: &FontArc, text: &str, scale: PxScale) -> (Vec<(GlyphId, f32)>, f32) {
    let scaled = font.as_scaled(scale);
    let mut glyphs = Vec::with_capacity(text.len());
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }
    (glyphs, cursor_x)
}

/// Single-channel coverage (0..=1) positioned at (`x0`, `y0`) in surface pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct CoverageMask {
    pub x0: i32,
    pub y0: i32,
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl CoverageMask {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[(y * self.width + x) as usize]
    }

    fn empty() -> Self {
        Self { x0: 0, y0: 0, width: 0, height: 0, data: Vec::new() }
    }
}

/// Parameters of one text block in surface pixels.
pub struct TextRun<'a> {
    pub lines: &'a [&'a str],
    /// Em size in pixels.
    pub size: f32,
    /// Distance between consecutive line tops.
    pub line_step: f32,
    /// Top-left of the first line's em box.
    pub origin: (f32, f32),
    /// Optional `(x0, y0, x1, y1)` limit for the mask, in surface pixels.
    pub clip: Option<(i32, i32, i32, i32)>,
}

/// Rasterize a text block into a coverage mask, padded by `pad` pixels on
/// every side so strokes and shadows have room.
pub fn rasterize_text(face: &FontFace, run: &TextRun<'_>, pad: f32) -> CoverageMask {
    let font = &face.font;
    let scale = em_scale(font, run.size);
    let ascent = font.as_scaled(scale).ascent();

    // Glyphs positioned in surface space, baseline = line top + ascent.
    let mut outlined = Vec::new();
    for (i, line) in run.lines.iter().enumerate() {
        let baseline = run.origin.1 + i as f32 * run.line_step + ascent;
        let (glyphs, _) = layout_line(font, line, scale);
        for (id, pen_x) in glyphs {
            let glyph = id.with_scale_and_position(scale, point(run.origin.0 + pen_x, baseline));
            if let Some(o) = font.outline_glyph(glyph) {
                outlined.push((o, baseline));
            }
        }
    }
    if outlined.is_empty() {
        return CoverageMask::empty();
    }

    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for (o, _) in &outlined {
        let b = o.px_bounds();
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }
    let extra_x = if face.synthetic_italic { (max_y - min_y) * SYNTHETIC_ITALIC_SHEAR } else { 0.0 };
    let extra_bold = if face.synthetic_bold { (run.size / 24.0).max(1.0) } else { 0.0 };

    let mut x0 = (min_x - pad - extra_x).floor() as i32;
    let mut y0 = (min_y - pad).floor() as i32;
    let mut x1 = (max_x + pad + extra_x + extra_bold).ceil() as i32;
    let mut y1 = (max_y + pad).ceil() as i32;
    if let Some((cx0, cy0, cx1, cy1)) = run.clip {
        x0 = x0.max(cx0);
        y0 = y0.max(cy0);
        x1 = x1.min(cx1);
        y1 = y1.min(cy1);
    }
    let width = (x1 - x0).max(0) as u32;
    let height = (y1 - y0).max(0) as u32;
    let mut mask = CoverageMask { x0, y0, width, height, data: vec![0.0; (width * height) as usize] };

    for (o, baseline) in &outlined {
        let b = o.px_bounds();
        o.draw(|px, py, cov| {
            let cy = b.min.y + py as f32;
            let mut cx = b.min.x + px as f32;
            if face.synthetic_italic {
                cx += (baseline - cy) * SYNTHETIC_ITALIC_SHEAR;
            }
            let ix = cx.round() as i32 - x0;
            let iy = cy.round() as i32 - y0;
            if ix >= 0 && iy >= 0 && (ix as u32) < width && (iy as u32) < height {
                let idx = (iy as u32 * width + ix as u32) as usize;
                mask.data[idx] = mask.data[idx].max(cov);
            }
        });
    }

    if extra_bold > 0.0 {
        mask = smear_horizontal(&mask, extra_bold.round() as u32);
    }
    mask
}

/// Faux bold: max over `px` pixels to the right.
fn smear_horizontal(mask: &CoverageMask, px: u32) -> CoverageMask {
    let mut out = mask.clone();
    for y in 0..mask.height {
        for x in 0..mask.width {
            let mut v = mask.get(x, y);
            for d in 1..=px.min(x) {
                v = v.max(mask.get(x - d, y));
            }
            out.data[(y * mask.width + x) as usize] = v;
        }
    }
    out
}

/// Largest outline radius honoured by [`dilate`].
pub const MAX_DILATE_RADIUS: f32 = 64.0;

/// Grow the coverage outward by `radius` pixels (disc-shaped max filter).
/// This is the outline drawn under the glyph fill.
///
/// The solid part of the disc is taken as one sliding-window max per row
/// offset; only the anti-aliased rim is sampled pixel by pixel.
pub fn dilate(mask: &CoverageMask, radius: f32) -> CoverageMask {
    if mask.is_empty() || !(radius > 0.0) {
        return mask.clone();
    }
    let r = radius.min(MAX_DILATE_RADIUS);
    let ri = r.ceil() as i32;
    let inner = r - 0.5;

    // (dy, half width) of the full-weight rows.
    let spans: Vec<(i32, usize)> = (-ri..=ri)
        .filter_map(|dy| {
            let rem = inner * inner - (dy * dy) as f32;
            (inner >= 0.0 && rem >= 0.0).then(|| (dy, rem.sqrt().floor() as usize))
        })
        .collect();
    // Soft edge over the last pixel of the disc.
    let rim: Vec<(i32, i32, f32)> = (-ri..=ri)
        .flat_map(|dy| (-ri..=ri).map(move |dx| (dx, dy)))
        .filter_map(|(dx, dy)| {
            let dist = ((dx * dx + dy * dy) as f32).sqrt();
            let weight = (r + 0.5 - dist).clamp(0.0, 1.0);
            (weight > 0.0 && weight < 1.0).then_some((dx, dy, weight))
        })
        .collect();

    let (w, h) = (mask.width as i32, mask.height as i32);
    let stride = mask.width as usize;
    let mut out = mask.clone();
    out.data.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let y = y as i32;
        for &(dy, half) in &spans {
            let sy = y + dy;
            if sy >= 0 && sy < h {
                let src = &mask.data[sy as usize * stride..(sy as usize + 1) * stride];
                window_max_into(src, half, row);
            }
        }
        for (x, slot) in row.iter_mut().enumerate() {
            let x = x as i32;
            for &(dx, dy, weight) in &rim {
                let (sx, sy) = (x + dx, y + dy);
                if sx >= 0 && sy >= 0 && sx < w && sy < h {
                    *slot = slot.max(mask.data[(sy * w + sx) as usize] * weight);
                }
            }
        }
    });
    out
}

/// `out[x] = max(out[x], max(src[x - half ..= x + half]))`, edges clipped.
fn window_max_into(src: &[f32], half: usize, out: &mut [f32]) {
    let n = src.len();
    let mut window: VecDeque<usize> = VecDeque::new();
    let mut next = 0;
    for (x, slot) in out.iter_mut().enumerate().take(n) {
        let hi = (x + half).min(n - 1);
        while next <= hi {
            while window.back().is_some_and(|&b| src[b] <= src[next]) {
                window.pop_back();
            }
            window.push_back(next);
            next += 1;
        }
        let lo = x.saturating_sub(half);
        while window.front().is_some_and(|&f| f < lo) {
            window.pop_front();
        }
        if let Some(&f) = window.front() {
            *slot = slot.max(src[f]);
        }
    }
}

/// Gaussian-blurred copy of the coverage, used for drop shadows.
pub fn blur_mask(mask: &CoverageMask, sigma: f32) -> CoverageMask {
    if mask.is_empty() || !(sigma > 0.0) {
        return mask.clone();
    }
    let (w, h) = (mask.width as usize, mask.height as usize);
    let kernel = build_gaussian_kernel(sigma, w.max(h));
    let radius = kernel.len() as isize / 2;

    let mut horiz = vec![0.0f32; w * h];
    horiz.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, slot) in row.iter_mut().enumerate() {
            *slot = kernel
                .iter()
                .enumerate()
                .map(|(k, kv)| {
                    let sx = x as isize + k as isize - radius;
                    if sx < 0 || sx >= w as isize { 0.0 } else { mask.data[y * w + sx as usize] * kv }
                })
                .sum();
        }
    });

    let mut out = mask.clone();
    out.data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, slot) in row.iter_mut().enumerate() {
            *slot = kernel
                .iter()
                .enumerate()
                .map(|(k, kv)| {
                    let sy = y as isize + k as isize - radius;
                    if sy < 0 || sy >= h as isize { 0.0 } else { horiz[sy as usize * w + x] * kv }
                })
                .sum();
        }
    });
    out
}

/// Enumerate system font families (family names only, no weight variants).
/// Returns a sorted, deduplicated list of font family names.
pub fn enumerate_system_fonts() -> Vec<String> {
    match font_kit::source::SystemSource::new().all_families() {
        Ok(mut families) => {
            families.sort();
            families.dedup();
            families
        }
        Err(e) => {
            log::warn!("Could not enumerate system fonts: {:?}", e);
            COMMON_FAMILIES.iter().map(|s| s.to_string()).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face() -> FontFace {
        FontBook::bundled_only()
            .resolve("Arial", false, false)
            .expect("egui bundles a default font")
    }

    fn single_pixel(w: u32, h: u32, x: u32, y: u32) -> CoverageMask {
        let mut data = vec![0.0; (w * h) as usize];
        data[(y * w + x) as usize] = 1.0;
        CoverageMask { x0: 0, y0: 0, width: w, height: h, data }
    }

    #[test]
    fn bundled_face_synthesizes_styles() {
        let mut book = FontBook::bundled_only();
        let f = book.resolve("Whatever", true, true).unwrap();
        assert!(f.synthetic_bold && f.synthetic_italic);
    }

    #[test]
    fn text_mask_sits_below_the_origin() {
        let lines = ["Hi"];
        let run = TextRun { lines: &lines, size: 20.0, line_step: 24.0, origin: (10.0, 30.0), clip: None };
        let mask = rasterize_text(&face(), &run, 0.0);
        assert!(!mask.is_empty());
        assert!(mask.x0 >= 9);
        assert!(mask.y0 >= 29);
        assert!(mask.data.iter().any(|&c| c > 0.5));
    }

    #[test]
    fn more_lines_make_a_taller_mask() {
        let one = ["Ab"];
        let two = ["Ab", "Ab"];
        let f = face();
        let a = rasterize_text(&f, &TextRun { lines: &one, size: 16.0, line_step: 20.0, origin: (0.0, 0.0), clip: None }, 0.0);
        let b = rasterize_text(&f, &TextRun { lines: &two, size: 16.0, line_step: 20.0, origin: (0.0, 0.0), clip: None }, 0.0);
        assert!(b.height >= a.height + 19);
    }

    #[test]
    fn whitespace_only_text_is_empty() {
        let lines = ["   ", ""];
        let run = TextRun { lines: &lines, size: 14.0, line_step: 16.0, origin: (0.0, 0.0), clip: None };
        assert!(rasterize_text(&face(), &run, 4.0).is_empty());
    }

    #[test]
    fn dilate_grows_a_point_into_a_disc() {
        let mask = single_pixel(9, 9, 4, 4);
        let grown = dilate(&mask, 2.0);
        assert_eq!(grown.get(4, 4), 1.0);
        assert_eq!(grown.get(5, 4), 1.0);
        // last ring is anti-aliased
        assert_eq!(grown.get(6, 4), 0.5);
        assert_eq!(grown.get(4, 2), 0.5);
        assert_eq!(grown.get(0, 0), 0.0);
        assert_eq!(dilate(&mask, -1.0), mask);
    }

    #[test]
    fn window_max_clips_at_edges() {
        let src = [0.0, 0.3, 0.0, 0.0, 0.9, 0.1];
        let mut out = [0.0; 6];
        window_max_into(&src, 1, &mut out);
        assert_eq!(out, [0.3, 0.3, 0.3, 0.9, 0.9, 0.9]);
    }

    #[test]
    fn blur_mask_preserves_mass_away_from_edges() {
        let mask = single_pixel(21, 21, 10, 10);
        let blurred = blur_mask(&mask, 1.5);
        let total: f32 = blurred.data.iter().sum();
        assert!((total - 1.0).abs() < 1e-3);
        assert!(blurred.get(10, 10) < 1.0);
        assert!(blurred.get(11, 10) > 0.0);
    }

    #[test]
    fn layout_advances_monotonically() {
        let f = face().font;
        let scale = em_scale(&f, 14.0);
        let (glyphs, width) = layout_line(&f, "abc", scale);
        assert_eq!(glyphs.len(), 3);
        assert!(glyphs[1].1 > glyphs[0].1);
        assert!(width > glyphs[2].1);
    }
}
