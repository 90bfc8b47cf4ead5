// ============================================================================
// LAYER MODEL: tagged Image/Text layers, colours, filters, partial updates
// ============================================================================

use std::fmt;
use std::sync::Arc;

use image::RgbaImage;
use uuid::Uuid;

/// Fraction of the font size used as the average glyph advance when a text
/// block's width has to be estimated without measuring glyphs.
pub const APPROX_CHAR_WIDTH: f32 = 0.6;

/// Stable identifier of a layer for as long as the layer exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayerId(Uuid);

impl LayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque sRGB colour, written as `#RRGGBB`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(0xFF, 0xFF, 0xFF);
    pub const BLACK: Rgb = Rgb::new(0x00, 0x00, 0x00);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` (the leading `#` is optional, case-insensitive).
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.trim().strip_prefix('#').unwrap_or(s.trim());
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    pub fn from_array(c: [u8; 3]) -> Self {
        Self::new(c[0], c[1], c[2])
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Shared handle to decoded pixels. Equality is identity: two handles are
/// equal when they point at the same decoded bitmap.
#[derive(Clone)]
pub struct Bitmap(Arc<RgbaImage>);

impl Bitmap {
    pub fn new(image: RgbaImage) -> Self {
        Self(Arc::new(image))
    }

    pub fn image(&self) -> &RgbaImage {
        &self.0
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }
}

impl PartialEq for Bitmap {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bitmap({}x{})", self.width(), self.height())
    }
}

/// Compositing filters for image layers, in CSS filter units.
/// Percentages are neutral at 100, blur (pixels) is neutral at 0.
/// Values are never clamped here; the renderer copes with anything.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageFilters {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub blur: f32,
}

impl Default for ImageFilters {
    fn default() -> Self {
        Self {
            brightness: 100.0,
            contrast: 100.0,
            saturation: 100.0,
            blur: 0.0,
        }
    }
}

impl ImageFilters {
    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImageLayer {
    /// `None` until the decode completes; such layers are not drawn.
    pub bitmap: Option<Bitmap>,
    pub width: u32,
    pub height: u32,
    pub scale: f32,
    /// Degrees, about the centre of the scaled bounding box.
    pub rotation: f32,
    pub filters: ImageFilters,
}

impl ImageLayer {
    pub fn from_bitmap(bitmap: Bitmap) -> Self {
        Self {
            width: bitmap.width(),
            height: bitmap.height(),
            bitmap: Some(bitmap),
            scale: 1.0,
            rotation: 0.0,
            filters: ImageFilters::default(),
        }
    }

    pub fn scaled_size(&self) -> (f32, f32) {
        (self.width as f32 * self.scale, self.height as f32 * self.scale)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextLayer {
    pub content: String,
    pub font_size: f32,
    pub font_family: String,
    pub color: Rgb,
    pub stroke_color: Rgb,
    pub stroke_width: f32,
    pub shadow_blur: f32,
    pub line_height: f32,
    pub bold: bool,
    pub italic: bool,
}

impl TextLayer {
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.content.split('\n')
    }

    pub fn line_count(&self) -> usize {
        self.lines().count()
    }

    /// Vertical advance from one line to the next.
    pub fn line_step(&self) -> f32 {
        self.font_size * self.line_height
    }

    /// Estimated block size from character counts, not glyph metrics.
    pub fn approx_size(&self) -> (f32, f32) {
        let widest = self.lines().map(|l| l.chars().count()).max().unwrap_or(0);
        let w = widest as f32 * self.font_size * APPROX_CHAR_WIDTH;
        let h = self.line_count() as f32 * self.line_step();
        (w, h)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LayerKind {
    Image(ImageLayer),
    Text(TextLayer),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
    pub locked: bool,
    pub x: f32,
    pub y: f32,
    pub kind: LayerKind,
}

/// Axis-aligned rectangle in layer space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl LayerRect {
    /// Inclusive on all edges.
    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px <= self.x + self.w && py >= self.y && py <= self.y + self.h
    }
}

impl Layer {
    pub fn is_text(&self) -> bool {
        matches!(self.kind, LayerKind::Text(_))
    }

    pub fn is_image(&self) -> bool {
        matches!(self.kind, LayerKind::Image(_))
    }

    pub fn as_text(&self) -> Option<&TextLayer> {
        match &self.kind {
            LayerKind::Text(t) => Some(t),
            LayerKind::Image(_) => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageLayer> {
        match &self.kind {
            LayerKind::Image(img) => Some(img),
            LayerKind::Text(_) => None,
        }
    }

    /// The rectangle used for hit testing and the selection outline.
    /// Image rotation is not reflected here.
    pub fn bounds(&self) -> LayerRect {
        let (w, h) = match &self.kind {
            LayerKind::Image(img) => img.scaled_size(),
            LayerKind::Text(text) => text.approx_size(),
        };
        LayerRect { x: self.x, y: self.y, w, h }
    }
}

/// A partial update of a layer. Only `Some` fields are written; fields that
/// belong to the other variant are skipped so the discriminant never changes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerPatch {
    pub name: Option<String>,
    pub visible: Option<bool>,
    pub locked: Option<bool>,
    pub x: Option<f32>,
    pub y: Option<f32>,

    // Image
    pub scale: Option<f32>,
    pub rotation: Option<f32>,
    pub brightness: Option<f32>,
    pub contrast: Option<f32>,
    pub saturation: Option<f32>,
    pub blur: Option<f32>,

    // Text
    pub content: Option<String>,
    pub font_size: Option<f32>,
    pub font_family: Option<String>,
    pub color: Option<Rgb>,
    pub stroke_color: Option<Rgb>,
    pub stroke_width: Option<f32>,
    pub shadow_blur: Option<f32>,
    pub line_height: Option<f32>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
}

impl LayerPatch {
    pub fn position(x: f32, y: f32) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, layer: &mut Layer) {
        if let Some(name) = &self.name {
            layer.name = name.clone();
        }
        set(&mut layer.visible, self.visible);
        set(&mut layer.locked, self.locked);
        set(&mut layer.x, self.x);
        set(&mut layer.y, self.y);

        match &mut layer.kind {
            LayerKind::Image(img) => {
                set(&mut img.scale, self.scale);
                set(&mut img.rotation, self.rotation);
                set(&mut img.filters.brightness, self.brightness);
                set(&mut img.filters.contrast, self.contrast);
                set(&mut img.filters.saturation, self.saturation);
                set(&mut img.filters.blur, self.blur);
            }
            LayerKind::Text(text) => {
                if let Some(content) = &self.content {
                    text.content = content.clone();
                }
                if let Some(family) = &self.font_family {
                    text.font_family = family.clone();
                }
                set(&mut text.font_size, self.font_size);
                set(&mut text.color, self.color);
                set(&mut text.stroke_color, self.stroke_color);
                set(&mut text.stroke_width, self.stroke_width);
                set(&mut text.shadow_blur, self.shadow_blur);
                set(&mut text.line_height, self.line_height);
                set(&mut text.bold, self.bold);
                set(&mut text.italic, self.italic);
            }
        }
    }
}

fn set<T: Copy>(field: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *field = v;
    }
}
