// ============================================================================
// IMAGE FILTERS: brightness / contrast / saturate / blur for image layers
// ============================================================================
//
// Same order and units as a CSS `filter` chain:
//   brightness(b%) contrast(c%) saturate(s%) blur(px)
// Each colour step clamps to [0, 1] before the next one runs.

use image::RgbaImage;
use rayon::prelude::*;

use crate::layer::ImageFilters;

/// Blur sigma cap, in bitmap pixels.
pub const MAX_BLUR_SIGMA: f32 = 32.0;

/// Gaussian sigma in bitmap pixels for a blur given in canvas pixels on a
/// layer drawn at `scale`. Non-finite or non-positive blur means none.
pub fn bitmap_blur_sigma(blur: f32, scale: f32) -> f32 {
    if !(blur.is_finite() && blur > 0.0) {
        return 0.0;
    }
    let sigma = if scale.is_finite() && scale > 0.0 { blur / scale } else { blur };
    sigma.min(MAX_BLUR_SIGMA)
}

/// Apply the colour steps of `filters`, then a gaussian blur of
/// `blur_sigma` bitmap pixels (see [`bitmap_blur_sigma`]). Neutral settings
/// return a plain copy. Non-finite values count as neutral; negative ones
/// clamp to black/grey/0.
pub fn apply_filters(src: &RgbaImage, filters: &ImageFilters, blur_sigma: f32) -> RgbaImage {
    let brightness = percent(filters.brightness);
    let contrast = percent(filters.contrast);
    let saturation = percent(filters.saturation);

    let mut out = if brightness == 1.0 && contrast == 1.0 && saturation == 1.0 {
        src.clone()
    } else {
        let matrix = (saturation != 1.0).then(|| saturate_matrix(saturation));
        apply_pixel_transform(src, move |r, g, b| {
            let step = |v: f32| {
                let v = (v * brightness).clamp(0.0, 1.0);
                ((v - 0.5) * contrast + 0.5).clamp(0.0, 1.0)
            };
            let (r, g, b) = (step(r), step(g), step(b));
            match matrix {
                Some(m) => (
                    (m[0] * r + m[1] * g + m[2] * b).clamp(0.0, 1.0),
                    (m[3] * r + m[4] * g + m[5] * b).clamp(0.0, 1.0),
                    (m[6] * r + m[7] * g + m[8] * b).clamp(0.0, 1.0),
                ),
                None => (r, g, b),
            }
        })
    };

    if blur_sigma.is_finite() && blur_sigma > 0.0 {
        out = parallel_gaussian_blur(&out, blur_sigma.min(MAX_BLUR_SIGMA));
    }
    out
}

fn percent(v: f32) -> f32 {
    if v.is_finite() { v.max(0.0) / 100.0 } else { 1.0 }
}

/// CSS `saturate()` colour matrix, row-major.
fn saturate_matrix(s: f32) -> [f32; 9] {
    [
        0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s,
        0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s,
        0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s,
    ]
}

/// Run `transform` over every pixel's normalized RGB; alpha is kept.
fn apply_pixel_transform<F>(src: &RgbaImage, transform: F) -> RgbaImage
where
    F: Fn(f32, f32, f32) -> (f32, f32, f32) + Sync,
{
    let w = src.width() as usize;
    let h = src.height() as usize;
    let mut out = src.clone();
    if w == 0 || h == 0 {
        return out;
    }
    let stride = w * 4;
    let data: &mut [u8] = &mut out;
    data.par_chunks_mut(stride).for_each(|row| {
        for px in row.chunks_exact_mut(4) {
            let (r, g, b) = transform(
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            );
            px[0] = (r * 255.0).round() as u8;
            px[1] = (g * 255.0).round() as u8;
            px[2] = (b * 255.0).round() as u8;
        }
    });
    out
}

// ---------------------------------------------------------------------------
//  Parallel separable Gaussian blur (rayon)
// ---------------------------------------------------------------------------

/// Build a 1-D Gaussian kernel truncated at ceil(3*sigma), never wider than
/// `max_radius` on either side.
pub(crate) fn build_gaussian_kernel(sigma: f32, max_radius: usize) -> Vec<f32> {
    let radius = ((sigma * 3.0).ceil() as usize).min(max_radius);
    if radius == 0 || sigma <= 0.0 {
        return vec![1.0];
    }
    let len = radius * 2 + 1;
    let s2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..len)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / s2).exp()
        })
        .collect();
    let inv = 1.0 / kernel.iter().sum::<f32>();
    for v in &mut kernel {
        *v *= inv;
    }
    kernel
}

/// Separable blur on premultiplied channels so transparent edges don't
/// bleed dark fringes.
fn parallel_gaussian_blur(src: &RgbaImage, sigma: f32) -> RgbaImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 {
        return src.clone();
    }

    let kernel = build_gaussian_kernel(sigma, w.max(h));
    let radius = kernel.len() / 2;

    let mut buf_in: Vec<f32> = Vec::with_capacity(w * h * 4);
    for px in src.as_raw().chunks_exact(4) {
        let a = px[3] as f32 / 255.0;
        buf_in.extend_from_slice(&[px[0] as f32 * a, px[1] as f32 * a, px[2] as f32 * a, px[3] as f32]);
    }

    // --- Horizontal pass (parallel by row) ---
    let mut buf_h = vec![0.0f32; w * h * 4];
    buf_h.par_chunks_mut(w * 4).enumerate().for_each(|(y, row_out)| {
        let row_in = &buf_in[y * w * 4..(y + 1) * w * 4];
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = (x as isize + ki as isize - radius as isize).clamp(0, w as isize - 1) as usize;
                for c in 0..4 {
                    acc[c] += row_in[sx * 4 + c] * kv;
                }
            }
            row_out[x * 4..x * 4 + 4].copy_from_slice(&acc);
        }
    });

    // --- Vertical pass (parallel by row) ---
    let mut out = RgbaImage::new(w as u32, h as u32);
    let dst: &mut [u8] = &mut out;
    dst.par_chunks_mut(w * 4).enumerate().for_each(|(y, row_out)| {
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = (y as isize + ki as isize - radius as isize).clamp(0, h as isize - 1) as usize;
                let idx = sy * w * 4 + x * 4;
                for c in 0..4 {
                    acc[c] += buf_h[idx + c] * kv;
                }
            }
            let a = acc[3];
            let unpremul = if a > 0.0 { 255.0 / a } else { 0.0 };
            let o = x * 4;
            row_out[o] = (acc[0] * unpremul).round().clamp(0.0, 255.0) as u8;
            row_out[o + 1] = (acc[1] * unpremul).round().clamp(0.0, 255.0) as u8;
            row_out[o + 2] = (acc[2] * unpremul).round().clamp(0.0, 255.0) as u8;
            row_out[o + 3] = a.round().clamp(0.0, 255.0) as u8;
        }
    });
    out
}
