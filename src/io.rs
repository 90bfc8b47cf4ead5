use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, RgbaImage};
use rfd::FileDialog;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{CaptionError, Result};
use crate::layer::Bitmap;

/// Extensions offered by the open dialog. Anything `image` can decode works
/// through drag-and-drop as well.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "tga", "ico", "tiff", "tif"];

/// Result delivered from a background IO task.
#[derive(Debug)]
pub enum IoResult {
    /// An image file was decoded and is ready to become the background layer.
    ImageLoaded { bitmap: Bitmap, path: PathBuf },
    /// Decoding failed; no layer is created.
    LoadFailed { path: PathBuf, error: String },
    /// The PNG export was written.
    ExportComplete { path: PathBuf },
    ExportFailed { path: PathBuf, error: String },
}

// ============================================================================
// DECODE
// ============================================================================

/// Decode any format `image` understands into straight-alpha RGBA.
pub fn decode_image(path: &Path) -> Result<RgbaImage> {
    let img = image::open(path).map_err(|source| CaptionError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_rgba8())
}

/// Decode an in-memory file (e.g. dropped bytes without a path).
pub fn decode_image_bytes(bytes: &[u8], name: &str) -> Result<RgbaImage> {
    let img = image::load_from_memory(bytes).map_err(|source| CaptionError::Decode {
        path: PathBuf::from(name),
        source,
    })?;
    Ok(img.to_rgba8())
}

/// Decode `path` on the rayon pool and report back over `sender`.
pub fn spawn_load(path: PathBuf, sender: Sender<IoResult>) {
    rayon::spawn(move || {
        let msg = match decode_image(&path) {
            Ok(img) => {
                log::info!("Decoded {} ({}x{})", path.display(), img.width(), img.height());
                IoResult::ImageLoaded { bitmap: Bitmap::new(img), path }
            }
            Err(e) => {
                log::error!("{}", e);
                IoResult::LoadFailed { path, error: e.to_string() }
            }
        };
        let _ = sender.send(msg);
    });
}

/// Like [`spawn_load`] for files that arrive as bytes (drag-and-drop
/// without a filesystem path).
pub fn spawn_load_bytes(bytes: Arc<[u8]>, name: String, sender: Sender<IoResult>) {
    rayon::spawn(move || {
        let path = PathBuf::from(&name);
        let msg = match decode_image_bytes(&bytes, &name) {
            Ok(img) => IoResult::ImageLoaded { bitmap: Bitmap::new(img), path },
            Err(e) => {
                log::error!("{}", e);
                IoResult::LoadFailed { path, error: e.to_string() }
            }
        };
        let _ = sender.send(msg);
    });
}

// ============================================================================
// EXPORT
// ============================================================================

/// Write `image` as an RGBA PNG.
pub fn encode_png(image: &RgbaImage, path: &Path) -> Result<()> {
    if image.width() == 0 || image.height() == 0 {
        return Err(CaptionError::EmptyCanvas { width: image.width(), height: image.height() });
    }
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    PngEncoder::new(&mut writer)
        .write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgba8)
        .map_err(|source| CaptionError::Encode { path: path.to_path_buf(), source })?;
    Ok(())
}

/// Encode on the rayon pool; the surface is moved into the task.
pub fn spawn_export(image: RgbaImage, path: PathBuf, sender: Sender<IoResult>) {
    rayon::spawn(move || {
        let msg = match encode_png(&image, &path) {
            Ok(()) => {
                log::info!("Exported {}", path.display());
                IoResult::ExportComplete { path }
            }
            Err(e) => {
                log::error!("Export failed: {}", e);
                IoResult::ExportFailed { path, error: e.to_string() }
            }
        };
        let _ = sender.send(msg);
    });
}

/// `captionfe-<unix-ms>.png`
pub fn export_file_name(unix_ms: u128) -> String {
    format!("{}-{}.png", crate::PRODUCT_NAME, unix_ms)
}

pub fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

// ============================================================================
// FILE HANDLER
// ============================================================================

/// Native dialogs, remembering the last directory used.
pub struct FileHandler {
    pub last_dir: Option<PathBuf>,
}

impl Default for FileHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl FileHandler {
    pub fn new() -> Self {
        Self { last_dir: None }
    }

    pub fn with_dir(dir: Option<PathBuf>) -> Self {
        Self { last_dir: dir }
    }

    /// Show native file dialog to pick an image to open.
    pub fn pick_image(&mut self) -> Option<PathBuf> {
        let mut dialog = FileDialog::new()
            .add_filter("Images", IMAGE_EXTENSIONS)
            .add_filter("All Files", &["*"]);
        if let Some(dir) = &self.last_dir {
            dialog = dialog.set_directory(dir);
        }
        let path = dialog.pick_file()?;
        self.remember_dir(&path);
        Some(path)
    }

    /// Save dialog pre-filled with a fresh export filename.
    pub fn pick_export_path(&mut self, export_dir: Option<&Path>) -> Option<PathBuf> {
        let mut dialog = FileDialog::new()
            .add_filter("PNG", &["png"])
            .set_file_name(export_file_name(now_unix_ms()));
        if let Some(dir) = export_dir.or(self.last_dir.as_deref()) {
            dialog = dialog.set_directory(dir);
        }
        let mut path = dialog.save_file()?;
        if path.extension().is_none() {
            path.set_extension("png");
        }
        self.remember_dir(&path);
        Some(path)
    }

    /// Folder picker for the export directory setting.
    pub fn pick_folder(&self, current: Option<&Path>) -> Option<PathBuf> {
        let mut dialog = FileDialog::new();
        if let Some(dir) = current {
            dialog = dialog.set_directory(dir);
        }
        dialog.pick_folder()
    }

    fn remember_dir(&mut self, path: &Path) {
        if let Some(parent) = path.parent() {
            self.last_dir = Some(parent.to_path_buf());
        }
    }
}
