pub mod app;
pub mod chatlog;
pub mod components;
pub mod compositor;
pub mod error;
pub mod interaction;
pub mod io;
pub mod layer;
pub mod logger;
pub mod ops;
pub mod settings;
pub mod store;

/// Lower-case name used for files, folders and the log target.
pub const PRODUCT_NAME: &str = "captionfe";
pub const APP_TITLE: &str = "CaptionFE";

pub use error::{CaptionError, Result};
pub use layer::{Layer, LayerId, LayerKind, LayerPatch, Rgb};
pub use store::LayerStore;
