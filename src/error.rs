//! Error types for the fallible edges of the app (file decode, PNG export).
//!
//! Store mutations never fail: unknown layer ids are silent no-ops.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptionError {
    /// The image file could not be read or decoded.
    #[error("could not decode '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The composited surface could not be encoded or written.
    #[error("could not write '{path}': {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Export was requested for a zero-sized canvas.
    #[error("canvas is empty ({width}x{height})")]
    EmptyCanvas { width: u32, height: u32 },
}

pub type Result<T> = std::result::Result<T, CaptionError>;
