use std::path::Path;

use thiserror::Error;

use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum ImageReadError {
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("image has no pixels: {0}")]
    Empty(String),
}

/// Decode an image file into a frame, keeping alpha or gray as-is.
pub fn read_frame(path: &Path) -> Result<Frame, ImageReadError> {
    let img = image::open(path).map_err(|e| ImageReadError::Decode {
        path: path.display().to_string(),
        source: e,
    })?;
    let frame = Frame::from(img);
    if frame.is_empty() {
        return Err(ImageReadError::Empty(path.display().to_string()));
    }
    log::debug!(
        "Decoded {} ({}x{}, {} channel(s))",
        path.display(),
        frame.width(),
        frame.height(),
        frame.channels()
    );
    Ok(frame)
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
