use std::sync::Arc;

use thiserror::Error;

use crate::detection::domain::dead_zone::Side;
use crate::detection::domain::face_detector::DetectorError;
use crate::shared::constants::NO_FACE_MESSAGE;

#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error("invalid session config: {0}")]
    InvalidConfig(String),
    #[error("failed to load face detection model: {0}")]
    ModelLoad(#[source] Arc<dyn std::error::Error + Send + Sync>),
}

/// Outcome of a detection call that did not produce an accepted face.
#[derive(Error, Debug)]
pub enum DetectError {
    #[error("no face detected")]
    NoFaceFound,
    #[error(
        "face too close to the {side} edge (box {left:.1}..{right:.1}, allowed {left_bound:.1}..{right_bound:.1})"
    )]
    FaceOutOfBounds {
        side: Side,
        left: f64,
        right: f64,
        left_bound: f64,
        right_bound: f64,
        score: f64,
    },
    #[error("dead zone ratio must be in [0, 0.5), got {0}")]
    InvalidDeadZone(f64),
    #[error(transparent)]
    ModelLoad(#[from] SessionError),
    #[error("face detection failed: {0}")]
    Inference(#[from] DetectorError),
}

impl DetectError {
    /// True for business rejections (no face, or face off-center), which the
    /// caller is expected to handle by asking the user to recenter.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            DetectError::NoFaceFound | DetectError::FaceOutOfBounds { .. }
        )
    }

    /// Text for end users. Every rejection collapses to the same message.
    pub fn user_message(&self) -> String {
        if self.is_rejection() {
            NO_FACE_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}
