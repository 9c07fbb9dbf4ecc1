use std::fmt;

use thiserror::Error;

use crate::detection::domain::face_detection::FaceDetection;
use crate::shared::constants::DEFAULT_SCORE_THRESHOLD;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("invalid detector options: {0}")]
    InvalidOptions(String),
    #[error("frame is empty ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },
    #[error("unexpected model output: {0}")]
    UnexpectedOutput(String),
    #[error("inference backend error: {0}")]
    Backend(String),
}

/// Square network resolution the detector runs at.
///
/// Larger sizes find smaller faces at the cost of inference time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum InputSize {
    Xs,
    Sm,
    Md,
    #[default]
    Lg,
    Custom(u32),
}

impl InputSize {
    pub fn pixels(self) -> u32 {
        match self {
            InputSize::Xs => 224,
            InputSize::Sm => 320,
            InputSize::Md => 416,
            InputSize::Lg => 608,
            InputSize::Custom(n) => n,
        }
    }

    pub fn validate(self) -> Result<(), DetectorError> {
        let n = self.pixels();
        if n == 0 || n % 32 != 0 {
            return Err(DetectorError::InvalidOptions(format!(
                "input size must be a positive multiple of 32, got {n}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for InputSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSize::Xs => write!(f, "xs"),
            InputSize::Sm => write!(f, "sm"),
            InputSize::Md => write!(f, "md"),
            InputSize::Lg => write!(f, "lg"),
            InputSize::Custom(n) => write!(f, "{n}"),
        }
    }
}

impl std::str::FromStr for InputSize {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let size = match s.to_ascii_lowercase().as_str() {
            "xs" => InputSize::Xs,
            "sm" => InputSize::Sm,
            "md" => InputSize::Md,
            "lg" => InputSize::Lg,
            other => other.parse::<u32>().map(InputSize::Custom).map_err(|_| {
                DetectorError::InvalidOptions(format!(
                    "input size must be xs, sm, md, lg or a pixel count, got '{s}'"
                ))
            })?,
        };
        size.validate()?;
        Ok(size)
    }
}

/// Per-call detector settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorOptions {
    pub input_size: InputSize,
    pub score_threshold: f64,
}

impl DetectorOptions {
    pub fn new(input_size: InputSize, score_threshold: f64) -> Self {
        Self {
            input_size,
            score_threshold,
        }
    }

    pub fn validate(&self) -> Result<(), DetectorError> {
        self.input_size.validate()?;
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(DetectorError::InvalidOptions(format!(
                "score threshold must be between 0.0 and 1.0, got {}",
                self.score_threshold
            )));
        }
        Ok(())
    }
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self::new(InputSize::default(), DEFAULT_SCORE_THRESHOLD)
    }
}

/// Domain interface for face detection.
///
/// Returns every face scoring at or above the threshold, highest score first.
/// Implementations may keep inference buffers, hence `&mut self`.
pub trait FaceDetector: Send {
    fn detect(
        &mut self,
        frame: &Frame,
        options: &DetectorOptions,
    ) -> Result<Vec<FaceDetection>, DetectorError>;

    /// The single highest-scoring face, if any.
    fn detect_single(
        &mut self,
        frame: &Frame,
        options: &DetectorOptions,
    ) -> Result<Option<FaceDetection>, DetectorError> {
        let faces = self.detect(frame, options)?;
        Ok(faces.into_iter().max_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        }))
    }
}
