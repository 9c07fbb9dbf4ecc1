use crate::detection::domain::face_detector::{DetectorOptions, InputSize};
use crate::detection::domain::model_location::ModelLocation;
use crate::shared::constants::DEFAULT_SCORE_THRESHOLD;

use super::error::SessionError;

/// Session settings, fixed at construction.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    /// Start loading the model in the background as soon as the session exists.
    pub immediate: bool,
    /// Minimum detection score in `[0, 1]`.
    pub score_threshold: f64,
    pub input_size: InputSize,
    pub model: ModelLocation,
}

impl SessionConfig {
    pub fn new(model: ModelLocation) -> Self {
        Self {
            model,
            ..Self::default()
        }
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn score_threshold(mut self, score_threshold: f64) -> Self {
        self.score_threshold = score_threshold;
        self
    }

    pub fn input_size(mut self, input_size: InputSize) -> Self {
        self.input_size = input_size;
        self
    }

    pub fn detector_options(&self) -> DetectorOptions {
        DetectorOptions::new(self.input_size, self.score_threshold)
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        self.detector_options()
            .validate()
            .map_err(|e| SessionError::InvalidConfig(e.to_string()))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            immediate: true,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            input_size: InputSize::Lg,
            model: ModelLocation::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert!(config.immediate);
        assert_eq!(config.score_threshold, 0.5);
        assert_eq!(config.input_size, InputSize::Lg);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = SessionConfig::new(ModelLocation::File(PathBuf::from("m.onnx")))
            .immediate(false)
            .score_threshold(0.7)
            .input_size(InputSize::Md);
        assert!(!config.immediate);
        assert_eq!(
            config.detector_options(),
            DetectorOptions::new(InputSize::Md, 0.7)
        );
        assert_eq!(config.model, ModelLocation::File(PathBuf::from("m.onnx")));
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let err = SessionConfig::default().score_threshold(1.2).validate().unwrap_err();
        assert!(matches!(err, SessionError::InvalidConfig(_)));
    }

    #[test]
    fn test_invalid_input_size_rejected() {
        let config = SessionConfig::default().input_size(InputSize::Custom(300));
        assert!(config.validate().is_err());
    }
}
