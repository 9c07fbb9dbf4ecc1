use std::time::Instant;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::model_loader::{LoadError, ModelLoader};
use crate::detection::domain::model_location::ModelLocation;

use super::model_resolver::{self, ProgressFn};
use super::onnx_tiny_face_detector::OnnxTinyFaceDetector;

/// Resolves the model location and opens it as an [`OnnxTinyFaceDetector`].
pub struct OnnxModelLoader {
    location: ModelLocation,
    progress: Option<ProgressFn>,
}

impl OnnxModelLoader {
    pub fn new(location: ModelLocation) -> Self {
        Self {
            location,
            progress: None,
        }
    }

    /// Report download progress for remote locations.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn location(&self) -> &ModelLocation {
        &self.location
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self) -> Result<Box<dyn FaceDetector>, LoadError> {
        let start = Instant::now();
        let path = model_resolver::resolve(&self.location, self.progress.as_ref())?;
        log::info!("Opening face detection model {}", path.display());
        let detector = OnnxTinyFaceDetector::new(&path)?;
        log::info!(
            "Face detection model ready in {:.1}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(Box::new(detector))
    }

    fn describe(&self) -> String {
        self.location.to_string()
    }
}
