use crate::detection::domain::face_detector::FaceDetector;

pub type LoadError = Box<dyn std::error::Error + Send + Sync>;

/// Produces a ready-to-run detector.
///
/// Called from the session's loading thread; may block on disk or network.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Box<dyn FaceDetector>, LoadError>;

    /// Human-readable description of what is being loaded, for logs.
    fn describe(&self) -> String {
        "face detection model".to_string()
    }
}
