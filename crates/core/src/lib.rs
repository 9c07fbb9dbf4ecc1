pub mod detection;
pub mod input;
pub mod session;
pub mod shared;

pub use detection::domain::dead_zone::{DeadZone, Side};
pub use detection::domain::face_detection::{BoundingBox, FaceDetection};
pub use detection::domain::face_detector::{DetectorOptions, InputSize};
pub use detection::domain::model_location::ModelLocation;
pub use session::config::SessionConfig;
pub use session::error::{DetectError, SessionError};
pub use session::face_detector_session::FaceDetectorSession;
pub use session::readiness::LoadStatus;
pub use shared::frame::Frame;
