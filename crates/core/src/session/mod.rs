pub mod config;
pub mod error;
pub mod face_detector_session;
pub mod readiness;
