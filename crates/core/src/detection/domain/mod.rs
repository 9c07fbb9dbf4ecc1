pub mod dead_zone;
pub mod face_detection;
pub mod face_detector;
pub mod model_loader;
pub mod model_location;
