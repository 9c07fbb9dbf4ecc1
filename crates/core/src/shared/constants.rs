pub const TINY_FACE_MODEL_NAME: &str = "tiny_face_detector_model.onnx";

/// Where host applications serve the model, relative to their asset root.
pub const DEFAULT_MODEL_SUBDIR: &str = "js/faceapi_model";

/// Message shown to end users for any rejected detection.
pub const NO_FACE_MESSAGE: &str = "未检测到人脸";

pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.5;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
