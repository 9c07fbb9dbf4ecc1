pub mod execution_provider;
pub mod model_resolver;
pub mod onnx_model_loader;
pub mod onnx_tiny_face_detector;
