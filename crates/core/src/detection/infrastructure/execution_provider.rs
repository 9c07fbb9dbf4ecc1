use ort::execution_providers::ExecutionProviderDispatch;

/// Execution providers tried for the tiny face detector session, in order.
///
/// ONNX Runtime falls back to CPU when none of them can be registered, so an
/// empty list means plain CPU inference.
pub fn preferred_execution_providers() -> Vec<ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

/// Short name of the preferred accelerator, for log lines.
pub fn provider_label() -> &'static str {
    if cfg!(target_os = "macos") {
        "CoreML"
    } else if cfg!(target_os = "windows") {
        "DirectML"
    } else {
        "CPU"
    }
}
