use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::detection::domain::model_location::ModelLocation;
use crate::shared::constants::TINY_FACE_MODEL_NAME;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("model file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send + Sync>;

/// Resolve a model location to a file on disk, downloading remote models
/// into the user cache on first use.
pub fn resolve(
    location: &ModelLocation,
    progress: Option<&ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    match location {
        ModelLocation::Remote { url } => resolve_in(location, &model_cache_dir()?, progress)
            .map_err(|e| {
                log::warn!("Could not fetch model from {url}: {e}");
                e
            }),
        _ => resolve_in(location, Path::new(""), progress),
    }
}

/// Like [`resolve`], with an explicit cache directory for remote models.
pub fn resolve_in(
    location: &ModelLocation,
    cache_dir: &Path,
    progress: Option<&ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    match location {
        ModelLocation::File(_) | ModelLocation::Directory(_) => {
            let path = location
                .local_path()
                .ok_or_else(|| ModelResolveError::NotFound(PathBuf::new()))?;
            if path.is_file() {
                Ok(path)
            } else {
                Err(ModelResolveError::NotFound(path))
            }
        }
        ModelLocation::Remote { url } => {
            let cached_path = cache_dir.join(cache_file_name(url));
            if cached_path.exists() {
                log::debug!("Using cached model {}", cached_path.display());
                return Ok(cached_path);
            }
            fs::create_dir_all(cache_dir).map_err(ModelResolveError::CacheDir)?;
            log::info!("Downloading model from {url}");
            download(url, &cached_path, progress)?;
            Ok(cached_path)
        }
    }
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/facegate/models/`
/// - Linux: `$XDG_CACHE_HOME/facegate/models/` or `~/.cache/facegate/models/`
/// - Windows: `%LOCALAPPDATA%/facegate/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("facegate").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("facegate").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
}

/// Last path segment of the URL, without query or fragment.
fn cache_file_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && !name.contains(':'))
        .unwrap_or(TINY_FACE_MODEL_NAME)
        .to_string()
}

fn download(url: &str, dest: &Path, progress: Option<&ProgressFn>) -> Result<(), ModelResolveError> {
    let temp_path = dest.with_extension("part");

    let result = download_inner(url, dest, &temp_path, progress);

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }

    result
}

fn download_inner(
    url: &str,
    dest: &Path,
    temp_path: &Path,
    progress: Option<&ProgressFn>,
) -> Result<(), ModelResolveError> {
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ModelResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    let write_err = |path: &Path| {
        let path = path.to_path_buf();
        move |e: std::io::Error| ModelResolveError::Write { path, source: e }
    };

    let mut file = fs::File::create(temp_path).map_err(write_err(temp_path))?;

    // Stream in chunks; models can be large.
    let mut reader = response;
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(write_err(temp_path))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_err(temp_path))?;
        downloaded += n as u64;
        if let Some(cb) = progress {
            cb(downloaded, total);
        }
    }

    file.flush().map_err(write_err(temp_path))?;
    drop(file);

    fs::rename(temp_path, dest).map_err(write_err(dest))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_file_location() {
        let tmp = TempDir::new().unwrap();
        let model_path = tmp.path().join("custom.onnx");
        fs::write(&model_path, b"fake model data").unwrap();

        let resolved = resolve(&ModelLocation::File(model_path.clone()), None).unwrap();
        assert_eq!(resolved, model_path);
    }

    #[test]
    fn test_resolve_directory_location() {
        let tmp = TempDir::new().unwrap();
        let model_path = tmp.path().join(TINY_FACE_MODEL_NAME);
        fs::write(&model_path, b"fake model data").unwrap();

        let resolved = resolve(&ModelLocation::Directory(tmp.path().to_path_buf()), None).unwrap();
        assert_eq!(resolved, model_path);
    }

    #[test]
    fn test_resolve_asset_root_layout() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("js").join("faceapi_model");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(TINY_FACE_MODEL_NAME), b"weights").unwrap();

        let resolved = resolve(&ModelLocation::from_asset_root(tmp.path()), None).unwrap();
        assert_eq!(resolved, dir.join(TINY_FACE_MODEL_NAME));
    }

    #[test]
    fn test_resolve_missing_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = resolve(&ModelLocation::Directory(tmp.path().to_path_buf()), None).unwrap_err();
        assert!(matches!(err, ModelResolveError::NotFound(p) if p.ends_with(TINY_FACE_MODEL_NAME)));
    }

    #[test]
    fn test_resolve_directory_path_given_as_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = resolve(&ModelLocation::File(tmp.path().to_path_buf()), None).unwrap_err();
        assert!(matches!(err, ModelResolveError::NotFound(_)));
    }

    #[test]
    fn test_resolve_remote_uses_cache_without_network() {
        let tmp = TempDir::new().unwrap();
        let cached = tmp.path().join("face.onnx");
        fs::write(&cached, b"cached").unwrap();

        let location = ModelLocation::Remote {
            url: "http://invalid.nonexistent.example.com/models/face.onnx".into(),
        };
        let resolved = resolve_in(&location, tmp.path(), None).unwrap();
        assert_eq!(resolved, cached);
    }

    #[test]
    fn test_model_cache_dir_returns_path() {
        let path = model_cache_dir().unwrap();
        assert!(path.to_string_lossy().contains("facegate"));
        assert!(path.to_string_lossy().contains("models"));
    }

    #[rstest]
    #[case("https://host/models/face.onnx", "face.onnx")]
    #[case("https://host/models/face.onnx?token=abc", "face.onnx")]
    #[case("https://host/models/", TINY_FACE_MODEL_NAME)]
    #[case("https://host", "host")]
    fn test_cache_file_name(#[case] url: &str, #[case] expected: &str) {
        assert_eq!(cache_file_name(url), expected);
    }

    #[test]
    fn test_download_invalid_url_returns_error() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("model.onnx");
        let result = download("http://invalid.nonexistent.example.com/model", &dest, None);
        assert!(result.is_err());
    }

    #[test]
    fn test_download_atomic_no_partial_on_failure() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("model.onnx");
        let _ = download("http://invalid.nonexistent.example.com/model", &dest, None);
        assert!(!dest.exists());
        assert!(!dest.with_extension("part").exists());
    }

    #[test]
    fn test_remote_download_failure_leaves_cache_empty() {
        let tmp = TempDir::new().unwrap();
        let location = ModelLocation::Remote {
            url: "http://invalid.nonexistent.example.com/face.onnx".into(),
        };
        let err = resolve_in(&location, tmp.path(), None).unwrap_err();
        assert!(matches!(err, ModelResolveError::Download { .. }));
        assert!(!tmp.path().join("face.onnx").exists());
    }
}
