use std::fmt;
use std::path::{Path, PathBuf};

use crate::shared::constants::{DEFAULT_MODEL_SUBDIR, TINY_FACE_MODEL_NAME};

/// Where the face detection model lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelLocation {
    /// An exact model file.
    File(PathBuf),
    /// A directory holding [`TINY_FACE_MODEL_NAME`].
    Directory(PathBuf),
    /// Downloaded once into the user model cache.
    Remote { url: String },
}

impl ModelLocation {
    /// Legacy host layout: `<root>/js/faceapi_model/`.
    pub fn from_asset_root(root: impl AsRef<Path>) -> Self {
        ModelLocation::Directory(root.as_ref().join(DEFAULT_MODEL_SUBDIR))
    }

    /// Base directory of a weight shard or manifest file, e.g.
    /// `models/tiny_face_detector_model-shard1` -> `models/`.
    pub fn from_shard_path(shard: impl AsRef<Path>) -> Self {
        let dir = shard
            .as_ref()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        ModelLocation::Directory(dir)
    }

    /// Local path of the model file, if the location is on disk.
    pub fn local_path(&self) -> Option<PathBuf> {
        match self {
            ModelLocation::File(path) => Some(path.clone()),
            ModelLocation::Directory(dir) => Some(dir.join(TINY_FACE_MODEL_NAME)),
            ModelLocation::Remote { .. } => None,
        }
    }
}

impl Default for ModelLocation {
    fn default() -> Self {
        ModelLocation::from_asset_root(".")
    }
}

impl fmt::Display for ModelLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelLocation::File(path) => write!(f, "{}", path.display()),
            ModelLocation::Directory(dir) => write!(f, "{}", dir.join(TINY_FACE_MODEL_NAME).display()),
            ModelLocation::Remote { url } => write!(f, "{url}"),
        }
    }
}
