use std::path::{Path, PathBuf};

/// Where inbound frames come from
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceKind {
    /// ROS 2 image topic
    Ros,
    /// Local webcam (requires the `webcam` feature)
    Webcam,
}

/// Where annotated frames go
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum SinkKind {
    /// ROS 2 image topic
    Ros,
    /// v4l2loopback device (requires the `loopback` feature)
    Loopback,
}

/// Directory holding the running executable, where artifacts are installed
pub fn install_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Resolve a model or label artifact path
///
/// Absolute paths and paths that exist relative to the working directory
/// are used as-is; anything else is looked up next to the executable.
pub fn resolve_artifact(path: &Path, install_dir: Option<&Path>) -> PathBuf {
    if path.is_absolute() || path.exists() {
        return path.to_path_buf();
    }
    match install_dir {
        Some(dir) => dir.join(path),
        None => path.to_path_buf(),
    }
}
