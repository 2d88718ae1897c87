//! Utility functions for cross-platform path handling

use std::path::{Component, Path, PathBuf};

/// Resolve `path` against `root` and remove `.`/`..` components lexically
///
/// Symlinks are not resolved: tools report paths the way they were given, and the
/// input file set is compared against these paths textually.
pub fn normalize_path(root: &Path, path: &Path) -> PathBuf {
  let joined = if path.is_absolute() {
    path.to_path_buf()
  } else {
    root.join(path)
  };

  let mut out = PathBuf::new();
  for component in joined.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        out.pop();
      }
      other => out.push(other.as_os_str()),
    }
  }
  out
}

/// Display `path` relative to `root` when it lives under it
pub fn display_relative(root: &Path, path: &Path) -> String {
  path
    .strip_prefix(root)
    .map(|p| p.display().to_string())
    .unwrap_or_else(|_| path.display().to_string())
}

/// Convert a path to Git format (always forward slashes)
///
/// Git expects paths with forward slashes, even on Windows.
pub fn path_to_git_format(path: &Path) -> String {
  #[cfg(target_os = "windows")]
  {
    path.to_string_lossy().replace('\\', "/")
  }
  #[cfg(not(target_os = "windows"))]
  {
    path.to_string_lossy().to_string()
  }
}
