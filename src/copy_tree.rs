use std::fs;
use std::path::{Path, PathBuf};

use crate::discovery;
use crate::isolation::SANDBOX_MARKER;
use crate::state::STATE_FILE;

/// Names skipped wherever they appear, both when copying into a sandbox and
/// when scanning for sources.
pub const SKIP_NAMES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    ".venv",
    "venv",
    "__pycache__",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
    STATE_FILE,
];

/// Build output directories. Only skipped directly inside a project, so a
/// source package called `build` deeper down is still mutated.
pub const BUILD_OUTPUT_NAMES: &[&str] = &["target", "dist", "build", ".next", ".nuxt"];

const SKIP_SUFFIXES: &[&str] = &[".pyc", ".pyo"];

pub fn should_skip(name: &str) -> bool {
    SKIP_NAMES.iter().any(|s| *s == name)
        || SKIP_SUFFIXES.iter().any(|s| name.ends_with(s))
        || name.starts_with(&format!("{SANDBOX_MARKER}-"))
}

/// Whether the entry `name` inside directory `parent` is left out.
pub fn should_skip_entry(parent: &Path, name: &str) -> bool {
    should_skip(name) || (BUILD_OUTPUT_NAMES.contains(&name) && discovery::is_project_dir(parent))
}

/// Recursively copy `src` into `dst`, leaving out build output, VCS metadata
/// and virtualenvs. Symlinks and special files are not followed.
pub fn copy_dir_filtered(src: &Path, dst: &Path) -> std::io::Result<u64> {
    fs::create_dir_all(dst)?;
    let mut copied = 0;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if should_skip_entry(src, &name.to_string_lossy()) {
            continue;
        }
        let src_path = entry.path();
        let dst_path = dst.join(&name);
        let ft = entry.file_type()?;
        if ft.is_dir() {
            copied += copy_dir_filtered(&src_path, &dst_path)?;
        } else if ft.is_file() {
            fs::copy(&src_path, &dst_path)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Map `path` from under `from_root` to the same place under `to_root`.
/// Paths outside `from_root` are returned unchanged.
pub fn remap(path: &Path, from_root: &Path, to_root: &Path) -> PathBuf {
    match path.strip_prefix(from_root) {
        Ok(relative) => to_root.join(relative),
        Err(_) => path.to_path_buf(),
    }
}
