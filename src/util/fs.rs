//! Filesystem utilities.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Create a temporary file next to `dest`, so the final rename stays on one
/// filesystem.
fn temp_sibling(dest: &Path) -> Result<NamedTempFile> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    ensure_dir(parent)?;
    NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temporary file in {}", parent.display()))
}

/// Produce `dest` atomically: `write` fills a temporary file next to it,
/// which is then renamed into place.
///
/// Readers either see the previous file or the complete new one.
pub fn write_atomic_with<T>(
    dest: &Path,
    write: impl FnOnce(&mut fs::File) -> io::Result<T>,
) -> Result<T> {
    let mut tmp = temp_sibling(dest)?;
    let value = write(tmp.as_file_mut())
        .with_context(|| format!("failed to write temporary file for {}", dest.display()))?;
    tmp.as_file_mut().flush()?;
    tmp.persist(dest)
        .map_err(|e| e.error)
        .with_context(|| format!("failed to move file into place: {}", dest.display()))?;
    Ok(value)
}

/// Write `contents` to `dest` atomically.
pub fn write_atomic(dest: &Path, contents: &[u8]) -> Result<()> {
    write_atomic_with(dest, |file| file.write_all(contents))
}

/// Stream `reader` into `dest` atomically, returning the number of bytes copied.
pub fn copy_atomic(reader: &mut impl Read, dest: &Path) -> Result<u64> {
    write_atomic_with(dest, |file| io::copy(reader, file))
}

/// Files directly inside `dir` (no recursion) with the given extension,
/// sorted by file name.
///
/// A missing directory yields an empty list.
pub fn list_files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry =
            entry.with_context(|| format!("failed to read directory: {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().is_some_and(|ext| ext == extension) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// Lexically normalize a path: drop `.` components and fold `..` into the
/// preceding component. Does not touch the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let leading = matches!(out.components().next_back(), Some(Component::ParentDir));
                if leading || !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Make `path` absolute against `base` (when relative) and normalize it.
pub fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&base.join(path))
    }
}

/// Get the relative path from `base` to `path`.
pub fn relative_path(base: &Path, path: &Path) -> PathBuf {
    pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf())
}

/// Render a path with forward slashes, for use in hashes and generated sources.
pub fn portable(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
        .replacen("//", "/", 1)
}
