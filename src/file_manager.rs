//! # File Management Module
//!
//! Filesystem helpers shared by the scheduler, the worker pool and the transform.
//!
//! ## Responsibilities:
//! - Resolve a dropped path (file or folder) to the folder to compress
//! - Derive the output folder of a job (`<source><suffix>`)
//! - Enumerate the qualifying images of one folder level (no recursion)
//! - Verbatim fallback copies
//! - Human-readable sizes and reduction percentages for logs
//!
//! ## Qualifying formats:
//! JPG, JPEG, PNG, WebP, AVIF, GIF, BMP, TIF, TIFF (extension, case-insensitive)

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Extensions accepted as job input, lowercase
pub const QUALIFYING_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "avif", "gif", "bmp", "tif", "tiff",
];

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Returns the folder a path refers to.
    ///
    /// A directory resolves to itself, a regular file to its containing
    /// directory. A path that does not exist or cannot be statted resolves to
    /// `None`.
    pub fn resolve_folder(path: &Path) -> Option<PathBuf> {
        let metadata = std::fs::metadata(path).ok()?;
        if metadata.is_dir() {
            return Some(path.to_path_buf());
        }

        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => Some(parent.to_path_buf()),
            // bare file name: its folder is the working directory
            Some(_) => Some(PathBuf::from(".")),
            None => None,
        }
    }

    /// Output folder for a source folder: the source path with `suffix` appended
    /// to its last component, e.g. `/photos/trip` -> `/photos/trip_translated`.
    pub fn output_dir_for(source: &Path, suffix: &str) -> PathBuf {
        match (source.parent(), source.file_name()) {
            (Some(parent), Some(name)) => {
                let mut name = name.to_os_string();
                name.push(suffix);
                parent.join(name)
            }
            _ => {
                let mut raw = OsString::from(source.as_os_str());
                raw.push(suffix);
                PathBuf::from(raw)
            }
        }
    }

    /// Check if a file name has a qualifying image extension
    pub fn is_qualifying(path: &Path) -> bool {
        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            QUALIFYING_EXTENSIONS.contains(&ext_lower.as_str())
        } else {
            false
        }
    }

    /// List the qualifying images directly inside `dir`, sorted by file name.
    ///
    /// Subdirectories are ignored, not walked. Fails only if the directory
    /// itself cannot be read.
    pub async fn list_qualifying_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut entries = fs::read_dir(dir).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let is_dir = match entry.file_type().await {
                Ok(file_type) => file_type.is_dir(),
                Err(_) => continue,
            };

            let path = entry.path();
            if !is_dir && Self::is_qualifying(&path) {
                files.push(path);
            }
        }

        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    /// Copy `src` to `dst` byte for byte, replacing `dst` if present
    pub fn copy_verbatim(src: &Path, dst: &Path) -> std::io::Result<u64> {
        std::fs::copy(src, dst)
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
