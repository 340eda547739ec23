//! # File Transform
//!
//! Decides, for one source file, whether the output folder receives a
//! compressed version or a verbatim copy.
//!
//! ## Policy:
//! 1. Decode fails -> copy the original under its own name
//! 2. Encode fails -> copy
//! 3. `compressed > original * size_threshold` -> discard the encoded bytes, copy
//! 4. Otherwise write `<stem>.<codec extension>`
//!
//! The output folder therefore always holds exactly one openable file per
//! input: either the untouched original or a smaller compressed file.
//! Only a failing fallback copy is reported as an error.

use crate::codec::{Codec, EncodeSettings};
use crate::config::Config;
use crate::error::{CompressError, Result};
use crate::file_manager::FileManager;
use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Why a file ended up copied instead of compressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    DecodeFailed,
    EncodeFailed,
    /// Compression saved less than the configured threshold
    NotWorthIt,
    /// Writing the compressed file failed
    WriteFailed,
    /// Another input of the job shares the stem; compressing would overwrite its output
    NameCollision,
}

/// Result of transforming one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOutcome {
    Compressed { original_size: u64, compressed_size: u64 },
    Copied { reason: FallbackReason },
    /// Output already present, nothing done
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMode {
    Compress,
    CopyOnly,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformSettings {
    pub encode: EncodeSettings,
    /// Keep compressed output only if `compressed <= original * size_threshold`
    pub size_threshold: f64,
    pub skip_existing: bool,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for TransformSettings {
    fn from(config: &Config) -> Self {
        Self {
            encode: EncodeSettings::from(config),
            size_threshold: config.size_threshold,
            skip_existing: config.skip_existing,
        }
    }
}

/// Per-file compress-or-copy policy around a [`Codec`]
#[derive(Clone)]
pub struct FileTransform {
    codec: Arc<dyn Codec>,
    settings: TransformSettings,
}

impl FileTransform {
    pub fn new(codec: Arc<dyn Codec>, settings: TransformSettings) -> Self {
        Self { codec, settings }
    }

    pub fn settings(&self) -> &TransformSettings {
        &self.settings
    }

    /// File name of the compressed output: original stem, codec extension
    pub fn compressed_name(&self, src: &Path) -> OsString {
        let mut name = src
            .file_stem()
            .map(|stem| stem.to_os_string())
            .unwrap_or_default();
        name.push(".");
        name.push(self.codec.extension());
        name
    }

    /// Transform `src` into `out_dir`. Blocking; run it off the async runtime.
    pub fn run(&self, src: &Path, out_dir: &Path, mode: TransformMode) -> Result<TransformOutcome> {
        let file_name = src.file_name().ok_or_else(|| CompressError::Copy {
            path: src.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
        })?;
        let copy_path = out_dir.join(file_name);
        let compressed_path = out_dir.join(self.compressed_name(src));

        if self.settings.skip_existing && (compressed_path.exists() || copy_path.exists()) {
            debug!("[SKIP] Output already present for {}", src.display());
            return Ok(TransformOutcome::Skipped);
        }

        if mode == TransformMode::CopyOnly {
            return self.fallback(src, &copy_path, FallbackReason::NameCollision);
        }

        let image = match self.codec.decode(src) {
            Ok(image) => image,
            Err(e) => {
                debug!("Decode failed for {}: {}", src.display(), e);
                return self.fallback_replacing(src, &copy_path, &compressed_path, FallbackReason::DecodeFailed);
            }
        };

        let encoded = match self.codec.encode(&image, self.settings.encode) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Encode failed for {}: {}", src.display(), e);
                return self.fallback_replacing(src, &copy_path, &compressed_path, FallbackReason::EncodeFailed);
            }
        };
        // pixel buffer is not needed past this point
        drop(image);

        let original_size = std::fs::metadata(src).map(|m| m.len()).unwrap_or(0);
        let compressed_size = encoded.len() as u64;

        if compressed_size as f64 > original_size as f64 * self.settings.size_threshold {
            debug!(
                "Kept original ({:.0}%): {}",
                compressed_size as f64 / original_size.max(1) as f64 * 100.0,
                src.display()
            );
            return self.fallback_replacing(src, &copy_path, &compressed_path, FallbackReason::NotWorthIt);
        }

        if let Err(e) = std::fs::write(&compressed_path, &encoded) {
            debug!("Writing {} failed: {}", compressed_path.display(), e);
            let _ = std::fs::remove_file(&compressed_path);
            return self.fallback(src, &copy_path, FallbackReason::WriteFailed);
        }

        if copy_path != compressed_path {
            remove_stale(&copy_path);
        }

        debug!(
            "[OK] {} -> {} ({:.1}% saved)",
            src.display(),
            compressed_path.display(),
            FileManager::calculate_reduction(original_size, compressed_size)
        );

        Ok(TransformOutcome::Compressed {
            original_size,
            compressed_size,
        })
    }

    /// Fallback copy that also drops a compressed output left by an earlier run
    fn fallback_replacing(
        &self,
        src: &Path,
        copy_path: &Path,
        compressed_path: &Path,
        reason: FallbackReason,
    ) -> Result<TransformOutcome> {
        if compressed_path != copy_path {
            remove_stale(compressed_path);
        }
        self.fallback(src, copy_path, reason)
    }

    fn fallback(&self, src: &Path, copy_path: &Path, reason: FallbackReason) -> Result<TransformOutcome> {
        FileManager::copy_verbatim(src, copy_path).map_err(|source| CompressError::Copy {
            path: src.to_path_buf(),
            source,
        })?;
        Ok(TransformOutcome::Copied { reason })
    }
}

fn remove_stale(path: &Path) {
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AvifCodec;
    use crate::test_support::{noise_image, write_fake_image, FakeCodec};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn dirs() -> (TempDir, PathBuf, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let src_dir = temp_dir.path().join("src");
        let out_dir = temp_dir.path().join("out");
        std::fs::create_dir_all(&src_dir).unwrap();
        std::fs::create_dir_all(&out_dir).unwrap();
        (temp_dir, src_dir, out_dir)
    }

    fn out_names(out_dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(out_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    fn fake_transform(codec: FakeCodec) -> FileTransform {
        FileTransform::new(Arc::new(codec), TransformSettings::default())
    }

    #[test]
    fn test_settings_follow_config() {
        let config = Config {
            quality: 40,
            speed: 6,
            size_threshold: 0.5,
            skip_existing: true,
            ..Default::default()
        };
        let transform = FileTransform::new(Arc::new(AvifCodec), TransformSettings::from(&config));

        let settings = transform.settings();
        assert_eq!(settings.encode, EncodeSettings { quality: 40, speed: 6 });
        assert_eq!(settings.size_threshold, 0.5);
        assert!(settings.skip_existing);
    }

    #[test]
    fn test_undecodable_file_is_copied_verbatim() {
        let (_tmp, src_dir, out_dir) = dirs();
        let src = src_dir.join("broken.png");
        std::fs::write(&src, b"garbage bytes").unwrap();

        let outcome = FileTransform::new(Arc::new(AvifCodec), TransformSettings::default())
            .run(&src, &out_dir, TransformMode::Compress)
            .unwrap();

        assert_eq!(
            outcome,
            TransformOutcome::Copied {
                reason: FallbackReason::DecodeFailed
            }
        );
        assert_eq!(out_names(&out_dir), vec!["broken.png"]);
        assert_eq!(std::fs::read(out_dir.join("broken.png")).unwrap(), b"garbage bytes");
    }

    #[test]
    fn test_compressible_image_becomes_avif() {
        let (_tmp, src_dir, out_dir) = dirs();
        let src = src_dir.join("noise.png");
        noise_image(64, 64, 42).save(&src).unwrap();

        let outcome = FileTransform::new(Arc::new(AvifCodec), TransformSettings::default())
            .run(&src, &out_dir, TransformMode::Compress)
            .unwrap();

        match outcome {
            TransformOutcome::Compressed {
                original_size,
                compressed_size,
            } => assert!(compressed_size as f64 <= original_size as f64 * 0.85),
            other => panic!("expected compression, got {:?}", other),
        }
        assert_eq!(out_names(&out_dir), vec!["noise.avif"]);
    }

    #[test]
    fn test_policy_with_fake_codec() {
        let (_tmp, src_dir, out_dir) = dirs();
        let src = write_fake_image(&src_dir, "photo.JPG", 400);

        let outcome = fake_transform(FakeCodec::with_ratio(0.5))
            .run(&src, &out_dir, TransformMode::Compress)
            .unwrap();

        assert_eq!(
            outcome,
            TransformOutcome::Compressed {
                original_size: 400,
                compressed_size: 200
            }
        );
        assert_eq!(out_names(&out_dir), vec!["photo.avif"]);
    }

    #[test]
    fn test_not_worth_it_keeps_original() {
        let (_tmp, src_dir, out_dir) = dirs();
        let src = write_fake_image(&src_dir, "photo.png", 400);

        // 0.9 > 0.85: saved only 10%
        let outcome = fake_transform(FakeCodec::with_ratio(0.9))
            .run(&src, &out_dir, TransformMode::Compress)
            .unwrap();

        assert_eq!(
            outcome,
            TransformOutcome::Copied {
                reason: FallbackReason::NotWorthIt
            }
        );
        assert_eq!(out_names(&out_dir), vec!["photo.png"]);
        assert_eq!(
            std::fs::read(out_dir.join("photo.png")).unwrap(),
            std::fs::read(&src).unwrap()
        );
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let (_tmp, src_dir, out_dir) = dirs();
        let src = write_fake_image(&src_dir, "edge.png", 100);

        let outcome = fake_transform(FakeCodec::with_ratio(0.85))
            .run(&src, &out_dir, TransformMode::Compress)
            .unwrap();

        assert!(matches!(outcome, TransformOutcome::Compressed { .. }));
    }

    #[test]
    fn test_encode_failure_falls_back() {
        let (_tmp, src_dir, out_dir) = dirs();
        let src = write_fake_image(&src_dir, "photo.webp", 64);

        let outcome = fake_transform(FakeCodec::failing_encode())
            .run(&src, &out_dir, TransformMode::Compress)
            .unwrap();

        assert_eq!(
            outcome,
            TransformOutcome::Copied {
                reason: FallbackReason::EncodeFailed
            }
        );
        assert_eq!(out_names(&out_dir), vec!["photo.webp"]);
    }

    #[test]
    fn test_copy_only_mode() {
        let (_tmp, src_dir, out_dir) = dirs();
        let src = write_fake_image(&src_dir, "a.png", 64);

        let outcome = fake_transform(FakeCodec::with_ratio(0.1))
            .run(&src, &out_dir, TransformMode::CopyOnly)
            .unwrap();

        assert_eq!(
            outcome,
            TransformOutcome::Copied {
                reason: FallbackReason::NameCollision
            }
        );
        assert_eq!(out_names(&out_dir), vec!["a.png"]);
    }

    #[test]
    fn test_skip_existing() {
        let (_tmp, src_dir, out_dir) = dirs();
        let src = write_fake_image(&src_dir, "a.png", 64);
        std::fs::write(out_dir.join("a.avif"), b"previous run").unwrap();

        let transform = FileTransform::new(
            Arc::new(FakeCodec::with_ratio(0.1)),
            TransformSettings {
                skip_existing: true,
                ..Default::default()
            },
        );
        let outcome = transform.run(&src, &out_dir, TransformMode::Compress).unwrap();

        assert_eq!(outcome, TransformOutcome::Skipped);
        assert_eq!(std::fs::read(out_dir.join("a.avif")).unwrap(), b"previous run");
    }

    #[test]
    fn test_stale_output_is_replaced() {
        let (_tmp, src_dir, out_dir) = dirs();
        let src = write_fake_image(&src_dir, "a.png", 100);
        std::fs::write(out_dir.join("a.avif"), b"stale").unwrap();

        fake_transform(FakeCodec::with_ratio(0.95))
            .run(&src, &out_dir, TransformMode::Compress)
            .unwrap();

        assert_eq!(out_names(&out_dir), vec!["a.png"]);
    }

    #[test]
    fn test_copy_failure_is_reported() {
        let (_tmp, src_dir, out_dir) = dirs();
        let src = src_dir.join("broken.png");
        std::fs::write(&src, b"garbage").unwrap();
        let missing_out = out_dir.join("does-not-exist");

        let result = fake_transform(FakeCodec::with_ratio(0.5)).run(&src, &missing_out, TransformMode::Compress);

        assert!(matches!(result, Err(CompressError::Copy { .. })));
    }
}
