//! Test-only codecs and fixtures.

use crate::codec::{Codec, EncodeSettings};
use crate::error::{CompressError, Result};
use image::{DynamicImage, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Marker every fake image file starts with
pub const FAKE_MAGIC: &[u8] = b"IMG";

/// Deterministic RGB noise, hard for lossless formats to shrink
pub fn noise_image(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    RgbImage::from_fn(width, height, |_, _| {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let bytes = (state >> 24).to_le_bytes();
        Rgb([bytes[0], bytes[1], bytes[2]])
    })
}

/// Write a file `FakeCodec` can decode, exactly `len` bytes long
pub fn write_fake_image(dir: &Path, name: &str, len: usize) -> PathBuf {
    let mut bytes = FAKE_MAGIC.to_vec();
    bytes.resize(len.max(FAKE_MAGIC.len()), b'.');
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Counts concurrent and total entries into a codec
#[derive(Debug, Default)]
pub struct Gauge {
    current: AtomicUsize,
    max: AtomicUsize,
    entries: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        self.entries.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    pub fn entries(&self) -> usize {
        self.entries.load(Ordering::SeqCst)
    }
}

/// Codec that decodes files starting with [`FAKE_MAGIC`] into a 1-pixel-high
/// image as wide as the file is long, and encodes to `width * ratio` bytes.
#[derive(Debug, Clone)]
pub struct FakeCodec {
    ratio: f64,
    fail_encode: bool,
    delay: Duration,
    gauge: Arc<Gauge>,
}

impl FakeCodec {
    pub fn with_ratio(ratio: f64) -> Self {
        Self {
            ratio,
            fail_encode: false,
            delay: Duration::ZERO,
            gauge: Arc::new(Gauge::default()),
        }
    }

    pub fn failing_encode() -> Self {
        Self {
            fail_encode: true,
            ..Self::with_ratio(0.5)
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn gauge(&self) -> Arc<Gauge> {
        Arc::clone(&self.gauge)
    }
}

/// The gauge spans the whole transform section: entered on `decode`, left
/// when `decode` fails or when the following `encode` returns.
impl Codec for FakeCodec {
    fn decode(&self, path: &Path) -> Result<DynamicImage> {
        self.gauge.enter();
        std::thread::sleep(self.delay);
        let result = std::fs::read(path).map_err(CompressError::from).and_then(|bytes| {
            if bytes.starts_with(FAKE_MAGIC) {
                Ok(DynamicImage::new_luma8(bytes.len() as u32, 1))
            } else {
                Err(CompressError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "not a fake image",
                )))
            }
        });
        if result.is_err() {
            self.gauge.exit();
        }
        result
    }

    fn encode(&self, image: &DynamicImage, _settings: EncodeSettings) -> Result<Vec<u8>> {
        let result = if self.fail_encode {
            Err(CompressError::Encode("fake encoder failure".to_string()))
        } else {
            let len = ((image.width() as f64 * self.ratio) as usize).max(1);
            Ok(vec![0xAB; len])
        };
        self.gauge.exit();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_gauge_spans_decode_and_encode() {
        let temp_dir = TempDir::new().unwrap();
        let good = write_fake_image(temp_dir.path(), "good.png", 10);
        let bad = temp_dir.path().join("bad.png");
        std::fs::write(&bad, b"nope").unwrap();
        let codec = FakeCodec::with_ratio(0.5);
        let gauge = codec.gauge();

        let image = codec.decode(&good).unwrap();
        assert_eq!(gauge.current(), 1);
        codec.encode(&image, EncodeSettings::default()).unwrap();
        assert_eq!(gauge.current(), 0);

        assert!(codec.decode(&bad).is_err());
        assert_eq!(gauge.current(), 0);
        assert_eq!((gauge.entries(), gauge.max()), (2, 1));
    }
}
