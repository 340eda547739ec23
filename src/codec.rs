//! # Codec Adapter
//!
//! Decode of arbitrary source images into a canonical in-memory
//! representation ([`DynamicImage`]) and encode into the target format.
//!
//! The engine only sees the [`Codec`] trait; [`AvifCodec`] is the production
//! implementation backed by the `image` crate (ravif for AVIF encoding).
//! Codec calls are blocking and CPU heavy: callers run them on the blocking pool.

use crate::config::Config;
use crate::error::{CompressError, Result};
use image::codecs::avif::AvifEncoder;
use image::{ColorType, DynamicImage, ImageEncoder};
use std::path::Path;

/// Quality/speed pair handed to the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSettings {
    /// 0-100, higher = better quality
    pub quality: u8,
    /// 0-10, higher = faster encode
    pub speed: u8,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self { quality: 55, speed: 8 }
    }
}

impl From<&Config> for EncodeSettings {
    fn from(config: &Config) -> Self {
        Self {
            quality: config.quality,
            speed: config.speed,
        }
    }
}

/// Encode/decode capability used by the file transform.
///
/// Failures are reported through `Result`; the transform decides how to recover.
pub trait Codec: Send + Sync + 'static {
    /// Decode the file at `path`, whatever its source format
    fn decode(&self, path: &Path) -> Result<DynamicImage>;

    /// Encode `image` into the target format
    fn encode(&self, image: &DynamicImage, settings: EncodeSettings) -> Result<Vec<u8>>;

    /// Extension (without dot) of the files `encode` produces
    fn extension(&self) -> &str {
        "avif"
    }
}

/// AVIF codec on top of the `image` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct AvifCodec;

impl Codec for AvifCodec {
    fn decode(&self, path: &Path) -> Result<DynamicImage> {
        // content sniffing first: a mislabelled .jpg that is really a PNG still decodes
        let reader = image::io::Reader::open(path)?.with_guessed_format()?;
        Ok(reader.decode()?)
    }

    fn encode(&self, image: &DynamicImage, settings: EncodeSettings) -> Result<Vec<u8>> {
        let speed = settings.speed.clamp(1, 10);
        let quality = settings.quality.clamp(1, 100);
        let mut buffer = Vec::new();

        {
            let encoder = AvifEncoder::new_with_speed_quality(&mut buffer, speed, quality);
            if image.color().has_alpha() {
                let rgba = image.to_rgba8();
                encoder.write_image(rgba.as_raw(), rgba.width(), rgba.height(), ColorType::Rgba8)?;
            } else {
                let rgb = image.to_rgb8();
                encoder.write_image(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)?;
            }
        }

        if buffer.is_empty() {
            return Err(CompressError::Encode("encoder produced no data".to_string()));
        }

        Ok(buffer)
    }
}
