//! Image inspection and size reduction for inline attachments.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageReader};
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

pub const JPEG_QUALITY: u8 = 85;

/// First resize attempt, as a percentage of the original dimensions.
const START_SCALE_PERCENT: u32 = 80;
const SCALE_STEP_PERCENT: u32 = 10;
const MIN_SCALE_PERCENT: u32 = 10;

#[derive(Debug, Error)]
pub enum ResizeError {
  #[error("failed to decode image: {0}")]
  Decode(#[source] ImageError),

  #[error("failed to encode resized image: {0}")]
  Encode(#[source] ImageError),

  #[error("image could not be shrunk below {limit} bytes (smallest attempt was {smallest} bytes)")]
  StillTooLarge { limit: u64, smallest: u64 },

  #[error("resize task failed: {0}")]
  Task(String),
}

#[derive(Debug, Clone)]
pub struct ResizedImage {
  pub bytes: Vec<u8>,
  pub content_type: String,
  pub width: u32,
  pub height: u32,
}

pub trait ImageProcessor: Send + Sync {
  /// Width and height, or `None` when the bytes are not a decodable image.
  fn dimensions(&self, bytes: &[u8]) -> Option<(u32, u32)>;

  fn resize_to_fit(
    &self,
    bytes: &[u8],
    content_type: &str,
    max_bytes: u64,
  ) -> Result<ResizedImage, ResizeError>;
}

/// Re-encode target. PNG stays PNG, everything else becomes JPEG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
  Jpeg,
  Png,
}

impl OutputFormat {
  pub fn for_content_type(content_type: &str) -> Self {
    let essence = content_type
      .split(';')
      .next()
      .unwrap_or_default()
      .trim()
      .to_ascii_lowercase();
    match essence.as_str() {
      "image/png" => OutputFormat::Png,
      _ => OutputFormat::Jpeg,
    }
  }

  pub fn content_type(self) -> &'static str {
    match self {
      OutputFormat::Jpeg => "image/jpeg",
      OutputFormat::Png => "image/png",
    }
  }

  pub fn encode(self, img: &DynamicImage) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    match self {
      OutputFormat::Jpeg => {
        // JPEG has no alpha channel
        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
        rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY))?;
      }
      OutputFormat::Png => {
        img.write_with_encoder(PngEncoder::new(&mut buf))?;
      }
    }
    Ok(buf)
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultImageProcessor;

impl ImageProcessor for DefaultImageProcessor {
  fn dimensions(&self, bytes: &[u8]) -> Option<(u32, u32)> {
    // Reads the header only
    ImageReader::new(Cursor::new(bytes))
      .with_guessed_format()
      .ok()?
      .into_dimensions()
      .ok()
  }

  fn resize_to_fit(
    &self,
    bytes: &[u8],
    content_type: &str,
    max_bytes: u64,
  ) -> Result<ResizedImage, ResizeError> {
    let img = image::load_from_memory(bytes).map_err(ResizeError::Decode)?;
    let format = OutputFormat::for_content_type(content_type);
    let (bytes, width, height) = shrink_until_fits(&img, max_bytes, |img| format.encode(img))?;

    Ok(ResizedImage {
      bytes,
      content_type: format.content_type().to_string(),
      width,
      height,
    })
  }
}

/// `dimension * percent / 100`, at least 1. Computed in u64 so huge images cannot overflow.
fn scaled(dimension: u32, percent: u32) -> u32 {
  let value = u64::from(dimension) * u64::from(percent) / 100;
  u32::try_from(value).unwrap_or(u32::MAX).max(1)
}

/// Scale down from 80% in 10 point steps until `encode` produces at most
/// `max_bytes`. Gives up once the scale would drop below 10%.
pub fn shrink_until_fits<F>(
  img: &DynamicImage,
  max_bytes: u64,
  encode: F,
) -> Result<(Vec<u8>, u32, u32), ResizeError>
where
  F: Fn(&DynamicImage) -> Result<Vec<u8>, ImageError>,
{
  let (orig_width, orig_height) = (img.width(), img.height());
  let mut smallest = u64::MAX;
  let mut scale = START_SCALE_PERCENT;

  while scale >= MIN_SCALE_PERCENT {
    let width = scaled(orig_width, scale);
    let height = scaled(orig_height, scale);
    let resized = img.resize(width, height, FilterType::Triangle);
    let encoded = encode(&resized).map_err(ResizeError::Encode)?;
    let size = encoded.len() as u64;

    debug!(scale, width = resized.width(), height = resized.height(), size, "Resize attempt");

    if size <= max_bytes {
      return Ok((encoded, resized.width(), resized.height()));
    }
    smallest = smallest.min(size);
    scale -= SCALE_STEP_PERCENT;
  }

  Err(ResizeError::StillTooLarge {
    limit: max_bytes,
    smallest,
  })
}
