use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, ImageResult};

/// Longest edge allowed for a stored photo.
pub const MAX_DIMENSION: u32 = 1200;

pub const JPEG_QUALITY: u8 = 85;

/// Extension of every normalized asset.
pub const OUTPUT_EXTENSION: &str = "jpg";

/// Decode the image at `path` (format sniffed from content, not the declared
/// type), shrink it to fit `MAX_DIMENSION` and re-encode as JPEG.
pub fn normalize_file(path: &Path) -> ImageResult<Vec<u8>> {
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    encode_jpeg(&fit_within(img, MAX_DIMENSION))
}

/// Proportionally downscale so neither side exceeds `max`. Never upscales.
pub fn fit_within(img: DynamicImage, max: u32) -> DynamicImage {
    if img.width() <= max && img.height() <= max {
        return img;
    }
    img.resize(max, max, FilterType::Lanczos3)
}

fn encode_jpeg(img: &DynamicImage) -> ImageResult<Vec<u8>> {
    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut out = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))?;
    Ok(out)
}
