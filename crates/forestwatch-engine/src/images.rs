use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use forestwatch_contracts::receipts::ImageDigest;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use sha2::{Digest, Sha256};

/// An input image ready to be sent inline to a vision model.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedImage {
    pub digest: ImageDigest,
    pub upload_mime_type: String,
    pub upload_bytes: Vec<u8>,
}

/// Reads and digests `path`, then downscales it to fit `max_dim` as JPEG.
/// Files the `image` crate cannot decode are uploaded unchanged.
pub fn prepare_image(path: &Path, max_dim: u32) -> Result<PreparedImage> {
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    let digest = ImageDigest {
        path: path.display().to_string(),
        sha256: hex::encode(Sha256::digest(&bytes)),
        bytes: bytes.len() as u64,
        mime_type: mime_for_path(path).to_string(),
    };
    match downscale_to_jpeg(&bytes, max_dim) {
        Some(jpeg) => Ok(PreparedImage {
            digest,
            upload_mime_type: "image/jpeg".to_string(),
            upload_bytes: jpeg,
        }),
        None => Ok(PreparedImage {
            upload_mime_type: digest.mime_type.clone(),
            digest,
            upload_bytes: bytes,
        }),
    }
}

fn downscale_to_jpeg(bytes: &[u8], max_dim: u32) -> Option<Vec<u8>> {
    let dim = max_dim.max(128);
    let decoded = image::load_from_memory(bytes).ok()?;
    let rgba = decoded.to_rgba8();
    // JPEG has no alpha; composite onto white.
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend = |channel: u8| -> u8 {
            (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8
        };
        flattened.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    let mut output = flattened;
    if output.width() > dim || output.height() > dim {
        output = DynamicImage::ImageRgb8(output)
            .resize(dim, dim, FilterType::Triangle)
            .to_rgb8();
    }
    let mut encoded = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut encoded, 90);
    encoder.encode_image(&output).ok()?;
    Some(encoded)
}

pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "tif" | "tiff" => "image/tiff",
        _ => "image/png",
    }
}
