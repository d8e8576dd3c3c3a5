use std::io::Cursor;

use anyhow::Context as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView as _};

pub const MAX_COVER_HEIGHT: u32 = 2400;
const JPEG_QUALITY: u8 = 95;

#[derive(Debug, Clone)]
pub struct CoverImage {
    pub bytes: Vec<u8>,
    pub media_type: &'static str,
    pub file_name: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Decode an image, centre-crop it to 2:3, cap its height and re-encode it
/// as JPEG.
pub fn prepare_cover(raw: &[u8]) -> anyhow::Result<CoverImage> {
    let decoded = image::load_from_memory(raw).context("decode cover image")?;
    let image = DynamicImage::ImageRgb8(decoded.to_rgb8());

    let (width, height) = crop_box_dimensions(image.width(), image.height());
    let left = (image.width() - width) / 2;
    let top = (image.height() - height) / 2;
    let mut image = image.crop_imm(left, top, width, height);

    if image.height() > MAX_COVER_HEIGHT {
        let new_width = (u64::from(MAX_COVER_HEIGHT) * 2 / 3) as u32;
        image = image.resize_exact(new_width, MAX_COVER_HEIGHT, FilterType::Lanczos3);
    }

    let (width, height) = image.dimensions();
    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut bytes), JPEG_QUALITY);
    image
        .to_rgb8()
        .write_with_encoder(encoder)
        .context("encode cover jpeg")?;

    Ok(CoverImage {
        bytes,
        media_type: "image/jpeg",
        file_name: "cover.jpg",
        width,
        height,
    })
}

/// Largest 2:3 (width:height) box that fits in `width` x `height`.
fn crop_box_dimensions(width: u32, height: u32) -> (u32, u32) {
    let (w, h) = (u64::from(width), u64::from(height));
    if w * 3 > h * 2 {
        (((h * 2) / 3).max(1) as u32, height)
    } else {
        (width, ((w * 3) / 2).max(1).min(h) as u32)
    }
}
