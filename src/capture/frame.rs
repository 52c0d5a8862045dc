use super::{CaptureError, RawFrame};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};

/// Fixed lossy quality for submitted stills
pub const JPEG_QUALITY: u8 = 80;

/// Encoded still submitted to the backend
#[derive(Debug, Clone)]
pub struct JpegFrame {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub fn encode_jpeg(frame: &RawFrame) -> Result<JpegFrame, CaptureError> {
    if frame.width == 0 || frame.height == 0 {
        return Err(CaptureError::NotReady);
    }

    let rgba = RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone())
        .ok_or_else(|| CaptureError::Encoding("frame buffer size mismatch".to_string()))?;
    let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();

    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
    encoder
        .encode_image(&DynamicImage::ImageRgb8(rgb))
        .map_err(|e| CaptureError::Encoding(e.to_string()))?;

    Ok(JpegFrame {
        bytes,
        width: frame.width,
        height: frame.height,
    })
}
