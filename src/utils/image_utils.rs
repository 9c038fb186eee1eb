// utils/image_utils.rs
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;

/// A decoded, format-checked image ready for storage.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl DecodedImage {
    pub fn extension(&self) -> &'static str {
        match self.format {
            ImageFormat::Png => "png",
            ImageFormat::WebP => "webp",
            _ => "jpg",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self.format {
            ImageFormat::Png => "image/png",
            ImageFormat::WebP => "image/webp",
            _ => "image/jpeg",
        }
    }
}

/// Strips a `data:image/...;base64,` prefix if present.
pub fn strip_data_url(base64_data: &str) -> &str {
    if base64_data.starts_with("data:") {
        base64_data.split(',').nth(1).unwrap_or(base64_data)
    } else {
        base64_data
    }
}

pub fn validate_image_size(base64_data: &str, max_bytes: usize) -> bool {
    let clean_data = strip_data_url(base64_data);
    let size_in_bytes = (clean_data.len() * 3) / 4; // Approximate base64 size
    size_in_bytes <= max_bytes
}

/// Decodes base64 (data-URL tolerant) and accepts only JPEG, PNG or WebP.
pub fn decode_image(base64_data: &str, max_bytes: usize) -> Result<DecodedImage, String> {
    if !validate_image_size(base64_data, max_bytes) {
        return Err(format!("Image exceeds the {} byte limit", max_bytes));
    }

    let bytes = STANDARD
        .decode(strip_data_url(base64_data).trim())
        .map_err(|e| format!("Failed to decode base64: {}", e))?;

    if bytes.is_empty() {
        return Err("Image is empty".to_string());
    }

    let format = image::guess_format(&bytes).map_err(|_| "Unrecognised image format".to_string())?;
    match format {
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP => Ok(DecodedImage { bytes, format }),
        other => Err(format!("Unsupported image format {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 8-byte PNG signature is all `guess_format` needs.
    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_decode_png_with_data_url_prefix() {
        let encoded = format!("data:image/png;base64,{}", STANDARD.encode(PNG_MAGIC));
        let image = decode_image(&encoded, 1024).unwrap();
        assert_eq!(image.extension(), "png");
        assert_eq!(image.content_type(), "image/png");
    }

    #[test]
    fn test_rejects_non_image_bytes() {
        let encoded = STANDARD.encode(b"definitely not an image");
        assert!(decode_image(&encoded, 1024).is_err());
    }

    #[test]
    fn test_rejects_oversized_payload() {
        let encoded = STANDARD.encode(vec![0u8; 4096]);
        assert!(!validate_image_size(&encoded, 1024));
        assert!(decode_image(&encoded, 1024).unwrap_err().contains("limit"));
    }

    #[test]
    fn test_rejects_bad_base64() {
        assert!(decode_image("!!!", 1024).unwrap_err().contains("base64"));
    }
}
