use base64::{engine::general_purpose, Engine as _};
use image::GenericImageView;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Unsupported image format: {0}")]
    Unsupported(String),
    #[error("Image could not be decoded: {0}")]
    Decode(String),
    #[error("Upload could not be read: {0}")]
    Multipart(String),
}

/// A decoded upload, kept only for the lifetime of one request.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: Option<String>,
    pub width: u32,
    pub height: u32,
}

impl UploadedImage {
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }

    pub fn display_name(&self) -> &str {
        self.file_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("upload")
    }
}

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    infer::get(data).map(|kind| kind.mime_type().to_string())
}

fn normalize_image_mime_type(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "image/x-png" => "image/png".to_string(),
        _ => lowered,
    }
}

fn is_supported_mime(mime_type: &str) -> bool {
    matches!(mime_type, "image/jpeg" | "image/png")
}

pub fn decode_upload(bytes: Vec<u8>, file_name: Option<String>) -> Result<UploadedImage, UploadError> {
    let mime_type = detect_mime_type(&bytes)
        .map(|mime| normalize_image_mime_type(&mime))
        .ok_or_else(|| UploadError::Unsupported("unknown".to_string()))?;
    if !is_supported_mime(&mime_type) {
        return Err(UploadError::Unsupported(mime_type));
    }

    let decoded =
        image::load_from_memory(&bytes).map_err(|err| UploadError::Decode(err.to_string()))?;
    let (width, height) = decoded.dimensions();
    debug!(
        "Decoded upload {:?}: mime={} size={}x{} bytes={}",
        file_name,
        mime_type,
        width,
        height,
        bytes.len()
    );

    Ok(UploadedImage {
        bytes,
        mime_type,
        file_name,
        width,
        height,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, RgbImage};

    use super::*;

    pub(crate) fn encoded_image(format: ImageFormat, width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 120, 40])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format)
            .expect("encode test image");
        buf
    }

    #[test]
    fn accepts_png_and_reads_dimensions() {
        let bytes = encoded_image(ImageFormat::Png, 3, 2);
        let upload = decode_upload(bytes, Some("face.png".to_string())).unwrap();
        assert_eq!(upload.mime_type, "image/png");
        assert_eq!((upload.width, upload.height), (3, 2));
        assert_eq!(upload.display_name(), "face.png");
        assert!(upload.data_uri().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn accepts_jpeg() {
        let bytes = encoded_image(ImageFormat::Jpeg, 4, 4);
        let upload = decode_upload(bytes, None).unwrap();
        assert_eq!(upload.mime_type, "image/jpeg");
        assert_eq!(upload.display_name(), "upload");
    }

    #[test]
    fn rejects_other_image_formats() {
        let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;".to_vec();
        match decode_upload(gif, None) {
            Err(UploadError::Unsupported(mime)) => assert_eq!(mime, "image/gif"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rejects_unrecognized_bytes() {
        let result = decode_upload(b"definitely not an image".to_vec(), None);
        assert!(matches!(result, Err(UploadError::Unsupported(_))));
    }

    #[test]
    fn truncated_png_fails_to_decode() {
        let mut bytes = encoded_image(ImageFormat::Png, 8, 8);
        bytes.truncate(24);
        let result = decode_upload(bytes, None);
        assert!(matches!(result, Err(UploadError::Decode(_))));
    }

    #[test]
    fn normalizes_legacy_jpeg_mime() {
        assert_eq!(normalize_image_mime_type(" IMAGE/JPG "), "image/jpeg");
        assert_eq!(normalize_image_mime_type("image/png"), "image/png");
    }
}
