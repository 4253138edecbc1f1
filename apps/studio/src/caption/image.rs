//! Uploaded image handling: format sniffing, RGB normalization and the
//! content fingerprint that identifies an image across requests.

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use image::{ImageFormat, ImageReader, RgbImage};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Lowercase hex MD5 of the raw upload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        Self(format!("{:x}", md5::compute(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An image as uploaded by the user, decoded once into 3-channel RGB.
///
/// Cloning is cheap: both the raw bytes and the pixels are shared.
#[derive(Clone)]
pub struct UploadedImage {
    bytes: Bytes,
    fingerprint: Fingerprint,
    format: ImageFormat,
    rgb: Arc<RgbImage>,
}

impl fmt::Debug for UploadedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedImage")
            .field("fingerprint", &self.fingerprint)
            .field("format", &self.format)
            .field("dimensions", &self.rgb.dimensions())
            .field("byte_len", &self.bytes.len())
            .finish()
    }
}

impl UploadedImage {
    /// Sniffs the format (PNG or JPEG only), decodes and converts to RGB.
    pub fn from_bytes(bytes: Bytes) -> Result<Self, AppError> {
        if bytes.is_empty() {
            return Err(AppError::Validation("Uploaded image is empty".to_string()));
        }

        let format = image::guess_format(&bytes).map_err(|_| {
            AppError::Validation("Unsupported image format; upload a PNG or JPEG".to_string())
        })?;
        if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
            return Err(AppError::Validation(format!(
                "Unsupported image format {format:?}; upload a PNG or JPEG"
            )));
        }

        let mut reader = ImageReader::new(Cursor::new(bytes.as_ref()));
        reader.set_format(format);
        let decoded = reader
            .decode()
            .map_err(|e| AppError::UnprocessableEntity(format!("Could not decode image: {e}")))?;

        Ok(Self {
            fingerprint: Fingerprint::of(&bytes),
            rgb: Arc::new(decoded.to_rgb8()),
            format,
            bytes,
        })
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn rgb(&self) -> &RgbImage {
        &self.rgb
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }
}

/// Encodes a small solid-colour image; shared by tests across modules.
#[cfg(test)]
pub(crate) fn test_image_bytes(format: ImageFormat, rgb: [u8; 3]) -> Bytes {
    let img = RgbImage::from_pixel(8, 6, image::Rgb(rgb));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    Bytes::from(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_md5_hex() {
        assert_eq!(
            Fingerprint::of(b"hello").as_str(),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[test]
    fn test_png_is_decoded_to_rgb() {
        let bytes = test_image_bytes(ImageFormat::Png, [10, 200, 30]);
        let image = UploadedImage::from_bytes(bytes.clone()).unwrap();
        assert_eq!(image.format(), ImageFormat::Png);
        assert_eq!(image.rgb().dimensions(), (8, 6));
        assert_eq!(image.rgb().get_pixel(0, 0).0, [10, 200, 30]);
        assert_eq!(image.fingerprint(), &Fingerprint::of(&bytes));
        assert_eq!(image.byte_len(), bytes.len());
    }

    #[test]
    fn test_jpeg_is_accepted() {
        let bytes = test_image_bytes(ImageFormat::Jpeg, [120, 120, 120]);
        let image = UploadedImage::from_bytes(bytes).unwrap();
        assert_eq!(image.format(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_identity_follows_content_not_object() {
        let a = UploadedImage::from_bytes(test_image_bytes(ImageFormat::Png, [1, 2, 3])).unwrap();
        let b = UploadedImage::from_bytes(test_image_bytes(ImageFormat::Png, [1, 2, 3])).unwrap();
        let c = UploadedImage::from_bytes(test_image_bytes(ImageFormat::Png, [3, 2, 1])).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_non_image_bytes_are_rejected() {
        let err = UploadedImage::from_bytes(Bytes::from_static(b"not an image")).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_other_formats_are_rejected() {
        // GIF magic bytes sniff correctly but are not an accepted upload type.
        let err = UploadedImage::from_bytes(Bytes::from_static(b"GIF89a\x01\x00\x01\x00")).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_truncated_png_is_unprocessable() {
        let bytes = test_image_bytes(ImageFormat::Png, [0, 0, 0]);
        let truncated = bytes.slice(..bytes.len() / 2);
        let err = UploadedImage::from_bytes(truncated).unwrap_err();
        assert!(matches!(err, AppError::UnprocessableEntity(_)));
    }

    #[test]
    fn test_empty_upload_is_rejected() {
        let err = UploadedImage::from_bytes(Bytes::new()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
