use base64::Engine as _;
use image::RgbImage;
use md5::{Digest, Md5};

use crate::errors::{LocatorError, LocatorResult};
use crate::perception::types::ScreenDims;

/// A base64 screen capture together with its content hash.
#[derive(Debug, Clone)]
pub struct Capture {
    pub base64: String,
    /// MD5 hex digest of the base64 text; the remote service keys cached
    /// predictions by it.
    pub hash: String,
}

impl Capture {
    pub fn new(base64: String) -> Self {
        let hash = content_hash(&base64);
        Self { base64, hash }
    }

    pub fn decode(&self) -> LocatorResult<RgbImage> {
        decode_base64_image(&self.base64)
    }

    pub fn dims(&self) -> LocatorResult<ScreenDims> {
        let img = self.decode()?;
        Ok(ScreenDims::new(img.width(), img.height()))
    }
}

pub fn content_hash(base64: &str) -> String {
    format!("{:x}", Md5::digest(base64.as_bytes()))
}

pub fn decode_base64(base64: &str) -> LocatorResult<Vec<u8>> {
    let cleaned: String = base64.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(cleaned)?)
}

pub fn decode_base64_image(base64: &str) -> LocatorResult<RgbImage> {
    let bytes = decode_base64(base64)?;
    decode_image_bytes(&bytes)
}

pub fn decode_image_bytes(bytes: &[u8]) -> LocatorResult<RgbImage> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| LocatorError::Image(format!("decode: {e}")))?;
    Ok(img.to_rgb8())
}

/// PNG-encode and base64 an image; used for synthetic captures and tests.
pub fn encode_png_base64(img: &RgbImage) -> LocatorResult<String> {
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(buf.into_inner()))
}
