//! Image encoding: rendered pages → PNG bytes → base64 `ImageData`.
//!
//! Multimodal chat APIs accept images as base64 payloads embedded in the JSON
//! request body. PNG is used for rendered pages because it is lossless:
//! a JPEG artefact on a `0` or an `O` is exactly the confusion a share code
//! cannot afford.

use crate::error::RtwError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// PNG-encode a rendered page or band.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, RtwError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| RtwError::ImageEncoding(e.to_string()))?;
    Ok(buf)
}

/// Wrap raw image bytes for the chat API.
///
/// `detail: "high"` asks tiling models to keep fine print instead of a
/// single low-resolution overview tile.
pub fn image_data(bytes: &[u8], mime: &str) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded {} image → {} bytes base64", mime, b64.len());
    ImageData::new(b64, mime).with_detail("high")
}
