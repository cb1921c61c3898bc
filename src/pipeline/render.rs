//! Rasterise the first PDF page for the vision fallback.
//!
//! ## Why spawn_blocking?
//!
//! PDFium is a C++ library driven through FFI; rendering a page at 240 DPI is
//! CPU-bound work that would stall a Tokio worker. `spawn_blocking` moves it
//! to the blocking pool.
//!
//! ## Why bands?
//!
//! Share codes and dates are small print on a busy page. Besides the full
//! page, three overlapping horizontal bands (top 35 %, 30–75 %, bottom 30 %)
//! are sent so a model that downsamples large images still sees the field at
//! a readable size. The overlap keeps a line that straddles a cut whole in at
//! least one band.

use crate::error::RtwError;
use crate::pipeline::pdfium::{load_pdfium, map_load_error};
use image::{DynamicImage, GenericImageView};
use pdfium_render::prelude::*;
use std::sync::Arc;
use tracing::debug;

/// PDF points per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Vertical bands as (top, bottom) fractions of the page height.
pub const BANDS: [(f32, f32); 3] = [(0.0, 0.35), (0.30, 0.75), (0.70, 1.0)];

/// Render page 1 of a PDF at `dpi` and return the three bands followed by
/// the full page. An empty document gives no images.
pub async fn render_first_page(
    bytes: Arc<[u8]>,
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<DynamicImage>, RtwError> {
    tokio::task::spawn_blocking(move || render_first_page_blocking(&bytes, dpi, max_pixels))
        .await
        .map_err(|e| RtwError::Internal(format!("Render task panicked: {e}")))?
}

fn render_first_page_blocking(
    bytes: &[u8],
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<DynamicImage>, RtwError> {
    let pdfium = load_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(map_load_error)?;

    let pages = document.pages();
    if pages.len() == 0 {
        return Ok(Vec::new());
    }

    let page = pages.get(0).map_err(|e| RtwError::RasterisationFailed {
        page: 1,
        detail: format!("{:?}", e),
    })?;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / POINTS_PER_INCH)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| RtwError::RasterisationFailed {
            page: 1,
            detail: format!("{:?}", e),
        })?;

    let full = bitmap.as_image();
    debug!("Rendered page 1 → {}x{} px", full.width(), full.height());

    let mut images = crop_bands(&full);
    images.push(full);
    Ok(images)
}

/// Cut the [`BANDS`] out of a rendered page, top to bottom.
pub fn crop_bands(page: &DynamicImage) -> Vec<DynamicImage> {
    let (width, height) = page.dimensions();
    BANDS
        .iter()
        .filter_map(|&(top, bottom)| {
            let y0 = (height as f32 * top).round() as u32;
            let y1 = ((height as f32 * bottom).round() as u32).min(height);
            (y1 > y0).then(|| page.crop_imm(0, y0, width, y1 - y0))
        })
        .collect()
}
