//! Rasterizer: turns each page of a source PDF into an RGB PNG raster at a
//! configured DPI. Page rendering through `pdfium-render` happens on a
//! single document handle (pdfium documents aren't `Send`/`Sync`, so pages
//! render one at a time); PNG encoding of the resulting raw buffers is
//! CPU-bound and independent per page, so that part runs across the
//! `rayon` pool. Rendering pattern grounded on
//! `examples/dropbox-dKNOW`'s `sg-core::ocr::PdfOcrEngine::render_page_to_image`.

use pdfium_render::prelude::*;
use rayon::prelude::*;

use crate::error::{AppError, Result};

/// One rendered page: 1-indexed page number plus encoded PNG bytes.
pub struct RasterPage {
    pub page_number: i32,
    pub png_bytes: Vec<u8>,
}

pub struct Rasterizer {
    pdfium: Pdfium,
    dpi: u32,
}

impl Rasterizer {
    pub fn new(dpi: u32) -> Result<Self> {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| AppError::Permanent(format!("failed to bind pdfium library: {e}")))?;
        Ok(Self {
            pdfium: Pdfium::new(bindings),
            dpi,
        })
    }

    /// Render every page of `pdf_bytes` to PNG. Returns pages in order,
    /// 1-indexed.
    pub fn rasterize(&self, pdf_bytes: &[u8]) -> Result<Vec<RasterPage>> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(|e| AppError::Permanent(format!("failed to load pdf: {e}")))?;

        let scale = self.dpi as f32 / 72.0;
        let mut raw_images = Vec::with_capacity(document.pages().len() as usize);

        for page in document.pages().iter() {
            let pixel_width = (page.width().value * scale) as i32;
            let pixel_height = (page.height().value * scale) as i32;
            let bitmap = page
                .render_with_config(
                    &PdfRenderConfig::new()
                        .set_target_width(pixel_width)
                        .set_target_height(pixel_height)
                        .render_form_data(true),
                )
                .map_err(|e| AppError::Permanent(format!("failed to render page: {e}")))?;
            raw_images.push(bitmap.as_image());
        }

        raw_images
            .into_par_iter()
            .enumerate()
            .map(|(idx, image)| {
                let mut buf = Vec::new();
                image
                    .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
                    .map_err(|e| AppError::Permanent(format!("failed to encode page png: {e}")))?;
                Ok(RasterPage {
                    page_number: (idx + 1) as i32,
                    png_bytes: buf,
                })
            })
            .collect()
    }

    pub fn page_count(&self, pdf_bytes: &[u8]) -> Result<i32> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(|e| AppError::Permanent(format!("failed to load pdf: {e}")))?;
        Ok(document.pages().len() as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A real rasterize() round trip needs the pdfium shared library present
    // on the host, so it's exercised as an ignored integration test rather
    // than unit-tested here.
    #[test]
    #[ignore]
    fn rasterize_a_real_pdf() {
        let rasterizer = Rasterizer::new(200).unwrap();
        let bytes = std::fs::read("tests/fixtures/sample.pdf").unwrap();
        let pages = rasterizer.rasterize(&bytes).unwrap();
        assert!(!pages.is_empty());
        assert!(pages[0].png_bytes.starts_with(&[0x89, b'P', b'N', b'G']));
    }
}
