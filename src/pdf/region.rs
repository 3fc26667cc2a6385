//! Extracted selection regions

use std::io::Cursor;

use image::{ImageFormat, ImageResult};

use super::types::Bitmap;

/// A pixel rectangle cut from the display surface plus the page it was taken from
#[derive(Clone, PartialEq)]
pub struct ImageRegion {
    pixels: Bitmap,
    /// Page number (1-based)
    pub page_number: usize,
}

impl ImageRegion {
    #[must_use]
    pub fn new(pixels: Bitmap, page_number: usize) -> Self {
        Self {
            pixels,
            page_number,
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    #[must_use]
    pub fn pixels(&self) -> &Bitmap {
        &self.pixels
    }

    /// Encode the region as PNG for the inference request
    pub fn to_png(&self) -> ImageResult<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.pixels.write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }
}

impl std::fmt::Debug for ImageRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageRegion")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("page_number", &self.page_number)
            .finish_non_exhaustive()
    }
}
