//! Core types for page rasterization

use image::RgbaImage;

/// Pixel buffer for a rendered page or the display surface (RGBA, 4 bytes per pixel)
pub type Bitmap = RgbaImage;

/// Fixed pixel dimensions used to rasterize and display pages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Create a viewport, rejecting degenerate dimensions
    #[must_use]
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self { width, height })
    }

    #[must_use]
    pub const fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// One decoded, bitmap-rendered page of the source document
#[derive(Clone)]
pub struct Page {
    /// Page index (1-based)
    index: usize,
    bitmap: Bitmap,
}

impl Page {
    #[must_use]
    pub fn new(index: usize, bitmap: Bitmap) -> Self {
        Self { index, bitmap }
    }

    /// Page index (1-based)
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("index", &self.index)
            .field("width", &self.bitmap.width())
            .field("height", &self.bitmap.height())
            .finish_non_exhaustive()
    }
}

/// Placement of a page inside the viewport.
///
/// Pages are scaled uniformly to fill the viewport height and centered
/// horizontally. A page wider than the viewport gets a negative offset
/// and is cropped on both sides.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageLayout {
    pub scale: f32,
    pub offset_x: f32,
}

impl PageLayout {
    #[must_use]
    pub fn fit(page_size: (f32, f32), viewport: Viewport) -> Self {
        let (page_width, page_height) = page_size;
        let view_width = viewport.width as f32;
        let view_height = viewport.height as f32;

        let scale = if page_height > 0.0 {
            view_height / page_height
        } else {
            1.0
        };
        let offset_x = (view_width - page_width * scale) / 2.0;

        Self { scale, offset_x }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_rejects_zero_dimensions() {
        assert!(Viewport::new(0, 700).is_none());
        assert!(Viewport::new(600, 0).is_none());
        assert_eq!(Viewport::new(600, 700).map(Viewport::as_tuple), Some((600, 700)));
    }

    #[test]
    fn layout_fills_height_and_centers() {
        let viewport = Viewport::new(600, 700).unwrap();
        // US letter: 612 x 792 points
        let layout = PageLayout::fit((612.0, 792.0), viewport);

        assert!((layout.scale - 700.0 / 792.0).abs() < 1e-6);
        let expected_offset = (600.0 - 612.0 * layout.scale) / 2.0;
        assert!((layout.offset_x - expected_offset).abs() < 1e-4);
        assert!(layout.offset_x > 0.0);
    }

    #[test]
    fn wide_page_gets_negative_offset() {
        let viewport = Viewport::new(600, 700).unwrap();
        let layout = PageLayout::fit((1400.0, 700.0), viewport);

        assert!((layout.scale - 1.0).abs() < f32::EPSILON);
        assert!((layout.offset_x - -400.0).abs() < f32::EPSILON);
    }
}
