//! Document decoding into fixed-size page bitmaps

use std::sync::Arc;

use image::imageops;
use log::{debug, info, warn};

use super::request::DecodeError;
use super::types::{Bitmap, Page, PageLayout, Viewport};

/// An opened document that can render individual pages.
///
/// Page indices on this trait are 0-based.
pub trait PageSource {
    fn page_count(&self) -> Result<usize, DecodeError>;

    /// Native page size in document units (width, height)
    fn page_size(&self, index: usize) -> Result<(f32, f32), DecodeError>;

    /// Render a page uniformly scaled by `scale`
    fn render_page(&self, index: usize, scale: f32) -> Result<Bitmap, DecodeError>;
}

/// Opens documents from an in-memory byte buffer.
///
/// Implementations are shared with the raster worker thread, the opened
/// [`PageSource`] never leaves the thread that opened it.
pub trait DocumentLoader: Send + Sync {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn PageSource>, DecodeError>;
}

/// Turns a document byte buffer into one viewport-sized bitmap per page
#[derive(Clone)]
pub struct PageRasterizer {
    loader: Arc<dyn DocumentLoader>,
}

impl PageRasterizer {
    #[must_use]
    pub fn new(loader: Arc<dyn DocumentLoader>) -> Self {
        Self { loader }
    }

    /// Rasterizer backed by MuPDF
    #[cfg(feature = "pdf")]
    #[must_use]
    pub fn mupdf() -> Self {
        Self::new(Arc::new(super::mupdf_backend::MupdfLoader))
    }

    /// Decode `bytes` and rasterize every page in order.
    ///
    /// Fails on the first page that cannot be rendered; pages rendered
    /// before the failure are dropped with the error.
    pub fn rasterize(&self, bytes: &[u8], viewport: Viewport) -> Result<Vec<Page>, DecodeError> {
        let source = self.loader.open(bytes)?;
        let page_count = source.page_count()?;
        if page_count == 0 {
            return Err(DecodeError::Empty);
        }

        info!(
            "Rasterizing {page_count} pages at {}x{}",
            viewport.width, viewport.height
        );

        let mut pages = Vec::with_capacity(page_count);
        for index in 0..page_count {
            match render_into_viewport(source.as_ref(), index, viewport) {
                Ok(bitmap) => pages.push(Page::new(index + 1, bitmap)),
                Err(e) => {
                    warn!(
                        "Page {} failed, discarding {} rendered pages: {e}",
                        index + 1,
                        pages.len()
                    );
                    return Err(e);
                }
            }
        }

        debug!("Rasterized {} pages", pages.len());
        Ok(pages)
    }
}

fn render_into_viewport(
    source: &dyn PageSource,
    index: usize,
    viewport: Viewport,
) -> Result<Bitmap, DecodeError> {
    let page_size = source.page_size(index)?;
    if page_size.0 <= 0.0 || page_size.1 <= 0.0 {
        return Err(DecodeError::page(
            index + 1,
            format!("degenerate page size {}x{}", page_size.0, page_size.1),
        ));
    }

    let layout = PageLayout::fit(page_size, viewport);
    let rendered = source.render_page(index, layout.scale)?;

    Ok(place_on_viewport(&rendered, &layout, viewport))
}

/// Copy a rendered page onto a transparent viewport-sized canvas at its
/// centered offset. Anything falling outside the viewport is cropped.
fn place_on_viewport(rendered: &Bitmap, layout: &PageLayout, viewport: Viewport) -> Bitmap {
    let mut canvas = Bitmap::new(viewport.width, viewport.height);
    let x = layout.offset_x.round() as i64;
    imageops::replace(&mut canvas, rendered, x, 0);
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_helpers::FixtureLoader;
    use image::Rgba;

    fn viewport() -> Viewport {
        Viewport::new(600, 700).unwrap()
    }

    #[test]
    fn every_page_matches_viewport_dimensions() {
        let loader = FixtureLoader::uniform(3, (612.0, 792.0));
        let rasterizer = PageRasterizer::new(Arc::new(loader));

        let pages = rasterizer.rasterize(b"%PDF", viewport()).unwrap();

        assert_eq!(pages.len(), 3);
        for (i, page) in pages.iter().enumerate() {
            assert_eq!(page.index(), i + 1);
            assert_eq!(page.bitmap().dimensions(), (600, 700));
        }
    }

    #[test]
    fn mixed_page_sizes_share_viewport_dimensions() {
        let sizes = vec![(612.0, 792.0), (792.0, 612.0), (300.0, 1400.0)];
        let loader = FixtureLoader::with_sizes(sizes.clone());
        let rasterizer = PageRasterizer::new(Arc::new(loader));

        let pages = rasterizer.rasterize(b"%PDF", viewport()).unwrap();

        assert_eq!(pages.len(), 3);
        for (i, (page, size)) in pages.iter().zip(sizes).enumerate() {
            let bitmap = page.bitmap();
            assert_eq!(bitmap.dimensions(), (600, 700), "page {}", i + 1);

            let left = PageLayout::fit(size, viewport()).offset_x.round().max(0.0) as u32;
            assert_eq!(*bitmap.get_pixel(left, 350), FixtureLoader::page_color(i));
            if left > 0 {
                assert_eq!(*bitmap.get_pixel(left - 1, 350), Rgba([0, 0, 0, 0]));
            }
        }
    }

    #[test]
    fn narrow_page_is_centered_with_transparent_margins() {
        // 300x700 page at scale 1 leaves 150px on each side
        let loader = FixtureLoader::uniform(1, (300.0, 700.0));
        let rasterizer = PageRasterizer::new(Arc::new(loader));

        let pages = rasterizer.rasterize(b"%PDF", viewport()).unwrap();
        let bitmap = pages[0].bitmap();

        assert_eq!(*bitmap.get_pixel(0, 10), Rgba([0, 0, 0, 0]));
        assert_eq!(*bitmap.get_pixel(149, 10), Rgba([0, 0, 0, 0]));
        assert_eq!(bitmap.get_pixel(150, 10)[3], 255);
        assert_eq!(bitmap.get_pixel(449, 10)[3], 255);
        assert_eq!(*bitmap.get_pixel(450, 10), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn failing_page_discards_partial_results() {
        let loader = FixtureLoader::uniform(4, (612.0, 792.0)).failing_on(2);
        let rasterizer = PageRasterizer::new(Arc::new(loader));

        let result = rasterizer.rasterize(b"%PDF", viewport());
        assert!(matches!(result, Err(DecodeError::Page { page: 3, .. })));
    }

    #[test]
    fn unreadable_buffer_is_a_decode_error() {
        let rasterizer = PageRasterizer::new(Arc::new(FixtureLoader::uniform(1, (10.0, 10.0))));
        assert!(rasterizer.rasterize(&[], viewport()).is_err());
    }

    #[test]
    fn zero_page_document_is_rejected() {
        let rasterizer = PageRasterizer::new(Arc::new(FixtureLoader::uniform(0, (10.0, 10.0))));
        assert!(matches!(
            rasterizer.rasterize(b"%PDF", viewport()),
            Err(DecodeError::Empty)
        ));
    }

    #[test]
    fn different_viewport_rerasterizes_at_new_size() {
        let rasterizer =
            PageRasterizer::new(Arc::new(FixtureLoader::uniform(2, (612.0, 792.0))));

        let small = rasterizer
            .rasterize(b"%PDF", Viewport::new(300, 350).unwrap())
            .unwrap();
        let large = rasterizer.rasterize(b"%PDF", viewport()).unwrap();

        assert_eq!(small[0].bitmap().dimensions(), (300, 350));
        assert_eq!(large[0].bitmap().dimensions(), (600, 700));
    }
}
