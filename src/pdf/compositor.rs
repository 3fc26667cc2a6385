//! Scroll state and compositing of page bitmaps onto the display surface

use image::imageops;
use log::trace;

use super::types::{Bitmap, Page, Viewport};

/// Vertical scroll position in surface pixels.
///
/// Always within `[0, (page_count - 1) * page_height]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScrollState {
    offset: u32,
}

impl ScrollState {
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Largest valid offset for a strip of `page_count` pages
    #[must_use]
    pub fn max_offset(page_count: usize, page_height: u32) -> u32 {
        let slots = u64::try_from(page_count.saturating_sub(1)).unwrap_or(u64::MAX);
        let max = slots.saturating_mul(u64::from(page_height));
        u32::try_from(max).unwrap_or(u32::MAX)
    }

    /// Apply a scroll delta, saturating at both ends. Returns true if the offset moved.
    pub fn scroll_by(&mut self, delta: i64, page_count: usize, page_height: u32) -> bool {
        let max = i64::from(Self::max_offset(page_count, page_height));
        let target = i64::from(self.offset).saturating_add(delta).clamp(0, max);
        self.set(target as u32)
    }

    /// Jump to an absolute offset, clamped into range
    pub fn scroll_to(&mut self, offset: u32, page_count: usize, page_height: u32) -> bool {
        self.set(offset.min(Self::max_offset(page_count, page_height)))
    }

    fn set(&mut self, offset: u32) -> bool {
        if self.offset == offset {
            return false;
        }
        self.offset = offset;
        true
    }
}

/// Paints the visible window of a page strip onto a viewport-sized surface
pub struct ScrollCompositor {
    viewport: Viewport,
    pages: Vec<Page>,
    scroll: ScrollState,
    surface: Bitmap,
}

impl ScrollCompositor {
    /// Pages must already be rasterized at `viewport` size. They are laid
    /// out top to bottom in page-index order.
    #[must_use]
    pub fn new(viewport: Viewport, mut pages: Vec<Page>) -> Self {
        pages.sort_by_key(Page::index);
        let mut compositor = Self {
            viewport,
            pages,
            scroll: ScrollState::default(),
            surface: Bitmap::new(viewport.width, viewport.height),
        };
        compositor.redraw();
        compositor
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    #[must_use]
    pub fn scroll(&self) -> ScrollState {
        self.scroll
    }

    /// The surface as of the last redraw
    #[must_use]
    pub fn surface(&self) -> &Bitmap {
        &self.surface
    }

    pub fn scroll_by(&mut self, delta: i64) -> bool {
        self.scroll
            .scroll_by(delta, self.pages.len(), self.viewport.height)
    }

    pub fn scroll_to(&mut self, offset: u32) -> bool {
        self.scroll
            .scroll_to(offset, self.pages.len(), self.viewport.height)
    }

    /// Slots (0-based) of pages intersecting the viewport at the current offset
    #[must_use]
    pub fn visible_slots(&self) -> Vec<usize> {
        let height = i64::from(self.viewport.height);
        let offset = i64::from(self.scroll.offset());

        (0..self.pages.len())
            .filter(|&slot| {
                let top = slot as i64 * height - offset;
                let bottom = top + height;
                top < height && bottom > 0
            })
            .collect()
    }

    /// Repaint the surface from the current scroll state.
    ///
    /// Calling this repeatedly without a state change yields identical pixels.
    pub fn redraw(&mut self) -> &Bitmap {
        self.surface.fill(0);

        let height = i64::from(self.viewport.height);
        let offset = i64::from(self.scroll.offset());
        for slot in self.visible_slots() {
            let y = slot as i64 * height - offset;
            trace!("Compositing page slot {slot} at y={y}");
            imageops::replace(&mut self.surface, self.pages[slot].bitmap(), 0, y);
        }

        &self.surface
    }
}
