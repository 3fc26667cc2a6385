//! Rectangular region selection over the display surface

use image::imageops;
use log::{debug, info};

use super::compositor::ScrollCompositor;
use super::region::ImageRegion;

/// Default minimum selection extent in pixels
pub const DEFAULT_MIN_SELECTION: u32 = 10;

/// A pointer position in screen coordinates
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScreenPoint {
    pub x: i32,
    pub y: i32,
}

impl ScreenPoint {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Rectangle in surface coordinates (origin at the surface's top-left)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectionRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl SelectionRect {
    /// The part of this rectangle inside a `width` x `height` surface
    #[must_use]
    pub fn clipped_to(self, width: u32, height: u32) -> Option<SelectionRect> {
        let left = i64::from(self.x).max(0);
        let top = i64::from(self.y).max(0);
        let right = (i64::from(self.x) + i64::from(self.width)).min(i64::from(width));
        let bottom = (i64::from(self.y) + i64::from(self.height)).min(i64::from(height));
        if right <= left || bottom <= top {
            return None;
        }

        Some(SelectionRect {
            x: i32::try_from(left).ok()?,
            y: i32::try_from(top).ok()?,
            width: u32::try_from(right - left).ok()?,
            height: u32::try_from(bottom - top).ok()?,
        })
    }
}

/// Minimum selection size below which a drag is cancelled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectionThresholds {
    pub min_width: u32,
    pub min_height: u32,
}

impl Default for SelectionThresholds {
    fn default() -> Self {
        Self {
            min_width: DEFAULT_MIN_SELECTION,
            min_height: DEFAULT_MIN_SELECTION,
        }
    }
}

/// In-progress drag gesture
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DragSelection {
    /// Where the pointer went down
    pub anchor: ScreenPoint,
    /// Latest pointer position
    pub current: ScreenPoint,
    /// Surface top-left in screen coordinates at drag start
    pub surface_origin: ScreenPoint,
    /// Scroll offset when the drag started
    pub scroll_at_drag_start: u32,
}

impl DragSelection {
    /// Selection rectangle with the min corner as origin, in surface coordinates
    #[must_use]
    pub fn normalized(&self) -> SelectionRect {
        let left = self.anchor.x.min(self.current.x);
        let top = self.anchor.y.min(self.current.y);

        SelectionRect {
            x: left.saturating_sub(self.surface_origin.x),
            y: top.saturating_sub(self.surface_origin.y),
            width: self.anchor.x.abs_diff(self.current.x),
            height: self.anchor.y.abs_diff(self.current.y),
        }
    }

    /// Where to draw the selection overlay when the surface is scrolled to
    /// `live_scroll`. The overlay follows the content it was drawn over.
    #[must_use]
    pub fn overlay(&self, live_scroll: u32) -> SelectionRect {
        let mut rect = self.normalized();
        let drift = i64::from(live_scroll) - i64::from(self.scroll_at_drag_start);
        rect.y = (i64::from(rect.y) - drift).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        rect
    }
}

/// Why a finished drag produced no region
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// Below the configured minimum width or height
    TooSmall,
    /// Zero-sized rectangle after normalization
    InvalidGeometry,
}

/// Result of releasing the pointer
#[derive(Clone, Debug, PartialEq)]
pub enum SelectionOutcome {
    Captured(ImageRegion),
    Cancelled(CancelReason),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum TrackerState {
    #[default]
    Idle,
    Dragging(DragSelection),
}

/// Idle -> Dragging -> Idle state machine for one input surface
#[derive(Clone, Debug, Default)]
pub struct SelectionTracker {
    state: TrackerState,
    thresholds: SelectionThresholds,
}

impl SelectionTracker {
    #[must_use]
    pub fn new(thresholds: SelectionThresholds) -> Self {
        Self {
            state: TrackerState::Idle,
            thresholds,
        }
    }

    #[must_use]
    pub fn thresholds(&self) -> SelectionThresholds {
        self.thresholds
    }

    #[must_use]
    pub fn is_dragging(&self) -> bool {
        matches!(self.state, TrackerState::Dragging(_))
    }

    /// The gesture in progress, if any
    #[must_use]
    pub fn drag(&self) -> Option<&DragSelection> {
        match &self.state {
            TrackerState::Dragging(drag) => Some(drag),
            TrackerState::Idle => None,
        }
    }

    /// Start a drag. A pointer-down while already dragging aborts the old
    /// gesture and starts over; returns true in that case.
    pub fn pointer_down(
        &mut self,
        at: ScreenPoint,
        surface_origin: ScreenPoint,
        scroll_offset: u32,
    ) -> bool {
        let restarted = self.is_dragging();
        if restarted {
            debug!("Pointer down during drag, restarting gesture at {at:?}");
        }

        self.state = TrackerState::Dragging(DragSelection {
            anchor: at,
            current: at,
            surface_origin,
            scroll_at_drag_start: scroll_offset,
        });
        restarted
    }

    /// Track the pointer. Ignored unless dragging.
    pub fn pointer_move(&mut self, at: ScreenPoint) -> bool {
        match &mut self.state {
            TrackerState::Dragging(drag) => {
                drag.current = at;
                true
            }
            TrackerState::Idle => false,
        }
    }

    /// Finish the drag and capture the selected region from the surface.
    ///
    /// Returns `None` when no drag was in progress.
    pub fn pointer_up(&mut self, compositor: &ScrollCompositor) -> Option<SelectionOutcome> {
        let TrackerState::Dragging(drag) = std::mem::take(&mut self.state) else {
            return None;
        };

        let rect = drag.normalized();
        if rect.width == 0 || rect.height == 0 {
            info!("Selection cancelled: empty rectangle {rect:?}");
            return Some(SelectionOutcome::Cancelled(CancelReason::InvalidGeometry));
        }
        if rect.width < self.thresholds.min_width || rect.height < self.thresholds.min_height {
            info!(
                "Selection cancelled: {}x{} below minimum {}x{}",
                rect.width, rect.height, self.thresholds.min_width, self.thresholds.min_height
            );
            return Some(SelectionOutcome::Cancelled(CancelReason::TooSmall));
        }

        let surface = compositor.surface();
        let Some(visible) = rect.clipped_to(surface.width(), surface.height()) else {
            info!("Selection cancelled: {rect:?} lies outside the surface");
            return Some(SelectionOutcome::Cancelled(CancelReason::InvalidGeometry));
        };

        let page_number = page_number_at(
            drag.scroll_at_drag_start,
            visible.y,
            compositor.viewport().height,
            compositor.page_count(),
        );
        let pixels = imageops::crop_imm(
            surface,
            visible.x as u32,
            visible.y as u32,
            visible.width,
            visible.height,
        )
        .to_image();

        info!(
            "Captured {}x{} region at ({}, {}) on page {page_number}",
            visible.width, visible.height, visible.x, visible.y
        );
        Some(SelectionOutcome::Captured(ImageRegion::new(pixels, page_number)))
    }

    /// Drop any gesture in progress without producing an outcome
    pub fn reset(&mut self) {
        self.state = TrackerState::Idle;
    }
}

/// Page (1-based) under surface row `rel_y` given the scroll offset at drag start.
///
/// `floor((scroll + rel_y) / page_height) + 1`, clamped to the document.
#[must_use]
pub fn page_number_at(
    scroll_at_drag_start: u32,
    rel_y: i32,
    page_height: u32,
    page_count: usize,
) -> usize {
    let absolute = i64::from(scroll_at_drag_start) + i64::from(rel_y);
    let slot = absolute.div_euclid(i64::from(page_height.max(1)));
    let last = page_count.max(1) as i64;
    (slot + 1).clamp(1, last) as usize
}
