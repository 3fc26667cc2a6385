//! Viewer state: wires scrolling and selection to the display boundary
//!
//! Input arrives as [`Command`]s; what the surrounding UI has to do in
//! response comes back as [`Effect`]s.

use log::{debug, warn};

use crate::pdf::{
    Bitmap, ImageRegion, Page, ScreenPoint, ScrollCompositor, SelectionOutcome, SelectionRect,
    SelectionThresholds, SelectionTracker, Viewport,
};
use crate::settings::Settings;

/// Input events for the viewer
#[derive(Clone, Debug)]
pub enum Command {
    /// Viewport changed; pages must be rasterized again
    SetViewport(Viewport),
    /// A rasterization pass finished
    PagesLoaded(Vec<Page>),
    /// Scroll by a pixel delta
    Scroll(i64),
    /// Scroll by wheel notches of the configured step
    ScrollSteps(i32),
    PointerDown {
        at: ScreenPoint,
        surface_origin: ScreenPoint,
    },
    PointerMove(ScreenPoint),
    PointerUp,
}

/// Effects produced by commands
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Surface contents changed
    Redraw,
    /// Selection overlay moved or disappeared
    SelectionChanged,
    /// Pages are stale; rasterize the document for this viewport
    Rasterize(Viewport),
    /// A region was selected; open commentary for it
    CommentaryOpened(ImageRegion),
    /// Selection cancelled; close any open commentary
    CommentaryClosed,
}

pub struct Viewer {
    viewport: Viewport,
    compositor: Option<ScrollCompositor>,
    selection: SelectionTracker,
    scroll_step: u32,
}

impl Viewer {
    #[must_use]
    pub fn new(viewport: Viewport, thresholds: SelectionThresholds, scroll_step: u32) -> Self {
        Self {
            viewport,
            compositor: None,
            selection: SelectionTracker::new(thresholds),
            scroll_step,
        }
    }

    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.viewport(),
            settings.selection_thresholds(),
            settings.scroll_step,
        )
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.compositor
            .as_ref()
            .map_or(0, ScrollCompositor::page_count)
    }

    #[must_use]
    pub fn scroll_offset(&self) -> u32 {
        self.compositor
            .as_ref()
            .map_or(0, |c| c.scroll().offset())
    }

    /// Page (1-based) at the top edge of the surface
    #[must_use]
    pub fn current_page(&self) -> Option<usize> {
        let compositor = self.compositor.as_ref()?;
        let page = (compositor.scroll().offset() / self.viewport.height) as usize + 1;
        Some(page.min(compositor.page_count()))
    }

    #[must_use]
    pub fn surface(&self) -> Option<&Bitmap> {
        self.compositor.as_ref().map(ScrollCompositor::surface)
    }

    /// Where to draw the selection overlay, if a drag is in progress
    #[must_use]
    pub fn overlay(&self) -> Option<SelectionRect> {
        self.selection
            .drag()
            .map(|drag| drag.overlay(self.scroll_offset()))
    }

    #[must_use]
    pub fn is_dragging(&self) -> bool {
        self.selection.is_dragging()
    }

    /// Apply a command and return resulting effects
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::SetViewport(viewport) => {
                if self.viewport == viewport {
                    return vec![];
                }
                self.viewport = viewport;
                self.compositor = None;
                self.selection.reset();
                vec![Effect::Redraw, Effect::Rasterize(viewport)]
            }

            Command::PagesLoaded(pages) => {
                let stale = pages
                    .iter()
                    .any(|p| p.bitmap().dimensions() != self.viewport.as_tuple());
                if stale {
                    warn!(
                        "Dropping {} pages not rasterized at {}x{}",
                        pages.len(),
                        self.viewport.width,
                        self.viewport.height
                    );
                    return vec![];
                }

                debug!("Loaded {} pages", pages.len());
                self.selection.reset();
                self.compositor = Some(ScrollCompositor::new(self.viewport, pages));
                vec![Effect::Redraw]
            }

            Command::Scroll(delta) => self.scroll(delta),

            Command::ScrollSteps(steps) => {
                self.scroll(i64::from(steps) * i64::from(self.scroll_step))
            }

            Command::PointerDown { at, surface_origin } => {
                let Some(compositor) = self.compositor.as_ref() else {
                    return vec![];
                };
                self.selection
                    .pointer_down(at, surface_origin, compositor.scroll().offset());
                vec![Effect::SelectionChanged]
            }

            Command::PointerMove(at) => {
                if self.selection.pointer_move(at) {
                    vec![Effect::SelectionChanged]
                } else {
                    vec![]
                }
            }

            Command::PointerUp => {
                let Some(compositor) = self.compositor.as_ref() else {
                    self.selection.reset();
                    return vec![];
                };
                match self.selection.pointer_up(compositor) {
                    Some(SelectionOutcome::Captured(region)) => {
                        vec![Effect::SelectionChanged, Effect::CommentaryOpened(region)]
                    }
                    Some(SelectionOutcome::Cancelled(reason)) => {
                        debug!("Selection cancelled: {reason:?}");
                        vec![Effect::SelectionChanged, Effect::CommentaryClosed]
                    }
                    None => vec![],
                }
            }
        }
    }

    fn scroll(&mut self, delta: i64) -> Vec<Effect> {
        let Some(compositor) = self.compositor.as_mut() else {
            return vec![];
        };
        if !compositor.scroll_by(delta) {
            return vec![];
        }
        compositor.redraw();

        let mut effects = vec![Effect::Redraw];
        if self.selection.is_dragging() {
            effects.push(Effect::SelectionChanged);
        }
        effects
    }
}
