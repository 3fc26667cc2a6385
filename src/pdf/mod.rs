//! Paginated surface: rasterization, scrolling, and region selection

mod compositor;
#[cfg(feature = "pdf")]
mod mupdf_backend;
mod rasterizer;
mod region;
mod request;
mod selection;
mod service;
mod types;
mod worker;

pub use compositor::{ScrollCompositor, ScrollState};
#[cfg(feature = "pdf")]
pub use mupdf_backend::MupdfLoader;
pub use rasterizer::{DocumentLoader, PageRasterizer, PageSource};
pub use region::ImageRegion;
pub use request::{DecodeError, Generation, RasterRequest, RasterResponse};
pub use selection::{
    CancelReason, DEFAULT_MIN_SELECTION, DragSelection, ScreenPoint, SelectionOutcome,
    SelectionRect, SelectionThresholds, SelectionTracker, page_number_at,
};
pub use service::{RasterOutcome, RasterService};
pub use types::*;
