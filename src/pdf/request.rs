//! Rasterization request and response types

use std::sync::Arc;

use super::types::{Page, Viewport};

/// Identifies one rasterization pass.
///
/// Every new document or viewport bumps the generation; completions
/// carrying an older generation are stale and must be dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(pub u64);

impl Generation {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Errors raised while decoding or rasterizing a document
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[cfg(feature = "pdf")]
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),

    #[error("document has no pages")]
    Empty,

    #[error("page {page} failed to render: {detail}")]
    Page { page: usize, detail: String },

    #[error("{detail}")]
    Generic { detail: String },
}

impl DecodeError {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }

    pub fn page(page: usize, msg: impl Into<String>) -> Self {
        Self::Page {
            page,
            detail: msg.into(),
        }
    }
}

/// Request sent to the raster worker
#[derive(Debug)]
pub enum RasterRequest {
    /// Decode the document and rasterize every page
    Document {
        generation: Generation,
        bytes: Arc<[u8]>,
        viewport: Viewport,
    },

    /// Shutdown the worker
    Shutdown,
}

/// Response from the raster worker
#[derive(Debug)]
pub enum RasterResponse {
    /// All pages rasterized
    Pages {
        generation: Generation,
        viewport: Viewport,
        pages: Vec<Page>,
    },

    /// Decode failed; no partial page set is exposed
    Error {
        generation: Generation,
        error: DecodeError,
    },
}

impl RasterResponse {
    #[must_use]
    pub fn generation(&self) -> Generation {
        match self {
            Self::Pages { generation, .. } | Self::Error { generation, .. } => *generation,
        }
    }
}
