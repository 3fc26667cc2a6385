//! Raster service - owns the worker thread and drops stale completions

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use flume::{Receiver, Sender};
use log::{debug, error, info};

use super::rasterizer::PageRasterizer;
use super::request::{DecodeError, Generation, RasterRequest, RasterResponse};
use super::types::{Page, Viewport};
use super::worker::raster_worker;

/// Result of a rasterization pass that is still current
#[derive(Debug)]
pub enum RasterOutcome {
    Loaded { viewport: Viewport, pages: Vec<Page> },
    Failed(DecodeError),
}

/// Runs rasterization passes off the UI thread.
///
/// Each [`RasterService::load`] starts a new generation and invalidates
/// any earlier pass, whether it is still queued, running, or already
/// finished but not yet polled.
pub struct RasterService {
    request_tx: Sender<RasterRequest>,
    response_rx: Receiver<RasterResponse>,
    generation: Generation,
    latest_generation: Arc<AtomicU64>,
    in_flight: bool,
}

impl RasterService {
    #[must_use]
    pub fn new(rasterizer: PageRasterizer) -> Self {
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();
        let latest_generation = Arc::new(AtomicU64::new(0));

        let latest = latest_generation.clone();
        std::thread::spawn(move || {
            raster_worker(rasterizer, request_rx, response_tx, latest);
        });

        Self {
            request_tx,
            response_rx,
            generation: Generation::new(0),
            latest_generation,
            in_flight: false,
        }
    }

    /// Start rasterizing a document, discarding any earlier pass
    pub fn load(&mut self, bytes: Arc<[u8]>, viewport: Viewport) -> Generation {
        let generation = self.invalidate();
        info!(
            "Requesting raster pass {generation:?} at {}x{}",
            viewport.width, viewport.height
        );

        if self
            .request_tx
            .send(RasterRequest::Document {
                generation,
                bytes,
                viewport,
            })
            .is_err()
        {
            error!("Raster worker is gone, request {generation:?} dropped");
        } else {
            self.in_flight = true;
        }

        generation
    }

    /// Discard every pass issued so far
    pub fn invalidate(&mut self) -> Generation {
        self.generation = self.generation.next();
        self.latest_generation
            .store(self.generation.0, Ordering::Release);
        self.in_flight = false;
        self.generation
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    /// Poll for a completed pass of the current generation.
    ///
    /// Stale completions are drained and dropped.
    pub fn poll(&mut self) -> Option<RasterOutcome> {
        while let Ok(response) = self.response_rx.try_recv() {
            if let Some(outcome) = self.accept(response) {
                return Some(outcome);
            }
        }
        None
    }

    /// Block until the current generation completes
    pub fn wait(&mut self) -> Result<Vec<Page>, DecodeError> {
        if !self.in_flight {
            return Err(DecodeError::generic("no rasterization in flight"));
        }

        loop {
            let response = self
                .response_rx
                .recv()
                .map_err(|_| DecodeError::generic("raster worker disconnected"))?;
            match self.accept(response) {
                Some(RasterOutcome::Loaded { pages, .. }) => return Ok(pages),
                Some(RasterOutcome::Failed(e)) => return Err(e),
                None => continue,
            }
        }
    }

    fn accept(&mut self, response: RasterResponse) -> Option<RasterOutcome> {
        let generation = response.generation();
        if generation != self.generation {
            debug!(
                "Dropping stale raster completion {generation:?} (current {:?})",
                self.generation
            );
            return None;
        }

        self.in_flight = false;
        match response {
            RasterResponse::Pages {
                viewport, pages, ..
            } => Some(RasterOutcome::Loaded { viewport, pages }),
            RasterResponse::Error { error, .. } => {
                error!("Raster pass {generation:?} failed: {error}");
                Some(RasterOutcome::Failed(error))
            }
        }
    }

    /// Shutdown the worker
    pub fn shutdown(&self) {
        let _ = self.request_tx.send(RasterRequest::Shutdown);
    }
}

impl Drop for RasterService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
