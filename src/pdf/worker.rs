//! Raster worker - runs in a separate thread

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use flume::{Receiver, Sender};
use log::debug;

use super::rasterizer::PageRasterizer;
use super::request::{RasterRequest, RasterResponse};

/// Main worker function - runs in a dedicated thread
#[expect(
    clippy::needless_pass_by_value,
    reason = "Values moved into thread, need ownership"
)]
pub fn raster_worker(
    rasterizer: PageRasterizer,
    requests: Receiver<RasterRequest>,
    responses: Sender<RasterResponse>,
    latest_generation: Arc<AtomicU64>,
) {
    for request in requests {
        match request {
            RasterRequest::Document {
                generation,
                bytes,
                viewport,
            } => {
                // A newer load was queued behind this one; skip the work entirely.
                if generation.0 < latest_generation.load(Ordering::Acquire) {
                    debug!("Skipping superseded raster pass {generation:?}");
                    continue;
                }

                let response = match rasterizer.rasterize(&bytes, viewport) {
                    Ok(pages) => RasterResponse::Pages {
                        generation,
                        viewport,
                        pages,
                    },
                    Err(error) => RasterResponse::Error { generation, error },
                };

                if responses.send(response).is_err() {
                    break;
                }
            }

            RasterRequest::Shutdown => break,
        }
    }
}
