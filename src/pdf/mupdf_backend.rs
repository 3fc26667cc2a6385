//! MuPDF-backed document loader

use mupdf::{Colorspace, Document, Matrix, Pixmap};

use super::rasterizer::{DocumentLoader, PageSource};
use super::request::DecodeError;
use super::types::Bitmap;

const PDF_MAGIC: &str = "application/pdf";

/// Opens PDF byte buffers with MuPDF
#[derive(Clone, Copy, Debug, Default)]
pub struct MupdfLoader;

impl DocumentLoader for MupdfLoader {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn PageSource>, DecodeError> {
        let doc = Document::from_bytes(bytes, PDF_MAGIC)?;
        Ok(Box::new(MupdfDocument { doc }))
    }
}

struct MupdfDocument {
    doc: Document,
}

impl PageSource for MupdfDocument {
    fn page_count(&self) -> Result<usize, DecodeError> {
        let count = self.doc.page_count()?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn page_size(&self, index: usize) -> Result<(f32, f32), DecodeError> {
        let page = self.doc.load_page(page_number(index)?)?;
        let bounds = page.bounds()?;
        Ok((bounds.x1 - bounds.x0, bounds.y1 - bounds.y0))
    }

    fn render_page(&self, index: usize, scale: f32) -> Result<Bitmap, DecodeError> {
        let page = self.doc.load_page(page_number(index)?)?;
        let rgb = Colorspace::device_rgb();
        let pixmap = page.to_pixmap(&Matrix::new_scale(scale, scale), &rgb, false, false)?;
        pixmap_to_rgba(&pixmap, index)
    }
}

/// MuPDF page number for a 0-based index
fn page_number(index: usize) -> Result<i32, DecodeError> {
    i32::try_from(index).map_err(|_| DecodeError::page(index.saturating_add(1), "page index out of range"))
}

fn pixmap_to_rgba(pixmap: &Pixmap, index: usize) -> Result<Bitmap, DecodeError> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(DecodeError::page(
            index + 1,
            format!("unsupported pixmap format: {n} channels"),
        ));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    let expected_min = stride.saturating_mul(height);
    if samples.len() < expected_min || row_bytes > stride {
        return Err(DecodeError::page(index + 1, "pixmap buffer size mismatch"));
    }

    let mut out = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        let row_start = y * stride;
        let row = &samples[row_start..row_start + row_bytes];
        for px in row.chunks_exact(n) {
            let alpha = if n >= 4 { px[3] } else { 255 };
            out.extend_from_slice(&[px[0], px[1], px[2], alpha]);
        }
    }

    Bitmap::from_raw(width as u32, height as u32, out)
        .ok_or_else(|| DecodeError::page(index + 1, "pixel buffer does not match dimensions"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_index_beyond_i32_is_rejected() {
        assert_eq!(page_number(41).unwrap(), 41);
        assert!(matches!(
            page_number(i32::MAX as usize + 1),
            Err(DecodeError::Page { .. })
        ));
        assert!(page_number(usize::MAX).is_err());
    }
}
