pub mod test_helpers {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use image::Rgba;

    use crate::commentary::latex::{FormattedOutput, LatexFormatter, TextFormatter};
    use crate::pdf::{Bitmap, DecodeError, DocumentLoader, Page, PageSource, Viewport};

    /// In-memory document loader producing solid-colored pages.
    ///
    /// Any non-empty byte buffer opens successfully; an empty buffer is
    /// treated as an unreadable document.
    #[derive(Clone, Debug)]
    pub struct FixtureLoader {
        page_sizes: Vec<(f32, f32)>,
        fail_on: Option<usize>,
    }

    impl FixtureLoader {
        pub fn uniform(page_count: usize, page_size: (f32, f32)) -> Self {
            Self {
                page_sizes: vec![page_size; page_count],
                fail_on: None,
            }
        }

        pub fn with_sizes(page_sizes: Vec<(f32, f32)>) -> Self {
            Self {
                page_sizes,
                fail_on: None,
            }
        }

        /// Make rendering fail on the given 0-based page index
        pub fn failing_on(mut self, index: usize) -> Self {
            self.fail_on = Some(index);
            self
        }

        /// Fill color of the page at the given 0-based index
        pub fn page_color(index: usize) -> Rgba<u8> {
            let shade = ((index * 40) % 200) as u8 + 20;
            Rgba([shade, 255 - shade, 128, 255])
        }
    }

    impl DocumentLoader for FixtureLoader {
        fn open(&self, bytes: &[u8]) -> Result<Box<dyn PageSource>, DecodeError> {
            if bytes.is_empty() {
                return Err(DecodeError::generic("empty document buffer"));
            }
            Ok(Box::new(self.clone()))
        }
    }

    impl PageSource for FixtureLoader {
        fn page_count(&self) -> Result<usize, DecodeError> {
            Ok(self.page_sizes.len())
        }

        fn page_size(&self, index: usize) -> Result<(f32, f32), DecodeError> {
            self.page_sizes
                .get(index)
                .copied()
                .ok_or_else(|| DecodeError::page(index + 1, "no such page"))
        }

        fn render_page(&self, index: usize, scale: f32) -> Result<Bitmap, DecodeError> {
            if self.fail_on == Some(index) {
                return Err(DecodeError::page(index + 1, "fixture failure"));
            }
            let (width, height) = self.page_size(index)?;
            let width = (width * scale).round().max(1.0) as u32;
            let height = (height * scale).round().max(1.0) as u32;
            Ok(Bitmap::from_pixel(width, height, Self::page_color(index)))
        }
    }

    /// Pages pre-rendered at the viewport size, one solid color each
    pub fn solid_pages(count: usize, viewport: Viewport) -> Vec<Page> {
        (0..count)
            .map(|i| {
                Page::new(
                    i + 1,
                    Bitmap::from_pixel(viewport.width, viewport.height, FixtureLoader::page_color(i)),
                )
            })
            .collect()
    }

    /// Formatter that counts how many times it ran
    #[derive(Clone, Default)]
    pub struct CountingFormatter {
        calls: Arc<AtomicUsize>,
    }

    impl CountingFormatter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TextFormatter for CountingFormatter {
        fn format(&self, raw: &str) -> FormattedOutput {
            self.calls.fetch_add(1, Ordering::SeqCst);
            LatexFormatter.format(raw)
        }
    }
}
