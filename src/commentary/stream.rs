//! Accumulation of streamed model output

use flume::{Receiver, Sender};
use log::{debug, info, warn};

use super::latex::{FormattedOutput, LatexFormatter, TextFormatter};

/// Running buffer for one in-flight response.
///
/// Append-only until finalized, immutable afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamState {
    raw_buffer: String,
    finalized: bool,
}

impl StreamState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw_buffer
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Append a token. Returns false once finalized.
    pub fn append(&mut self, token: &str) -> bool {
        if self.finalized {
            return false;
        }
        self.raw_buffer.push_str(token);
        true
    }

    /// Freeze the buffer. Returns false if it was already frozen.
    pub fn freeze(&mut self) -> bool {
        !std::mem::replace(&mut self.finalized, true)
    }
}

/// What a display subscriber receives
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisplayUpdate {
    /// A raw token, shown as-is while streaming
    Partial(String),
    /// Final formatted text replacing everything shown so far
    Formatted(FormattedOutput),
}

/// Collects tokens for one response and formats the result exactly once
pub struct StreamAccumulator<F: TextFormatter = LatexFormatter> {
    state: StreamState,
    formatter: F,
    subscribers: Vec<Sender<DisplayUpdate>>,
    output: Option<FormattedOutput>,
    cancelled: bool,
}

impl StreamAccumulator<LatexFormatter> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_formatter(LatexFormatter)
    }
}

impl Default for StreamAccumulator<LatexFormatter> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: TextFormatter> StreamAccumulator<F> {
    #[must_use]
    pub fn with_formatter(formatter: F) -> Self {
        Self {
            state: StreamState::new(),
            formatter,
            subscribers: Vec::new(),
            output: None,
            cancelled: false,
        }
    }

    /// Register a display subscriber
    pub fn subscribe(&mut self) -> Receiver<DisplayUpdate> {
        let (tx, rx) = flume::unbounded();
        self.subscribers.push(tx);
        rx
    }

    #[must_use]
    pub fn state(&self) -> &StreamState {
        &self.state
    }

    /// The formatted result, once finalized
    #[must_use]
    pub fn output(&self) -> Option<&FormattedOutput> {
        self.output.as_ref()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Append a token and forward it unformatted to subscribers
    pub fn on_token(&mut self, token: &str) {
        if !self.state.append(token) {
            debug!("Token after finalize ignored ({} bytes)", token.len());
            return;
        }
        if !self.cancelled {
            self.broadcast(DisplayUpdate::Partial(token.to_string()));
        }
    }

    /// Completion signal carrying the producer's full text.
    ///
    /// The producer's text is what gets formatted when it differs from the
    /// accumulated buffer; the buffer itself keeps what was streamed. An
    /// empty payload formats the buffer. Only the first call formats and
    /// notifies; later calls return `None`.
    pub fn on_finalize(&mut self, full_text: &str) -> Option<&FormattedOutput> {
        let differs = !full_text.is_empty() && full_text != self.state.raw();
        if differs && !self.state.is_finalized() && !self.cancelled {
            warn!(
                "Completion text ({} bytes) differs from streamed buffer ({} bytes), using completion text",
                full_text.len(),
                self.state.raw().len()
            );
        }
        self.finalize_with(differs.then_some(full_text))
    }

    /// Freeze the buffer and format it. Idempotent: the formatter runs at
    /// most once per stream and later calls return `None`.
    pub fn finalize(&mut self) -> Option<&FormattedOutput> {
        self.finalize_with(None)
    }

    fn finalize_with(&mut self, completion: Option<&str>) -> Option<&FormattedOutput> {
        if self.cancelled {
            debug!("Finalize after cancel ignored");
            self.state.freeze();
            return None;
        }
        if !self.state.freeze() {
            debug!("Stream already finalized, skipping format pass");
            return None;
        }

        let raw = completion.unwrap_or(self.state.raw());
        let output = self.formatter.format(raw);
        info!(
            "Stream finalized: {} raw bytes, {} preamble bytes, {} content bytes",
            raw.len(),
            output.preamble.len(),
            output.content.len()
        );
        self.broadcast(DisplayUpdate::Formatted(output.clone()));
        self.output = Some(output);
        self.output.as_ref()
    }

    /// Stop forwarding anything to subscribers
    pub fn cancel(&mut self) {
        if !self.cancelled {
            info!("Stream cancelled after {} bytes", self.state.raw().len());
        }
        self.cancelled = true;
        self.subscribers.clear();
    }

    fn broadcast(&mut self, update: DisplayUpdate) {
        self.subscribers.retain(|tx| tx.send(update.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_helpers::CountingFormatter;

    #[test]
    fn tokens_are_forwarded_raw() {
        let mut acc = StreamAccumulator::new();
        let rx = acc.subscribe();

        acc.on_token("50% of ");
        acc.on_token("$x_1$");

        assert_eq!(acc.state().raw(), "50% of $x_1$");
        let updates: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            updates,
            vec![
                DisplayUpdate::Partial("50% of ".into()),
                DisplayUpdate::Partial("$x_1$".into()),
            ]
        );
    }

    #[test]
    fn finalize_formats_exactly_once() {
        let formatter = CountingFormatter::new();
        let mut acc = StreamAccumulator::with_formatter(formatter.clone());
        let rx = acc.subscribe();
        acc.on_token("100% & done");

        let first = acc.finalize().cloned();
        let second = acc.finalize().cloned();
        let third = acc.on_finalize("100% & done");

        assert_eq!(first.unwrap().content, "100\\% \\& done");
        assert!(second.is_none());
        assert!(third.is_none());
        assert_eq!(formatter.calls(), 1);

        let formatted = rx
            .try_iter()
            .filter(|u| matches!(u, DisplayUpdate::Formatted(_)))
            .count();
        assert_eq!(formatted, 1);
    }

    #[test]
    fn finalized_output_is_not_escaped_again() {
        let mut acc = StreamAccumulator::new();
        acc.on_token("50%");
        acc.finalize();
        acc.finalize();

        assert_eq!(acc.output().unwrap().content, "50\\%");
    }

    #[test]
    fn empty_stream_finalizes_to_empty_output() {
        let mut acc = StreamAccumulator::new();
        assert_eq!(acc.on_finalize("").cloned(), Some(FormattedOutput::default()));
    }

    #[test]
    fn tokens_after_finalize_are_dropped() {
        let mut acc = StreamAccumulator::new();
        acc.on_token("a");
        acc.finalize();
        acc.on_token("b");
        assert_eq!(acc.state().raw(), "a");
        assert!(acc.state().is_finalized());
    }

    #[test]
    fn completion_text_wins_over_buffer() {
        let mut acc = StreamAccumulator::new();
        acc.on_token("partial");
        let output = acc.on_finalize("partial and the rest").cloned();
        assert_eq!(output.unwrap().content, "partial and the rest");
        assert_eq!(acc.state().raw(), "partial");
    }

    #[test]
    fn completion_never_shrinks_the_buffer() {
        let mut acc = StreamAccumulator::new();
        acc.on_token("streamed text");
        let output = acc.on_finalize("short").cloned();

        assert_eq!(output.unwrap().content, "short");
        assert_eq!(acc.state().raw(), "streamed text");
        assert!(acc.state().is_finalized());
    }

    #[test]
    fn cancel_stops_display_updates() {
        let formatter = CountingFormatter::new();
        let mut acc = StreamAccumulator::with_formatter(formatter.clone());
        let rx = acc.subscribe();

        acc.on_token("one ");
        acc.cancel();
        acc.on_token("two");

        assert!(acc.finalize().is_none());
        assert_eq!(formatter.calls(), 0);
        assert_eq!(acc.state().raw(), "one two");

        let updates: Vec<_> = rx.try_iter().collect();
        assert_eq!(updates, vec![DisplayUpdate::Partial("one ".into())]);
    }

    #[test]
    fn dropped_subscriber_is_pruned() {
        let mut acc = StreamAccumulator::new();
        let rx = acc.subscribe();
        drop(rx);
        acc.on_token("x");
        assert!(acc.subscribers.is_empty());
    }
}
