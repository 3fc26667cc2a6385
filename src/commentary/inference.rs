//! Boundary to the external inference service
//!
//! This side assembles the request (instruction + question + selected
//! region) and consumes the token stream the service produces. Transport,
//! retries and cancellation of the remote call belong to the client.

use flume::Receiver;
use log::{debug, info};

use super::latex::{FormattedOutput, TextFormatter};
use super::stream::StreamAccumulator;
use crate::pdf::ImageRegion;

/// Instruction prepended to every question
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful tutor guiding a student learning from a textbook. \
Use the context of the image (a screenshot of a section of a textbook) to guide your response. \
For reasoning problems, think step by step. Write a response displayable using LaTeX. \
Here is the student's question: ";

/// What the inference service receives
#[derive(Clone, Debug)]
pub struct InferenceRequest {
    pub prompt_text: String,
    pub region: ImageRegion,
}

impl InferenceRequest {
    /// Build a request, or `None` for a blank question
    #[must_use]
    pub fn build(instruction: &str, question: &str, region: ImageRegion) -> Option<Self> {
        let question = question.trim();
        if question.is_empty() {
            return None;
        }
        Some(Self {
            prompt_text: format!("{instruction}{question}"),
            region,
        })
    }

    #[must_use]
    pub fn page_number(&self) -> usize {
        self.region.page_number
    }

    /// The region encoded as PNG bytes
    pub fn image_png(&self) -> Result<Vec<u8>, InferenceError> {
        Ok(self.region.to_png()?)
    }
}

/// Events produced by the inference service
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    Token(String),
    /// End of stream, carrying the full raw text
    Completed(String),
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("inference failed: {0}")]
    Failed(String),

    #[error("inference stream ended without completion")]
    Disconnected,

    #[error("stream cancelled")]
    Cancelled,

    #[error("region encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Something that can answer an [`InferenceRequest`] with a token stream
pub trait InferenceClient {
    fn stream(&self, request: &InferenceRequest) -> Result<Receiver<StreamEvent>, InferenceError>;
}

/// Drive `events` into `accumulator` until completion.
///
/// Returns the formatted output of this stream. Stops early if the
/// accumulator was cancelled.
pub fn pump<F: TextFormatter>(
    events: &Receiver<StreamEvent>,
    accumulator: &mut StreamAccumulator<F>,
) -> Result<FormattedOutput, InferenceError> {
    loop {
        if accumulator.is_cancelled() {
            return Err(InferenceError::Cancelled);
        }

        match events.recv() {
            Ok(StreamEvent::Token(token)) => accumulator.on_token(&token),
            Ok(StreamEvent::Completed(full_text)) => {
                accumulator.on_finalize(&full_text);
                return accumulator
                    .output()
                    .cloned()
                    .ok_or(InferenceError::Cancelled);
            }
            Ok(StreamEvent::Failed(msg)) => return Err(InferenceError::Failed(msg)),
            Err(_) => return Err(InferenceError::Disconnected),
        }
    }
}

/// Replays a fixed token sequence, for offline use and tests
#[derive(Clone, Debug, Default)]
pub struct ScriptedClient {
    tokens: Vec<String>,
}

impl ScriptedClient {
    #[must_use]
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens }
    }

    /// One token per line, newlines kept
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        Self::new(text.split_inclusive('\n').map(str::to_string).collect())
    }

    /// Queue the whole script followed by completion
    #[must_use]
    pub fn replay(&self) -> Receiver<StreamEvent> {
        let (tx, rx) = flume::unbounded();
        for token in &self.tokens {
            let _ = tx.send(StreamEvent::Token(token.clone()));
        }
        let _ = tx.send(StreamEvent::Completed(self.tokens.concat()));
        debug!("Scripted stream queued {} tokens", self.tokens.len());
        rx
    }
}

impl InferenceClient for ScriptedClient {
    fn stream(&self, request: &InferenceRequest) -> Result<Receiver<StreamEvent>, InferenceError> {
        info!(
            "Scripted answer for page {} ({} prompt bytes)",
            request.page_number(),
            request.prompt_text.len()
        );
        Ok(self.replay())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commentary::stream::DisplayUpdate;
    use crate::pdf::Bitmap;
    use image::Rgba;

    fn region() -> ImageRegion {
        ImageRegion::new(Bitmap::from_pixel(20, 20, Rgba([255, 255, 255, 255])), 4)
    }

    #[test]
    fn blank_question_is_not_submitted() {
        assert!(InferenceRequest::build(DEFAULT_SYSTEM_PROMPT, "   ", region()).is_none());
    }

    #[test]
    fn prompt_is_instruction_then_question() {
        let request = InferenceRequest::build("Tutor: ", " why? ", region()).unwrap();
        assert_eq!(request.prompt_text, "Tutor: why?");
        assert_eq!(request.page_number(), 4);
        assert!(!request.image_png().unwrap().is_empty());
    }

    #[test]
    fn pump_streams_then_formats() {
        let client = ScriptedClient::new(vec!["Area is ".into(), "$\\pi r^2$".into(), " 100%".into()]);
        let request = InferenceRequest::build(DEFAULT_SYSTEM_PROMPT, "area?", region()).unwrap();
        let events = client.stream(&request).unwrap();

        let mut acc = StreamAccumulator::new();
        let display = acc.subscribe();
        let output = pump(&events, &mut acc).unwrap();

        assert_eq!(output.content, "Area is $\\pi r^2$ 100\\%");
        let updates: Vec<_> = display.try_iter().collect();
        assert_eq!(updates.len(), 4);
        assert_eq!(updates[3], DisplayUpdate::Formatted(output));
    }

    #[test]
    fn failure_event_is_surfaced() {
        let (tx, rx) = flume::unbounded();
        tx.send(StreamEvent::Token("x".into())).unwrap();
        tx.send(StreamEvent::Failed("throttled".into())).unwrap();

        let mut acc = StreamAccumulator::new();
        assert!(matches!(pump(&rx, &mut acc), Err(InferenceError::Failed(m)) if m == "throttled"));
        assert!(!acc.state().is_finalized());
    }

    #[test]
    fn dropped_producer_is_disconnect() {
        let (tx, rx) = flume::unbounded::<StreamEvent>();
        tx.send(StreamEvent::Token("x".into())).unwrap();
        drop(tx);

        let mut acc = StreamAccumulator::new();
        assert!(matches!(pump(&rx, &mut acc), Err(InferenceError::Disconnected)));
    }

    #[test]
    fn cancelled_accumulator_stops_pumping() {
        let events = ScriptedClient::from_text("a\nb\n").replay();
        let mut acc = StreamAccumulator::new();
        acc.cancel();
        assert!(matches!(pump(&events, &mut acc), Err(InferenceError::Cancelled)));
    }

    #[test]
    fn from_text_keeps_line_breaks() {
        let events = ScriptedClient::from_text("one\ntwo").replay();
        let collected: Vec<_> = events.try_iter().collect();
        assert_eq!(
            collected,
            vec![
                StreamEvent::Token("one\n".into()),
                StreamEvent::Token("two".into()),
                StreamEvent::Completed("one\ntwo".into()),
            ]
        );
    }
}
