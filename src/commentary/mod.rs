//! Commentary: inference boundary, streaming and math-aware formatting

pub mod inference;
pub mod latex;
pub mod stream;

pub use inference::{
    DEFAULT_SYSTEM_PROMPT, InferenceClient, InferenceError, InferenceRequest, ScriptedClient,
    StreamEvent, pump,
};
pub use latex::{FormattedOutput, LatexFormatter, StreamParseError, TextFormatter};
pub use stream::{DisplayUpdate, StreamAccumulator, StreamState};
