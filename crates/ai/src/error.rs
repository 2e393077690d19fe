use thiserror::Error;

/// Raised when uploaded bytes cannot be turned into a [`crate::CanonicalImage`].
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("image buffer is empty")]
    Empty,

    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to read image buffer: {0}")]
    Io(#[from] std::io::Error),
}

/// Raised by the model host when a generation pass cannot complete.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("model backend error: {0}")]
    Backend(#[from] candle_core::Error),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("invalid generation config `{name}`: {reason}")]
    InvalidConfig { name: &'static str, reason: String },

    #[error("malformed generation trace: {0}")]
    MalformedTrace(String),

    #[error("non-finite logits at step {step}")]
    NonFiniteLogits { step: usize },
}

/// Returned by [`crate::CaptionGenerator::generate_captions`], wrapping the root cause.
#[derive(Error, Debug)]
pub enum CaptionGenerationError {
    #[error("caption generation failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("caption generation failed: {0}")]
    Generation(#[from] GenerationError),
}

impl CaptionGenerationError {
    pub fn is_decode_error(&self) -> bool {
        matches!(self, CaptionGenerationError::Decode(_))
    }
}
