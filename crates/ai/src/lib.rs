mod caption;
mod error;
mod image_decoder;
mod traits;

pub mod blip;
pub mod confidence;
pub mod generation;

pub use caption::{CaptionGenerator, CaptionModel, CaptionResult};
pub use error::{CaptionGenerationError, DecodeError, GenerationError};
pub use generation::{GenerationConfig, GenerationTrace};
pub use image_decoder::{decode, CanonicalImage};
pub use traits::*;

use tokio::sync::oneshot;

pub type HandlerPayload<TItem, TOutput> = (
    Vec<TItem>,
    oneshot::Sender<anyhow::Result<Vec<anyhow::Result<TOutput>>>>,
);
