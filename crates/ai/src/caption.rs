use crate::{
    confidence,
    error::{CaptionGenerationError, GenerationError},
    generation::{GenerationConfig, GenerationTrace},
    image_decoder::{decode, CanonicalImage},
    traits::{ImageCaptionInput, ImageCaptionOutput},
    Model,
};
use anyhow::bail;
use tracing::debug;

/// A loaded sequence-generation model that can caption one image per call.
pub trait CaptionModel {
    /// Runs one full decoding pass from scratch and records per-step scores.
    fn generate(
        &mut self,
        image: &CanonicalImage,
        config: &GenerationConfig,
    ) -> Result<GenerationTrace, GenerationError>;

    /// Detokenizes `tokens`, skipping special tokens.
    fn decode_tokens(&self, tokens: &[u32]) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptionResult {
    pub short_text: String,
    pub long_text: String,
    /// Always within `[10.0, 99.0]`, derived from the short pass only.
    pub confidence: f64,
}

pub struct CaptionGenerator<M> {
    model: M,
}

impl<M> CaptionGenerator<M>
where
    M: CaptionModel,
{
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Decodes the image once, then runs a short and a long pass over it.
    pub fn generate_captions(
        &mut self,
        raw_bytes: &[u8],
    ) -> Result<CaptionResult, CaptionGenerationError> {
        let image = decode(raw_bytes)?;
        debug!(
            width = image.width(),
            height = image.height(),
            "image decoded"
        );

        let short_trace = self.model.generate(&image, &GenerationConfig::SHORT)?;
        let long_trace = self.model.generate(&image, &GenerationConfig::LONG)?;

        let confidence = confidence::score(&short_trace);
        let short_text = self.text_of(&short_trace)?;
        let long_text = self.text_of(&long_trace)?;

        debug!(%short_text, %long_text, confidence, "captions generated");

        Ok(CaptionResult {
            short_text,
            long_text,
            confidence,
        })
    }

    fn text_of(&self, trace: &GenerationTrace) -> Result<String, GenerationError> {
        self.model
            .decode_tokens(trace.tokens())
            .map(|text| text.trim().to_string())
    }
}

impl<M> Model for CaptionGenerator<M>
where
    M: CaptionModel,
{
    type Item = ImageCaptionInput;
    type Output = ImageCaptionOutput;

    fn batch_size_limit(&self) -> usize {
        1
    }

    fn process(
        &mut self,
        items: Vec<Self::Item>,
    ) -> anyhow::Result<Vec<anyhow::Result<Self::Output>>> {
        if items.len() > self.batch_size_limit() {
            bail!("too many items");
        }

        let results = items
            .into_iter()
            .map(|item| {
                self.generate_captions(&item)
                    .map_err(anyhow::Error::from)
            })
            .collect();

        Ok(results)
    }
}
