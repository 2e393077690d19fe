#[cfg(feature = "accelerate")]
extern crate accelerate_src;

use crate::caption::CaptionModel;
use crate::error::GenerationError;
use crate::generation::{beam_search, GenerationConfig, GenerationTrace, NextTokenLogits};
use crate::image_decoder::CanonicalImage;
use anyhow::anyhow;
use candle_core::{DType, Device, Tensor};
use candle_transformers::models::blip::VisionConfig;
use candle_transformers::models::quantized_blip;
use candle_transformers::models::{blip, blip_text};
use image::imageops::FilterType;
use std::path::Path;
use strum_macros::{AsRefStr, EnumString};
use tokenizers::Tokenizer;
use tracing::debug;

const IMAGE_SIZE: usize = 384;
/// `[DEC]`, the decoder start token.
const BOS_TOKEN_ID: u32 = 30522;
const SEP_TOKEN_ID: u32 = 102;
const IMAGE_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const IMAGE_STD: [f32; 3] = [0.26862954, 0.261_302_6, 0.275_777_1];

fn blip_base_config() -> blip::Config {
    let text_config = blip_text::Config {
        vocab_size: 30524,
        hidden_size: 768,
        encoder_hidden_size: 768,
        intermediate_size: 3072,
        projection_dim: 768,
        num_hidden_layers: 12,
        num_attention_heads: 12,
        max_position_embeddings: 512,
        hidden_act: candle_nn::Activation::Gelu,
        layer_norm_eps: 1e-12,
        is_decoder: true,
    };
    let vision_config = VisionConfig {
        hidden_size: 768,
        intermediate_size: 3072,
        projection_dim: 512,
        num_hidden_layers: 12,
        num_attention_heads: 12,
        image_size: IMAGE_SIZE,
        patch_size: 16,
        hidden_act: candle_nn::Activation::Gelu,
        layer_norm_eps: 1e-5,
    };

    blip::Config {
        text_config,
        vision_config,
        projection_dim: 512,
        image_text_hidden_size: 256,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString)]
pub enum BLIPModel {
    Base,
    Large,
}

/// CUDA first, then Metal, otherwise CPU. Only backends compiled in count.
pub fn select_device() -> candle_core::Result<Device> {
    if candle_core::utils::cuda_is_available() {
        Device::new_cuda(0)
    } else if candle_core::utils::metal_is_available() {
        Device::new_metal(0)
    } else {
        Ok(Device::Cpu)
    }
}

/// Resizes to the vision encoder's input geometry and normalizes, giving a
/// tensor with shape (3, 384, 384).
pub fn preprocess(img: &CanonicalImage, device: &Device) -> candle_core::Result<Tensor> {
    let resized = image::imageops::resize(
        img.pixels(),
        IMAGE_SIZE as u32,
        IMAGE_SIZE as u32,
        FilterType::Triangle,
    );
    let data = resized.into_raw();
    let data = Tensor::from_vec(data, (IMAGE_SIZE, IMAGE_SIZE, 3), &Device::Cpu)?.permute((2, 0, 1))?;
    let mean = Tensor::new(&IMAGE_MEAN, &Device::Cpu)?.reshape((3, 1, 1))?;
    let std = Tensor::new(&IMAGE_STD, &Device::Cpu)?.reshape((3, 1, 1))?;
    (data.to_dtype(DType::F32)? / 255.)?
        .broadcast_sub(&mean)?
        .broadcast_div(&std)?
        .to_device(device)
}

/// Model host for BLIP image captioning: quantized weights, tokenizer and the
/// device they live on, all loaded once in [`BLIP::new`].
pub struct BLIP {
    tokenizer: Tokenizer,
    model: quantized_blip::BlipForConditionalGeneration,
    device: Device,
}

impl BLIP {
    pub fn new(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        model_type: BLIPModel,
    ) -> anyhow::Result<Self> {
        let tokenizer = Tokenizer::from_file(tokenizer_path.as_ref())
            .map_err(|e| anyhow!("failed to initialize tokenizer: {}", e))?;

        let config = match model_type {
            BLIPModel::Base => blip_base_config(),
            BLIPModel::Large => blip::Config::image_captioning_large(),
        };

        let device = select_device()?;
        debug!(
            "loading BLIP {} from {} on {:?}",
            model_type.as_ref(),
            model_path.as_ref().display(),
            device
        );

        let vb = quantized_blip::VarBuilder::from_gguf(model_path, &device)?;
        let model = quantized_blip::BlipForConditionalGeneration::new(&config, vb)?;

        Ok(Self {
            tokenizer,
            model,
            device,
        })
    }
}

/// Runs the text decoder over a whole partial sequence against fixed image
/// embeddings.
struct BlipDecoder<'a> {
    model: &'a mut quantized_blip::BlipForConditionalGeneration,
    image_embeds: &'a Tensor,
    device: &'a Device,
}

impl NextTokenLogits for BlipDecoder<'_> {
    fn next_token_logits(&mut self, tokens: &[u32]) -> candle_core::Result<Tensor> {
        let decoder = self.model.text_decoder();
        // every hypothesis is replayed in full, the cache must not carry over
        decoder.reset_kv_cache();

        let input_ids = Tensor::new(tokens, self.device)?.unsqueeze(0)?;
        let logits = decoder.forward(&input_ids, self.image_embeds)?;
        let logits = logits.squeeze(0)?;
        logits.get(logits.dim(0)? - 1)?.to_dtype(DType::F32)
    }
}

impl CaptionModel for BLIP {
    fn generate(
        &mut self,
        image: &CanonicalImage,
        config: &GenerationConfig,
    ) -> Result<GenerationTrace, GenerationError> {
        debug!(
            config = config.name,
            max_length = config.max_length,
            beam_width = config.beam_width,
            "generating caption"
        );

        let pixel_values = preprocess(image, &self.device)?;
        let image_embeds = pixel_values.unsqueeze(0)?.apply(self.model.vision_model())?;

        let trace = {
            let mut decoder = BlipDecoder {
                model: &mut self.model,
                image_embeds: &image_embeds,
                device: &self.device,
            };
            beam_search(&mut decoder, BOS_TOKEN_ID, SEP_TOKEN_ID, config)
        };

        // leave the decoder clean whether or not the pass succeeded
        self.model.text_decoder().reset_kv_cache();

        trace
    }

    fn decode_tokens(&self, tokens: &[u32]) -> Result<String, GenerationError> {
        self.tokenizer
            .decode(tokens, true)
            .map(|text| text.trim().to_string())
            .map_err(|e| GenerationError::Tokenizer(e.to_string()))
    }
}
