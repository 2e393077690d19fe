use crate::config::ServerConfig;
use ai::{blip::BLIP, AIModel, CaptionGenerator, ImageCaptionModel};
use std::fmt;

pub struct AIHandler {
    pub image_caption: ImageCaptionModel,
}

impl Clone for AIHandler {
    fn clone(&self) -> Self {
        Self {
            image_caption: self.image_caption.clone(),
        }
    }
}

impl fmt::Debug for AIHandler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AIHandler")
            .field("image_caption", &self.image_caption.model_id())
            .finish()
    }
}

impl AIHandler {
    /// Loads BLIP on its worker thread; returns once the weights are ready.
    pub async fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        Ok(Self {
            image_caption: Self::get_image_caption(config).await?,
        })
    }

    pub fn with_model(image_caption: ImageCaptionModel) -> Self {
        Self { image_caption }
    }

    async fn get_image_caption(config: &ServerConfig) -> anyhow::Result<ImageCaptionModel> {
        let model_path = config.model_path.clone();
        let tokenizer_path = config.tokenizer_path.clone();
        let model_type = config.model_type;

        AIModel::new(
            format!("blip-{}", model_type.as_ref().to_lowercase()),
            move || {
                let blip = BLIP::new(model_path, tokenizer_path, model_type)?;
                Ok(CaptionGenerator::new(blip))
            },
        )
        .await
    }
}
