//! Forging card art.

use async_openai::{
    types::{CreateImageRequestArgs, Image, ImageModel, ImageSize, ResponseFormat},
    Client,
};
use async_trait::async_trait;
use anyhow::anyhow;
use log::trace;
use serde::{Deserialize, Serialize};

use crate::{
    ai::{AiRequest, AiRequestStatic},
    ui::ProgressConfig,
    Result,
};

/// The house style appended to every art prompt, so cards from different
/// batches still look like one set.
const ART_STYLE: &str = "Detailed fantasy trading card art, dramatic \
                         lighting, rich color, no text or lettering anywhere \
                         in the image.";

/// A request to render one card's art.
///
/// The cache key is the prompt alone, so the same prompt always yields the
/// same art until it is explicitly invalidated.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct ArtRequest {
    pub(crate) prompt: String,
}

#[async_trait]
impl AiRequest for ArtRequest {
    type Response = String;

    async fn perform(&self, _error_history: &[anyhow::Error]) -> Result<Self::Response> {
        let client = Client::new();
        let req = CreateImageRequestArgs::default()
            .model(ImageModel::DallE3)
            .prompt(format!("{} {}", self.prompt, ART_STYLE))
            .n(1)
            .response_format(ResponseFormat::B64Json)
            .size(ImageSize::S1024x1024)
            .build()?;
        trace!("OpenAI image request: {:?}", req);
        let resp = client.images().create(req).await?;
        let image = resp
            .data
            .get(0)
            .ok_or_else(|| anyhow!("OpenAI returned no image"))?;
        match image.as_ref() {
            Image::B64Json { b64_json, .. } => {
                Ok(format!("data:image/png;base64,{}", b64_json))
            }
            Image::Url { url, .. } => Ok(url.to_string()),
        }
    }
}

impl AiRequestStatic for ArtRequest {
    fn progress_config() -> &'static ProgressConfig<'static> {
        &ProgressConfig {
            emoji: "🎨",
            msg: "Painting card art",
            done_msg: "Painted card art",
        }
    }

    fn cache_name() -> &'static str {
        "oai_card_art_v1"
    }

    fn cache_size() -> u64 {
        500
    }
}
