//! Answer synthesis with an OpenAI vision model.

use super::{format_captions, Answer, AnswerSynthesizer};
use crate::config::{Prompts, SynthesisSettings};
use crate::embedding::image_data_url;
use crate::error::{GlimtError, Result};
use crate::openai::create_client;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
    ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
    ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
    ImageUrl,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, instrument};

/// Synthesizer backed by the OpenAI chat completions API.
pub struct OpenAISynthesizer {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    temperature: f32,
    detail: ImageDetail,
    prompts: Prompts,
}

impl OpenAISynthesizer {
    pub fn new(settings: &SynthesisSettings) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            model: settings.model.clone(),
            temperature: settings.temperature,
            detail: parse_detail(&settings.image_detail),
            prompts: Prompts::default(),
        })
    }

    /// Set custom prompts (with user-defined variables).
    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    fn user_parts(
        &self,
        images: &[PathBuf],
        texts: &[String],
        query: &str,
    ) -> Result<Vec<ChatCompletionRequestUserMessageContentPart>> {
        let mut vars = HashMap::new();
        vars.insert("query".to_string(), query.to_string());
        vars.insert("captions".to_string(), format_captions(texts));
        vars.insert("frame_count".to_string(), images.len().to_string());

        let prompt = self.prompts.render_with_custom(&self.prompts.synthesis.user, &vars);

        let mut parts = vec![ChatCompletionRequestUserMessageContentPart::Text(
            ChatCompletionRequestMessageContentPartText { text: prompt },
        )];

        for path in images {
            parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                ChatCompletionRequestMessageContentPartImage {
                    image_url: ImageUrl {
                        url: image_data_url(path)?,
                        detail: Some(self.detail.clone()),
                    },
                },
            ));
        }

        Ok(parts)
    }
}

fn parse_detail(value: &str) -> ImageDetail {
    match value.to_lowercase().as_str() {
        "high" => ImageDetail::High,
        "auto" => ImageDetail::Auto,
        _ => ImageDetail::Low,
    }
}

#[async_trait]
impl AnswerSynthesizer for OpenAISynthesizer {
    #[instrument(skip(self, images, texts), fields(images = images.len(), texts = texts.len()))]
    async fn synthesize(&self, images: &[PathBuf], texts: &[String], query: &str) -> Result<Answer> {
        if images.is_empty() && texts.is_empty() {
            info!("No evidence retrieved, skipping model call");
            return Ok(Answer {
                text: self.prompts.synthesis.empty_answer.clone(),
                image_count: 0,
                text_count: 0,
            });
        }

        let system = self
            .prompts
            .render_with_custom(&self.prompts.synthesis.system, &HashMap::new());

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| GlimtError::Synthesis(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Array(
                    self.user_parts(images, texts, query)?,
                ))
                .build()
                .map_err(|e| GlimtError::Synthesis(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .build()
            .map_err(|e| GlimtError::Synthesis(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            GlimtError::OpenAI(format!("Failed to generate response: {}", e))
        })?;

        let text = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| GlimtError::Synthesis("Empty response from model".to_string()))?
            .clone();

        debug!("Generated answer from {} frames and {} passages", images.len(), texts.len());

        Ok(Answer {
            text,
            image_count: images.len(),
            text_count: texts.len(),
        })
    }
}
