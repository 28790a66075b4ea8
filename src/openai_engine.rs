use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::engine::InferenceClient;
use crate::error::InferenceError;

const TEXT_SYSTEM_PROMPT: &str = "You classify waste items into: recycle, trash, compost, hazardous.";
const IMAGE_SYSTEM_PROMPT: &str =
    "You analyze photos of waste and classify them into recycle, trash, compost, or hazardous.";
const IMAGE_USER_PROMPT: &str = "Identify the waste item and output JSON only.";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

/// Chat-completions client for an OpenAI-compatible endpoint.
pub struct OpenAiEngine {
    client: Client,
    config: OpenAiConfig,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(String),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn text_messages(label: &str) -> Vec<ChatMessage<'static>> {
    vec![
        ChatMessage {
            role: "system",
            content: MessageContent::Text(TEXT_SYSTEM_PROMPT.to_string()),
        },
        ChatMessage {
            role: "user",
            content: MessageContent::Text(format!(
                "Classify this item: \"{label}\". Return JSON with:\n\
                 {{\n  \"itemName\": \"\",\n  \"bin\": \"\",\n  \"co2Saved\": 0,\n  \"points\": 0\n}}"
            )),
        },
    ]
}

fn image_messages(image_data: &str) -> Vec<ChatMessage<'_>> {
    vec![
        ChatMessage {
            role: "system",
            content: MessageContent::Text(IMAGE_SYSTEM_PROMPT.to_string()),
        },
        ChatMessage {
            role: "user",
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: IMAGE_USER_PROMPT,
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: image_data },
                },
            ]),
        },
    ]
}

impl OpenAiEngine {
    pub fn new(config: OpenAiConfig) -> Result<Self, InferenceError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        tracing::info!(
            base_url = %config.base_url,
            model = %config.model,
            "Initialized inference client"
        );

        Ok(Self { client, config })
    }

    #[tracing::instrument(skip(self, messages), fields(model = %self.config.model))]
    async fn complete(&self, messages: Vec<ChatMessage<'_>>) -> Result<String, InferenceError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let request = ChatCompletionRequest {
            model: &self.config.model,
            response_format: ResponseFormat {
                kind: "json_object",
            },
            messages,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);

            return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                InferenceError::RateLimited { message }
            } else {
                InferenceError::Service {
                    status: status.as_u16(),
                    message,
                }
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| InferenceError::MalformedResponse("response has no message content".to_string()))
    }
}

#[async_trait]
impl InferenceClient for OpenAiEngine {
    async fn classify_text(&self, label: &str) -> Result<String, InferenceError> {
        self.complete(text_messages(label)).await
    }

    async fn classify_image(&self, image_data: &str) -> Result<String, InferenceError> {
        self.complete(image_messages(image_data)).await
    }
}
