use async_trait::async_trait;

use crate::error::InferenceError;

/// Transport boundary to the inference service. Implementations make exactly
/// one outbound call per invocation and return the model's raw text output.
#[async_trait]
pub trait InferenceClient {
    async fn classify_text(&self, label: &str) -> Result<String, InferenceError>;

    async fn classify_image(&self, image_data: &str) -> Result<String, InferenceError>;
}
