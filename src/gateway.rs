use std::sync::Arc;

use crate::config::RetryConfig;
use crate::engine::InferenceClient;
use crate::error::ClassifyError;
use crate::retry::with_retry;
use crate::types::{ClassificationRequest, ClassificationResult, RequestKind};

pub type SharedClient = Arc<dyn InferenceClient + Send + Sync>;

/// Validates requests, calls the inference service through the retry policy
/// and turns its raw output into a [`ClassificationResult`].
///
/// Holds no per-request state; one instance is shared by all handlers.
#[derive(Clone)]
pub struct Gateway {
    client: SharedClient,
    retry: RetryConfig,
}

impl Gateway {
    pub fn new(client: SharedClient, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    /// Builds a request from a possibly missing field.
    ///
    /// Whitespace-only values count as missing too, which is stricter than a
    /// plain presence check: `"   "` is rejected rather than sent upstream.
    pub fn validate(kind: RequestKind, field: Option<String>) -> Result<ClassificationRequest, ClassifyError> {
        match field {
            Some(value) if !value.trim().is_empty() => Ok(match kind {
                RequestKind::Text => ClassificationRequest::Text { label: value },
                RequestKind::Image => ClassificationRequest::Image { image: value },
            }),
            _ => Err(ClassifyError::missing_field(kind)),
        }
    }

    #[tracing::instrument(skip(self, request), fields(kind = request.kind().as_str()))]
    pub async fn classify(&self, request: ClassificationRequest) -> Result<ClassificationResult, ClassifyError> {
        let client = &self.client;
        let request = &request;
        let raw = with_retry(self.retry, move || async move {
            match request {
                ClassificationRequest::Text { label } => client.classify_text(label).await,
                ClassificationRequest::Image { image } => client.classify_image(image).await,
            }
        })
        .await?;

        tracing::debug!(bytes = raw.len(), "Received model output");
        parse_result(&raw)
    }
}

fn parse_result(raw: &str) -> Result<ClassificationResult, ClassifyError> {
    let payload: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| ClassifyError::UpstreamFormat(e.to_string()))?;

    ClassificationResult::from_payload(payload)
        .ok_or_else(|| ClassifyError::UpstreamFormat("expected a JSON object".to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::InferenceError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays scripted outcomes and counts calls.
    #[derive(Default)]
    pub(crate) struct ScriptedClient {
        outcomes: Mutex<VecDeque<Result<String, InferenceError>>>,
        pub(crate) text_calls: AtomicU32,
        pub(crate) image_calls: AtomicU32,
    }

    impl ScriptedClient {
        pub(crate) fn new(outcomes: Vec<Result<String, InferenceError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                ..Default::default()
            })
        }

        pub(crate) fn calls(&self) -> u32 {
            self.text_calls.load(Ordering::SeqCst) + self.image_calls.load(Ordering::SeqCst)
        }

        fn next(&self) -> Result<String, InferenceError> {
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(InferenceError::MalformedResponse("script exhausted".to_string())))
        }
    }

    #[async_trait]
    impl InferenceClient for ScriptedClient {
        async fn classify_text(&self, _label: &str) -> Result<String, InferenceError> {
            self.text_calls.fetch_add(1, Ordering::SeqCst);
            self.next()
        }

        async fn classify_image(&self, _image_data: &str) -> Result<String, InferenceError> {
            self.image_calls.fetch_add(1, Ordering::SeqCst);
            self.next()
        }
    }

    pub(crate) fn rate_limited() -> Result<String, InferenceError> {
        Err(InferenceError::RateLimited {
            message: "Rate limit reached".to_string(),
        })
    }

    pub(crate) const BOTTLE: &str = r#"{"itemName":"Plastic Bottle","bin":"recycle","co2Saved":50,"points":10}"#;

    fn gateway(client: Arc<ScriptedClient>) -> Gateway {
        Gateway::new(client, RetryConfig::default())
    }

    #[test]
    fn missing_and_empty_fields_are_rejected() {
        for field in [None, Some(String::new())] {
            let err = Gateway::validate(RequestKind::Image, field).unwrap_err();
            assert!(matches!(err, ClassifyError::InvalidInput("Image is required")));
        }
        let err = Gateway::validate(RequestKind::Text, None).unwrap_err();
        assert!(matches!(err, ClassifyError::InvalidInput("Label is required")));
    }

    #[test]
    fn whitespace_only_label_is_rejected_stricter_than_presence_check() {
        let err = Gateway::validate(RequestKind::Text, Some("   ".to_string())).unwrap_err();
        assert!(matches!(err, ClassifyError::InvalidInput("Label is required")));

        let request = Gateway::validate(RequestKind::Text, Some(" can ".to_string())).unwrap();
        assert_eq!(request, ClassificationRequest::Text { label: " can ".to_string() });
    }

    #[tokio::test]
    async fn text_request_uses_text_path() {
        let client = ScriptedClient::new(vec![Ok(BOTTLE.to_string())]);
        let request = Gateway::validate(RequestKind::Text, Some("plastic bottle".to_string())).unwrap();

        let result = gateway(client.clone()).classify(request).await.unwrap();

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"itemName": "Plastic Bottle", "bin": "recycle", "co2Saved": 50, "points": 10})
        );
        assert_eq!(client.text_calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.image_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn image_request_recovers_from_rate_limit() {
        let client = ScriptedClient::new(vec![rate_limited(), Ok(BOTTLE.to_string())]);
        let request = ClassificationRequest::Image {
            image: "data:image/jpeg;base64,/9j/".to_string(),
        };

        let result = gateway(client.clone()).classify(request).await.unwrap();

        assert_eq!(result.bin, "recycle");
        assert_eq!(client.image_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_json_output_is_upstream_format_error() {
        let client = ScriptedClient::new(vec![Ok("It goes in the blue bin.".to_string())]);
        let request = ClassificationRequest::Text {
            label: "newspaper".to_string(),
        };

        let err = gateway(client.clone()).classify(request).await.unwrap_err();

        assert!(matches!(err, ClassifyError::UpstreamFormat(_)));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn json_array_output_is_upstream_format_error() {
        let client = ScriptedClient::new(vec![Ok("[]".to_string())]);
        let request = ClassificationRequest::Text {
            label: "newspaper".to_string(),
        };

        let err = gateway(client).classify(request).await.unwrap_err();
        assert!(matches!(err, ClassifyError::UpstreamFormat(_)));
    }

    #[tokio::test]
    async fn service_errors_propagate_once() {
        let client = ScriptedClient::new(vec![Err(InferenceError::Service {
            status: 401,
            message: "Incorrect API key provided".to_string(),
        })]);
        let request = ClassificationRequest::Text {
            label: "can".to_string(),
        };

        let err = gateway(client.clone()).classify(request).await.unwrap_err();

        assert!(matches!(err, ClassifyError::Inference(InferenceError::Service { status: 401, .. })));
        assert_eq!(client.calls(), 1);
    }
}
