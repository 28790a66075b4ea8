use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Body of `POST /api/classify`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextRequestBody {
    #[serde(default)]
    pub label: Option<String>,
}

/// Body of `POST /api/classify-image`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageRequestBody {
    #[serde(default)]
    pub image: Option<String>,
}

/// A validated classification request. Built once per call and consumed by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassificationRequest {
    Text { label: String },
    Image { image: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Text,
    Image,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::Text => "text",
            RequestKind::Image => "image",
        }
    }
}

impl ClassificationRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            ClassificationRequest::Text { .. } => RequestKind::Text,
            ClassificationRequest::Image { .. } => RequestKind::Image,
        }
    }
}

/// What the inference service said about an item.
///
/// Field values are passed through as returned: `bin` is not checked against
/// the four categories and numbers keep the encoding the model used.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub item_name: String,
    pub bin: String,
    pub co2_saved: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClassificationResult {
    /// Best-effort normalization of a parsed model payload. Only a JSON object is accepted.
    pub fn from_payload(payload: Value) -> Option<Self> {
        let Value::Object(mut fields) = payload else {
            return None;
        };

        let item_name = take_string(&mut fields, "itemName");
        let bin = take_string(&mut fields, "bin");
        let co2_saved = take_number(&mut fields, "co2Saved").unwrap_or_else(|| Value::from(0));
        let points = take_number(&mut fields, "points");

        Some(Self {
            item_name,
            bin,
            co2_saved,
            points,
            extra: fields,
        })
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> String {
    match fields.remove(key) {
        Some(Value::String(s)) => s,
        _ => String::new(),
    }
}

/// Absent or null yields `None`. Numeric strings become numbers; any other
/// value is kept as the model sent it.
fn take_number(fields: &mut Map<String, Value>, key: &str) -> Option<Value> {
    match fields.remove(key)? {
        Value::Null => None,
        Value::String(s) => Some(parse_number(&s).map(Value::Number).unwrap_or(Value::String(s))),
        other => Some(other),
    }
}

fn parse_number(s: &str) -> Option<Number> {
    let s = s.trim();
    s.parse::<i64>()
        .ok()
        .map(Number::from)
        .or_else(|| s.parse::<f64>().ok().and_then(Number::from_f64))
}

#[derive(Debug, Serialize)]
pub struct SuccessEnvelope<T> {
    pub success: bool,
    pub data: T,
}

impl<T> SuccessEnvelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
