//! Wire types for the screening backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::i18n::Translator;
use crate::models::{probability_to_percent, AnalysisRecord, Classification, ImageRef};

/// Chat history entries longer than this are truncated before sending.
pub const MAX_HISTORY_MESSAGE_CHARS: usize = 1000;

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SignupRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// FastAPI error body. `detail` is a string or a list of validation items.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn detail_text(&self) -> Option<String> {
        match self.detail.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub analysis: AnalysisPayload,
}

/// Model output relayed by the upload endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisPayload {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub prediction_class: Option<i64>,
    #[serde(default)]
    pub prediction_label: Option<String>,
    /// Probability of the predicted class, in [0,1].
    #[serde(default)]
    pub probability: Option<f64>,
    /// Base64 payload, with or without a data-URI prefix.
    #[serde(default)]
    pub gradcam_image: Option<String>,
    #[serde(default)]
    pub gradcam_url: Option<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

impl AnalysisPayload {
    /// `Inline` for an embedded payload, `Url` (absolute) for a stored file.
    pub fn overlay(&self, base_url: &str) -> Option<ImageRef> {
        if let Some(inline) = self.gradcam_image.as_ref().filter(|s| !s.trim().is_empty()) {
            return Some(ImageRef::Inline(inline.clone()));
        }
        self.gradcam_url
            .as_ref()
            .filter(|s| !s.trim().is_empty())
            .map(|url| ImageRef::Url(resolve_url(base_url, url)))
    }

    fn id_string(&self) -> Option<String> {
        match self.id.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Build the analysis record. Errors carry the backend's error text.
    pub fn into_record(
        self,
        base_url: &str,
        source: Option<ImageRef>,
        patient_id: Option<&str>,
        tr: &Translator,
        at: DateTime<Utc>,
    ) -> Result<AnalysisRecord, String> {
        if let Some(error) = self.error.as_ref() {
            return Err(match &self.details {
                Some(details) => format!("{error}: {details}"),
                None => error.clone(),
            });
        }
        let class = self
            .prediction_class
            .ok_or_else(|| "missing prediction_class".to_string())?;
        let classification = Classification::from_class_index(class)
            .ok_or_else(|| format!("unknown prediction_class {class}"))?;
        let probability = self
            .probability
            .ok_or_else(|| "missing probability".to_string())?;

        let overlay = self.overlay(base_url);
        let mut record = AnalysisRecord::new(classification, probability_to_percent(probability), at)
            .with_source_image(source)
            .with_overlay(overlay);
        if let Some(id) = self.id_string() {
            record = record.with_id(id);
        }
        if let Some(patient_id) = patient_id {
            record = record.with_patient(patient_id);
        }
        record = if self.recommendations.is_empty() {
            record.with_default_recommendations(tr)
        } else {
            record.with_recommendations(self.recommendations)
        };
        Ok(record)
    }
}

/// Absolute URLs pass through; relative ones are joined to the API base.
pub fn resolve_url(base_url: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") || url.starts_with("data:") {
        return url.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        url.trim_start_matches('/')
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// JSON history as sent in the `history` form field, each message capped.
pub fn history_field(history: &[ChatMessage]) -> Result<String, serde_json::Error> {
    let trimmed: Vec<ChatMessage> = history
        .iter()
        .map(|m| ChatMessage {
            role: m.role,
            content: m.content.chars().take(MAX_HISTORY_MESSAGE_CHARS).collect(),
        })
        .collect();
    serde_json::to_string(&trimmed)
}
