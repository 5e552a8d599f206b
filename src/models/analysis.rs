use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Classification;
use crate::i18n::Translator;

/// Where an image can be loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ImageRef {
    /// Remote resource fetched over HTTP.
    Url(String),
    /// File on the local disk (fresh uploads).
    File(PathBuf),
    /// Data URI or bare base64 payload returned inline by the backend.
    Inline(String),
}

impl ImageRef {
    /// Short description safe for logs (inline payloads are not printed).
    pub fn describe(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::File(path) => path.display().to_string(),
            Self::Inline(payload) => format!("inline ({} bytes)", payload.len()),
        }
    }
}

/// Result of one screening event. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    id: Option<String>,
    patient_id: Option<String>,
    classification: Classification,
    /// Percentage, one decimal.
    confidence: f64,
    source_image: Option<ImageRef>,
    overlay: Option<ImageRef>,
    recommendations: Vec<String>,
    timestamp: DateTime<Utc>,
}

/// Probability in [0,1] → percentage rounded to one decimal.
pub fn probability_to_percent(probability: f64) -> f64 {
    let clamped = probability.clamp(0.0, 1.0);
    (clamped * 1000.0).round() / 10.0
}

impl AnalysisRecord {
    pub fn new(classification: Classification, confidence: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: None,
            patient_id: None,
            classification,
            confidence: (confidence.clamp(0.0, 100.0) * 10.0).round() / 10.0,
            source_image: None,
            overlay: None,
            recommendations: Vec::new(),
            timestamp,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    pub fn with_source_image(mut self, image: Option<ImageRef>) -> Self {
        self.source_image = image;
        self
    }

    pub fn with_overlay(mut self, overlay: Option<ImageRef>) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn with_recommendations(mut self, recommendations: Vec<String>) -> Self {
        self.recommendations = recommendations;
        self
    }

    /// Fill recommendations from the locale defaults when none were given.
    pub fn with_default_recommendations(self, tr: &Translator) -> Self {
        if !self.recommendations.is_empty() {
            return self;
        }
        let defaults = tr.t_list(self.classification.recommendations_key());
        self.with_recommendations(defaults)
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn patient_id(&self) -> Option<&str> {
        self.patient_id.as_deref()
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Confidence pre-formatted for display, e.g. `94.7`.
    pub fn confidence_label(&self) -> String {
        format!("{:.1}", self.confidence)
    }

    pub fn source_image(&self) -> Option<&ImageRef> {
        self.source_image.as_ref()
    }

    pub fn overlay(&self) -> Option<&ImageRef> {
        self.overlay.as_ref()
    }

    pub fn recommendations(&self) -> &[String] {
        &self.recommendations
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Text-only summary for the assistant endpoint (no image payloads).
    pub fn context_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "classification": self.classification.as_str(),
            "has_glaucoma": self.classification.is_risk_positive(),
            "confidence": self.confidence,
            "recommendations": self.recommendations,
            "timestamp": self.timestamp.to_rfc3339(),
        })
    }
}
