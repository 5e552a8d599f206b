use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::patient::id_as_string;
use super::{probability_to_percent, AnalysisRecord, Classification, ImageRef, PatientRef};

/// One row of the clinician's analysis history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub has_glaucoma: bool,
    /// Probability in [0,1], as stored by the backend.
    pub confidence: f64,
    #[serde(deserialize_with = "flexible_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_expired: bool,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub patient_id: Option<serde_json::Value>,
    #[serde(default)]
    pub patient_name: Option<String>,
}

impl HistoryEntry {
    pub fn classification(&self) -> Classification {
        Classification::from_flag(self.has_glaucoma)
    }

    pub fn confidence_percent(&self) -> f64 {
        probability_to_percent(self.confidence)
    }

    /// Uploaded file name without the `<user>_<timestamp>_` storage prefix.
    pub fn display_filename(&self) -> Option<String> {
        self.filename.as_ref().map(|name| {
            let parts: Vec<&str> = name.split('_').collect();
            if parts.len() > 2 {
                parts[2..].join("_")
            } else {
                name.clone()
            }
        })
    }

    fn patient_id_string(&self) -> Option<String> {
        match &self.patient_id {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Rehydrate an analysis. Expired images are dropped so report
    /// generation goes straight to the placeholder.
    pub fn to_record(&self) -> AnalysisRecord {
        let source = if self.is_expired {
            None
        } else {
            self.image_url.clone().map(ImageRef::Url)
        };
        let mut record =
            AnalysisRecord::new(self.classification(), self.confidence_percent(), self.timestamp)
                .with_id(self.id.clone())
                .with_source_image(source);
        if let Some(patient_id) = self.patient_id_string() {
            record = record.with_patient(patient_id);
        }
        record
    }
}

/// Dashboard counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    #[serde(default)]
    pub total_patients: u64,
    #[serde(default)]
    pub total_analyses: u64,
    #[serde(default)]
    pub total_glaucoma: u64,
    #[serde(default)]
    pub recent_patients: Vec<PatientRef>,
}

impl DashboardStats {
    pub fn total_healthy(&self) -> u64 {
        self.total_analyses.saturating_sub(self.total_glaucoma)
    }

    /// Share of analyses flagged as glaucoma, one decimal; 0 without analyses.
    pub fn prevalence_percent(&self) -> f64 {
        if self.total_analyses == 0 {
            return 0.0;
        }
        let ratio = self.total_glaucoma as f64 / self.total_analyses as f64;
        (ratio * 1000.0).round() / 10.0
    }
}

/// Accepts RFC 3339 and the naive ISO form the backend emits for UTC.
fn flexible_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    if let Ok(at) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}
