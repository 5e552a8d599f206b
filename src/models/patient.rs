use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

use super::Gender;

/// Read-only copy of a patient from the backend registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRef {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub full_name: String,
    #[serde(default)]
    pub age: Option<u32>,
    pub gender: Gender,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

/// Payload for registering a new patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPatient {
    pub full_name: String,
    pub age: Option<u32>,
    pub gender: Gender,
    pub phone: Option<String>,
}

/// Backend ids are integers in some responses and strings in others.
pub(crate) fn id_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Int(i64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Int(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}
