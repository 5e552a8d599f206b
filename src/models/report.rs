use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AnalysisRecord, Classification, EyeSide, Gender, ImageQuality, PatientRef};
use crate::i18n::Translator;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DraftError {
    #[error("Draft already bound to patient {current}; cannot rebind to {requested}")]
    PatientAlreadyBound { current: String, requested: String },
}

/// Patient identity copied from the registry. No setters: once a draft is
/// bound to a patient these fields cannot be edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientIdentity {
    id: String,
    full_name: String,
    age: Option<u32>,
    gender: Gender,
}

impl From<&PatientRef> for PatientIdentity {
    fn from(patient: &PatientRef) -> Self {
        Self {
            id: patient.id.clone(),
            full_name: patient.full_name.clone(),
            age: patient.age,
            gender: patient.gender,
        }
    }
}

impl PatientIdentity {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn age(&self) -> Option<u32> {
        self.age
    }

    pub fn gender(&self) -> Gender {
        self.gender
    }

    pub fn gender_label(&self, tr: &Translator) -> String {
        tr.gender_label(self.gender)
    }
}

/// Clinician-editable report model. Lives only while the report is being
/// edited; the generated PDF is the only durable output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDraft {
    pub clinic_name: String,
    pub doctor_name: String,
    patient: Option<PatientIdentity>,
    pub eye_side: EyeSide,
    pub image_quality: ImageQuality,
    pub observations: String,
    pub diagnosis: String,
    pub recommendations: Vec<String>,
    analysis: AnalysisRecord,
}

impl ReportDraft {
    /// Open a draft pre-filled from an analysis, the way the editor does.
    pub fn open(analysis: AnalysisRecord, patient: Option<&PatientRef>, tr: &Translator) -> Self {
        let classification = analysis.classification();
        let recommendations = if analysis.recommendations().is_empty() {
            tr.t_list(classification.recommendations_key())
        } else {
            analysis.recommendations().to_vec()
        };

        Self {
            clinic_name: tr.t("report.default_clinic"),
            doctor_name: tr.t("report.default_doctor"),
            patient: patient.map(PatientIdentity::from),
            eye_side: EyeSide::default(),
            image_quality: ImageQuality::default(),
            observations: tr.t("report.default_observations"),
            diagnosis: tr.t(classification.default_diagnosis_key()),
            recommendations,
            analysis,
        }
    }

    pub fn with_clinic(mut self, clinic: impl Into<String>) -> Self {
        self.clinic_name = clinic.into();
        self
    }

    pub fn with_doctor(mut self, doctor: impl Into<String>) -> Self {
        self.doctor_name = doctor.into();
        self
    }

    pub fn analysis(&self) -> &AnalysisRecord {
        &self.analysis
    }

    pub fn patient(&self) -> Option<&PatientIdentity> {
        self.patient.as_ref()
    }

    /// Bind the draft to a registry patient. Rebinding to the same patient is a
    /// no-op; rebinding to another one is refused.
    pub fn bind_patient(&mut self, patient: &PatientRef) -> Result<(), DraftError> {
        match &self.patient {
            Some(current) if current.id != patient.id => Err(DraftError::PatientAlreadyBound {
                current: current.id.clone(),
                requested: patient.id.clone(),
            }),
            Some(_) => Ok(()),
            None => {
                self.patient = Some(PatientIdentity::from(patient));
                Ok(())
            }
        }
    }

    /// Recommendations as edited in a text area: one per line.
    pub fn recommendations_text(&self) -> String {
        self.recommendations.join("\n")
    }

    /// Replace recommendations from newline-delimited text, dropping blank lines.
    pub fn set_recommendations_text(&mut self, text: &str) {
        self.recommendations = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
    }

    /// Labelled fields as shown in the editor.
    pub fn field_view(&self, tr: &Translator) -> Vec<(String, String)> {
        let completed = self.complete(tr);
        vec![
            (tr.t("report.full_name"), completed.patient_name),
            (tr.t("report.age"), completed.patient_age),
            (tr.t("report.gender"), completed.patient_gender),
            (tr.t("report.record_id"), completed.patient_id),
            (tr.t("report.eye_side"), completed.eye_side),
            (tr.t("report.image_quality"), completed.image_quality),
            (
                tr.t("report.ai_analysis"),
                format!("{} ({}%)", completed.classification_label, completed.confidence_label),
            ),
            (tr.t("report.diagnosis"), completed.diagnosis),
        ]
    }

    /// Substitute placeholders for every missing value. The result carries
    /// only display strings, so layout code never branches on absent data.
    pub fn complete(&self, tr: &Translator) -> CompletedReport {
        let or_placeholder = |value: &str, key: &str| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                tr.t(key)
            } else {
                trimmed.to_string()
            }
        };
        let not_available = tr.t("report.not_available");
        let classification = self.analysis.classification();

        let (patient_name, patient_id, patient_age, patient_gender) = match &self.patient {
            Some(p) => (
                or_placeholder(&p.full_name, "report.unknown_patient"),
                or_placeholder(&p.id, "report.not_available"),
                p.age
                    .map(|age| tr.t_count("report.age_value", u64::from(age)))
                    .unwrap_or_else(|| not_available.clone()),
                p.gender_label(tr),
            ),
            None => (
                tr.t("report.unknown_patient"),
                not_available.clone(),
                not_available.clone(),
                not_available.clone(),
            ),
        };

        let mut recommendations: Vec<String> = self
            .recommendations
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect();
        if recommendations.is_empty() {
            recommendations.push(tr.t("report.no_recommendations"));
        }

        CompletedReport {
            clinic_name: or_placeholder(&self.clinic_name, "report.default_clinic"),
            doctor_name: or_placeholder(&self.doctor_name, "report.default_doctor"),
            patient_name,
            patient_id,
            patient_age,
            patient_gender,
            eye_side: tr.eye_side_label(self.eye_side),
            image_quality: tr.image_quality_label(self.image_quality),
            classification,
            classification_label: tr.classification_label(classification),
            result_phrase: tr.result_phrase(classification),
            confidence_label: self.analysis.confidence_label(),
            observations: or_placeholder(&self.observations, "report.not_available"),
            diagnosis: or_placeholder(&self.diagnosis, "report.no_diagnosis"),
            recommendations,
            analysis_id: self.analysis.id().map(str::to_string),
            analysed_at: self.analysis.timestamp(),
        }
    }
}

/// Fully populated, locale-resolved report content.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedReport {
    pub clinic_name: String,
    pub doctor_name: String,
    pub patient_name: String,
    pub patient_id: String,
    pub patient_age: String,
    pub patient_gender: String,
    pub eye_side: String,
    pub image_quality: String,
    pub classification: Classification,
    pub classification_label: String,
    pub result_phrase: String,
    pub confidence_label: String,
    pub observations: String,
    pub diagnosis: String,
    /// Never empty.
    pub recommendations: Vec<String>,
    pub analysis_id: Option<String>,
    pub analysed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::Locale;

    fn analysis() -> AnalysisRecord {
        AnalysisRecord::new(
            Classification::GlaucomaSuspected,
            94.7,
            "2024-05-01T09:30:00Z".parse().unwrap(),
        )
        .with_recommendations(vec![
            "Consult an ophthalmologist".into(),
            "OCT exam required".into(),
        ])
    }

    fn patient(id: &str) -> PatientRef {
        PatientRef {
            id: id.into(),
            full_name: "Jean Dupont".into(),
            age: Some(64),
            gender: Gender::Male,
            phone: None,
            created_at: None,
        }
    }

    #[test]
    fn open_prefills_like_the_editor() {
        let tr = Translator::new(Locale::Fr);
        let draft = ReportDraft::open(analysis(), Some(&patient("12")), &tr);
        assert_eq!(draft.clinic_name, "Cabinet d'Ophtalmologie");
        assert_eq!(draft.eye_side, EyeSide::Right);
        assert_eq!(draft.image_quality, ImageQuality::Good);
        assert_eq!(draft.diagnosis, "Suspicion de neuropathie glaucomateuse.");
        assert_eq!(draft.recommendations.len(), 2);
        assert_eq!(draft.patient().unwrap().full_name(), "Jean Dupont");
    }

    #[test]
    fn rebinding_to_other_patient_is_refused() {
        let tr = Translator::new(Locale::En);
        let mut draft = ReportDraft::open(analysis(), Some(&patient("12")), &tr);
        assert!(draft.bind_patient(&patient("12")).is_ok());
        let err = draft.bind_patient(&patient("99")).unwrap_err();
        assert_eq!(
            err,
            DraftError::PatientAlreadyBound {
                current: "12".into(),
                requested: "99".into()
            }
        );
        assert_eq!(draft.patient().unwrap().id(), "12");
    }

    #[test]
    fn unbound_draft_accepts_binding() {
        let tr = Translator::new(Locale::En);
        let mut draft = ReportDraft::open(analysis(), None, &tr);
        assert!(draft.patient().is_none());
        draft.bind_patient(&patient("5")).unwrap();
        assert_eq!(draft.patient().unwrap().id(), "5");
    }

    #[test]
    fn recommendations_text_round_trips_through_editor() {
        let tr = Translator::new(Locale::En);
        let mut draft = ReportDraft::open(analysis(), None, &tr);
        draft.set_recommendations_text("First\n\n   \n  Second  \n");
        assert_eq!(draft.recommendations, vec!["First".to_string(), "Second".to_string()]);
        assert_eq!(draft.recommendations_text(), "First\nSecond");
    }

    #[test]
    fn complete_substitutes_placeholders() {
        let tr = Translator::new(Locale::En);
        let mut draft = ReportDraft::open(analysis(), None, &tr);
        draft.diagnosis = "   ".into();
        draft.recommendations.clear();
        draft.doctor_name.clear();

        let done = draft.complete(&tr);
        assert_eq!(done.patient_name, "Unknown patient");
        assert_eq!(done.patient_id, "N/A");
        assert_eq!(done.diagnosis, "No diagnosis provided.");
        assert_eq!(done.recommendations, vec!["No recommendation provided.".to_string()]);
        assert_eq!(done.doctor_name, "Physician");
        assert_eq!(done.confidence_label, "94.7");
        assert_eq!(done.result_phrase, "RISK DETECTED");
    }

    #[test]
    fn gender_label_follows_locale_not_storage() {
        let en = Translator::new(Locale::En);
        let fr = Translator::new(Locale::Fr);
        let draft = ReportDraft::open(analysis(), Some(&patient("12")), &en);

        assert_eq!(draft.complete(&en).patient_gender, "Male");
        assert_eq!(draft.complete(&fr).patient_gender, "Homme");
        assert_eq!(draft.patient().unwrap().gender(), Gender::Male);

        let view = draft.field_view(&fr);
        assert!(view.iter().any(|(label, value)| label == "Sexe" && value == "Homme"));
    }

    #[test]
    fn age_uses_plural_forms() {
        let tr = Translator::new(Locale::En);
        let draft = ReportDraft::open(analysis(), Some(&patient("12")), &tr);
        assert_eq!(draft.complete(&tr).patient_age, "64 years");
    }
}
