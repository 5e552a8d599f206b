//! PDF report generation from a past analysis or a saved draft.

use std::path::{Path, PathBuf};

use super::{AppContext, ReportFields};
use crate::i18n::Translator;
use crate::models::{AnalysisRecord, PatientRef, ReportDraft};
use crate::report::{DirectorySink, Rasterizer, ReportAssembler};

pub async fn from_history(
    ctx: &AppContext,
    history_id: &str,
    save_draft: Option<&Path>,
    fields: &ReportFields,
) -> Result<(), String> {
    let tr = ctx.tr();
    let entries = ctx
        .client
        .history(&ctx.session)
        .await
        .map_err(|e| ctx.fail(e))?;
    let entry = entries
        .iter()
        .find(|e| e.id == history_id)
        .ok_or_else(|| tr.t_with("cli.history_not_found", &[("id", history_id)]))?;

    let record = entry.to_record().with_default_recommendations(&tr);
    let draft = open_draft(ctx, record).await?;
    finish(ctx, draft, save_draft, fields).await
}

pub async fn from_draft(
    ctx: &AppContext,
    path: &Path,
    save_draft: Option<&Path>,
    fields: &ReportFields,
) -> Result<(), String> {
    let draft = read_draft(path).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "Draft unreadable");
        ctx.tr().t("cli.draft_invalid")
    })?;
    finish(ctx, draft, save_draft, fields).await
}

/// Open a draft for `record`, bound to its registry patient when known.
pub(super) async fn open_draft(ctx: &AppContext, record: AnalysisRecord) -> Result<ReportDraft, String> {
    let tr = ctx.tr();
    let patient = match record.patient_id() {
        Some(id) => find_patient(ctx, id).await?,
        None => None,
    };
    let mut draft = ReportDraft::open(record, patient.as_ref(), &tr);
    if let Some(clinic) = &ctx.config.clinic_name {
        draft.clinic_name = clinic.clone();
    }
    Ok(draft)
}

async fn find_patient(ctx: &AppContext, id: &str) -> Result<Option<PatientRef>, String> {
    let patients = ctx
        .client
        .list_patients(&ctx.session)
        .await
        .map_err(|e| ctx.fail(e))?;
    let found = patients.into_iter().find(|p| p.id == id);
    if found.is_none() {
        tracing::warn!(patient_id = id, "Patient not in registry, report left unbound");
    }
    Ok(found)
}

/// Apply edits, then either store the draft or render it.
pub(super) async fn finish(
    ctx: &AppContext,
    mut draft: ReportDraft,
    save_draft: Option<&Path>,
    fields: &ReportFields,
) -> Result<(), String> {
    let tr = ctx.tr();
    apply_fields(&mut draft, fields);

    if let Some(path) = save_draft {
        write_draft(path, &draft).map_err(|e| draft_write_message(&tr, path, &e))?;
        let shown = path.display().to_string();
        println!("{}", tr.t_with("cli.draft_saved", &[("path", shown.as_str())]));
        return Ok(());
    }

    let assembler = ReportAssembler::new(Rasterizer::new(ctx.client.http().clone()))
        .with_rtl_font(ctx.config.rtl_font.clone());
    let out: PathBuf = fields
        .out
        .clone()
        .unwrap_or_else(|| ctx.config.exports_dir.clone());
    let sink = DirectorySink::new(out);

    let analysis = draft.analysis();
    let saved = assembler
        .assemble(&draft, analysis.source_image(), analysis.overlay(), &tr, &sink)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Report generation failed");
            e.user_message(&tr)
        })?;

    let shown = saved.path.display().to_string();
    println!("{}", tr.t_with("cli.report_saved", &[("path", shown.as_str())]));
    Ok(())
}

/// Only fields given on the command line override the draft.
pub fn apply_fields(draft: &mut ReportDraft, fields: &ReportFields) {
    if let Some(doctor) = &fields.doctor {
        draft.doctor_name = doctor.clone();
    }
    if let Some(clinic) = &fields.clinic {
        draft.clinic_name = clinic.clone();
    }
    if let Some(eye) = fields.eye {
        draft.eye_side = eye;
    }
    if let Some(quality) = fields.quality {
        draft.image_quality = quality;
    }
    if let Some(observations) = &fields.observations {
        draft.observations = observations.clone();
    }
    if let Some(diagnosis) = &fields.diagnosis {
        draft.diagnosis = diagnosis.clone();
    }
    if !fields.recommendations.is_empty() {
        draft.set_recommendations_text(&fields.recommendations.join("\n"));
    }
}

#[derive(Debug, thiserror::Error)]
enum DraftFileError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn read_draft(path: &Path) -> Result<ReportDraft, DraftFileError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn draft_write_message(tr: &Translator, path: &Path, error: &DraftFileError) -> String {
    tracing::error!(path = %path.display(), error = %error, "Draft write failed");
    let shown = path.display().to_string();
    tr.t_with("errors.draft_write", &[("path", shown.as_str())])
}

fn write_draft(path: &Path, draft: &ReportDraft) -> Result<(), DraftFileError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(draft)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::{Locale, Translator};
    use crate::models::{Classification, EyeSide, ImageQuality};
    use chrono::Utc;

    fn draft() -> ReportDraft {
        let record = AnalysisRecord::new(Classification::GlaucomaSuspected, 91.2, Utc::now());
        ReportDraft::open(record, None, &Translator::new(Locale::En))
    }

    #[test]
    fn unset_fields_keep_draft_defaults() {
        let mut d = draft();
        let before = d.clone();
        apply_fields(&mut d, &ReportFields::default());
        assert_eq!(d, before);
    }

    #[test]
    fn given_fields_override() {
        let mut d = draft();
        let fields = ReportFields {
            doctor: Some("Benali".into()),
            eye: Some(EyeSide::Both),
            quality: Some(ImageQuality::Poor),
            diagnosis: Some("Early cupping".into()),
            recommendations: vec!["OCT".into(), "  ".into(), "IOP in 1 month".into()],
            ..Default::default()
        };
        apply_fields(&mut d, &fields);
        assert_eq!(d.doctor_name, "Benali");
        assert_eq!(d.eye_side, EyeSide::Both);
        assert_eq!(d.image_quality, ImageQuality::Poor);
        assert_eq!(d.diagnosis, "Early cupping");
        assert_eq!(d.recommendations, vec!["OCT", "IOP in 1 month"]);
    }

    #[test]
    fn draft_file_roundtrip_keeps_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drafts/d.json");
        let d = draft();
        write_draft(&path, &d).unwrap();
        let loaded = read_draft(&path).unwrap();
        assert_eq!(loaded.analysis().confidence(), 91.2);
        assert_eq!(loaded, d);
    }

    #[test]
    fn malformed_draft_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.json");
        std::fs::write(&path, "{\"clinic_name\": 3}").unwrap();
        assert!(matches!(read_draft(&path), Err(DraftFileError::Json(_))));
    }

    #[test]
    fn draft_write_failure_is_localized() {
        let dir = tempfile::tempdir().unwrap();
        // parent is a regular file, so the directory cannot be created
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let target = blocker.join("draft.json");

        let err = write_draft(&target, &draft()).unwrap_err();
        let message = draft_write_message(&Translator::new(Locale::Fr), &target, &err);
        assert!(message.starts_with("Le brouillon n'a pas pu être écrit"), "{message}");
        assert!(message.contains("draft.json"));
        assert!(!message.contains("os error"));
    }
}
