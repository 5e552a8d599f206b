//! Report assembly: draft → completed content → images → pages → one save.
//!
//! Image and verification-code failures degrade to placeholders; only layout
//! and save failures abort a run.

use std::path::PathBuf;

use chrono::{Local, NaiveDateTime};

use super::export::ReportSink;
use super::layout::{
    chars_per_line, wrap_text, Align, FontSource, GeneratedDocument, LayoutEngine, LayoutOptions,
    PageGeometry, RgbColor, TextStyle,
};
use super::raster::{EncodedRaster, Rasterizer};
use super::verification::{encode_verification_code, VerificationRecord};
use super::ReportError;
use crate::i18n::Translator;
use crate::models::{CompletedReport, ImageRef, ReportDraft};

// ─── Section geometry (mm) ────────────────────────────────────────────────────

const HEADER_HEIGHT: f32 = 40.0;
const IMAGE_SIZE: f32 = 70.0;
const SOURCE_IMAGE_X: f32 = 20.0;
const OVERLAY_IMAGE_X: f32 = 110.0;
const QR_SIZE: f32 = 30.0;
const SECTION_TITLE_HEIGHT: f32 = 9.0;
const SECTION_GAP: f32 = 6.0;
/// Top of the footer area, measured up from the bottom edge.
const FOOTER_TOP: f32 = 24.0;
/// Highlight padding above and below the recommendation lines.
const BAND_PAD: f32 = 2.0;
/// Depth of the highlight below a text baseline.
const BAND_DESCENT: f32 = 1.2;

const PALE_RED: RgbColor = RgbColor(253, 237, 236);

/// Where a saved report ended up.
#[derive(Debug, Clone)]
pub struct SavedReport {
    pub path: PathBuf,
    pub filename: String,
    pub document: GeneratedDocument,
}

pub struct ReportAssembler {
    rasterizer: Rasterizer,
    rtl_font: Option<PathBuf>,
    geometry: PageGeometry,
}

impl ReportAssembler {
    pub fn new(rasterizer: Rasterizer) -> Self {
        Self {
            rasterizer,
            rtl_font: None,
            geometry: PageGeometry::A4,
        }
    }

    /// TrueType font used for right-to-left locales instead of the bundled one.
    pub fn with_rtl_font(mut self, font: Option<PathBuf>) -> Self {
        self.rtl_font = font;
        self
    }

    pub fn layout_options(&self, tr: &Translator) -> LayoutOptions {
        let rtl = tr.locale().is_rtl();
        let font = match (&self.rtl_font, rtl) {
            (Some(path), true) => FontSource::External(path.clone()),
            (None, true) => FontSource::Bundled,
            (_, false) => FontSource::Builtin,
        };
        LayoutOptions {
            geometry: self.geometry,
            mirrored: rtl,
            font,
        }
    }

    pub async fn assemble(
        &self,
        draft: &ReportDraft,
        source: Option<&ImageRef>,
        overlay: Option<&ImageRef>,
        tr: &Translator,
        sink: &dyn ReportSink,
    ) -> Result<SavedReport, ReportError> {
        self.assemble_at(draft, source, overlay, tr, sink, Local::now().naive_local())
            .await
    }

    /// Same as [`assemble`](Self::assemble) with a fixed local clock.
    pub async fn assemble_at(
        &self,
        draft: &ReportDraft,
        source: Option<&ImageRef>,
        overlay: Option<&ImageRef>,
        tr: &Translator,
        sink: &dyn ReportSink,
        now: NaiveDateTime,
    ) -> Result<SavedReport, ReportError> {
        let report = draft.complete(tr);
        let document = self.build(&report, source, overlay, tr, now).await?;
        let filename = report_filename(&report.patient_name, now.date());
        let path = sink.save(&filename, &document.bytes)?;

        tracing::info!(
            filename = %filename,
            pages = document.page_count,
            locale = tr.locale().code(),
            "Report assembled"
        );
        Ok(SavedReport {
            path,
            filename,
            document,
        })
    }

    /// Lay out a completed report without saving it.
    pub async fn build(
        &self,
        report: &CompletedReport,
        source: Option<&ImageRef>,
        overlay: Option<&ImageRef>,
        tr: &Translator,
        now: NaiveDateTime,
    ) -> Result<GeneratedDocument, ReportError> {
        let (source_raster, overlay_raster) =
            tokio::join!(self.load_image(source, "source"), self.load_image(overlay, "overlay"));
        let qr = verification_code(report, now);

        let mut engine = LayoutEngine::new(&tr.t("report.title"), self.layout_options(tr))?;
        write_header(&mut engine, report, tr, now);
        write_patient_block(&mut engine, report, tr);
        write_images(&mut engine, source_raster.as_ref(), overlay_raster.as_ref(), tr);
        write_technical_row(&mut engine, report, tr);
        write_observations(&mut engine, report, tr);
        write_diagnosis(&mut engine, report, tr);
        write_recommendations(&mut engine, report, tr);
        write_verification(&mut engine, report, qr.as_ref(), tr);
        write_footer(&mut engine, tr, now);

        Ok(engine.finish()?)
    }

    async fn load_image(&self, image: Option<&ImageRef>, role: &str) -> Option<EncodedRaster> {
        let image = image?;
        match self.rasterizer.rasterize(image).await {
            Ok(raster) => Some(raster),
            Err(e) => {
                tracing::warn!(role, source = %image.describe(), error = %e, "Report image unavailable");
                None
            }
        }
    }
}

/// `Rapport_<name>_<YYYY-MM-DD>.pdf`, with every run of non-alphanumeric
/// characters in the name collapsed to one `_`.
pub fn report_filename(patient_name: &str, date: chrono::NaiveDate) -> String {
    let mut name = String::with_capacity(patient_name.len());
    for c in patient_name.chars() {
        if c.is_alphanumeric() {
            name.push(c);
        } else if !name.ends_with('_') {
            name.push('_');
        }
    }
    let name = name.trim_matches('_');
    let name = if name.is_empty() { "patient" } else { name };
    format!("Rapport_{}_{}.pdf", name, date.format("%Y-%m-%d"))
}

fn verification_code(report: &CompletedReport, now: NaiveDateTime) -> Option<EncodedRaster> {
    let record = VerificationRecord {
        report_id: report
            .analysis_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        doctor: report.doctor_name.clone(),
        patient_id: report.patient_id.clone(),
        patient_name: report.patient_name.clone(),
        date: now.format("%Y-%m-%d").to_string(),
        result: report.classification.as_str().to_string(),
    };
    match encode_verification_code(&record) {
        Ok(raster) => Some(raster),
        Err(e) => {
            tracing::warn!(error = %e, "Verification code skipped");
            None
        }
    }
}

// ─── Sections ─────────────────────────────────────────────────────────────────

fn write_header(engine: &mut LayoutEngine, report: &CompletedReport, tr: &Translator, now: NaiveDateTime) {
    let g = engine.geometry();
    let center = g.width / 2.0;
    engine.fill_rect(0.0, 0.0, g.width, HEADER_HEIGHT, RgbColor::MEDICAL_BLUE);

    let white = |size: f32| TextStyle::new(size).color(RgbColor::WHITE);
    engine.write_heading(&report.clinic_name, center, 15.0, Align::Center, white(20.0).bold());
    engine.write_heading(&tr.t("report.title"), center, 25.0, Align::Center, white(12.0));
    let date = tr.format_date(now.date());
    let line = tr.t_with(
        "report.header_line",
        &[("date", date.as_str()), ("id", report.patient_id.as_str())],
    );
    engine.write_heading(&line, center, 33.0, Align::Center, white(10.0));

    engine.set_cursor(HEADER_HEIGHT + 15.0);
}

fn section_title(engine: &mut LayoutEngine, title: &str) {
    let g = engine.geometry();
    let y = engine.cursor();
    engine.write_heading(
        title,
        g.margin_x,
        y,
        Align::Left,
        TextStyle::new(14.0).bold().color(RgbColor::MEDICAL_BLUE),
    );
    engine.draw_rule(g.margin_x, g.width - g.margin_x, y + 2.0, RgbColor::GREY);
    engine.advance(SECTION_TITLE_HEIGHT);
}

fn write_patient_block(engine: &mut LayoutEngine, report: &CompletedReport, tr: &Translator) {
    const ROW: f32 = 8.0;
    engine.ensure_space(SECTION_TITLE_HEIGHT + 2.0 * ROW);
    section_title(engine, &tr.t("report.patient_info"));

    let rows = [
        [
            (tr.t("report.full_name"), report.patient_name.as_str()),
            (tr.t("report.age"), report.patient_age.as_str()),
        ],
        [
            (tr.t("report.gender"), report.patient_gender.as_str()),
            (tr.t("report.record_id"), report.patient_id.as_str()),
        ],
    ];
    let label = TextStyle::new(10.0).bold().color(RgbColor::SLATE);
    let value = TextStyle::new(10.0);
    for row in &rows {
        let y = engine.cursor();
        for ((name, text), x) in row.iter().zip([20.0, 110.0]) {
            engine.write_heading(&format!("{name}:"), x, y, Align::Left, label);
            engine.write_heading(text, x + 35.0, y, Align::Left, value);
        }
        engine.advance(ROW);
    }
    engine.advance(SECTION_GAP);
}

fn write_images(
    engine: &mut LayoutEngine,
    source: Option<&EncodedRaster>,
    overlay: Option<&EncodedRaster>,
    tr: &Translator,
) {
    engine.ensure_space(IMAGE_SIZE + 14.0);
    let y = engine.cursor();
    let caption = TextStyle::new(10.0).bold();
    let slots = [
        (SOURCE_IMAGE_X, source, "report.source_image"),
        (OVERLAY_IMAGE_X, overlay, "report.overlay_image"),
    ];

    for (x, raster, key) in slots {
        let center = x + IMAGE_SIZE / 2.0;
        engine.write_pinned(&tr.t(key), center, y, Align::Center, caption);

        let top = y + 4.0;
        let placed = match raster {
            Some(raster) => match engine.place_image(raster, x, top, IMAGE_SIZE, IMAGE_SIZE) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "Report image could not be embedded");
                    false
                }
            },
            None => false,
        };
        if !placed {
            engine.fill_rect(x, top, IMAGE_SIZE, IMAGE_SIZE, RgbColor::PALE_SLATE);
            engine.write_pinned(
                &tr.t("report.image_unavailable"),
                center,
                top + IMAGE_SIZE / 2.0,
                Align::Center,
                TextStyle::new(9.0).color(RgbColor::GREY),
            );
        }
    }
    engine.set_cursor(y + 4.0 + IMAGE_SIZE + 10.0);
}

fn write_technical_row(engine: &mut LayoutEngine, report: &CompletedReport, tr: &Translator) {
    const BAND: f32 = 14.0;
    engine.ensure_space(BAND);
    let g = engine.geometry();
    let y = engine.cursor();
    engine.fill_rect(g.margin_x, y, g.content_width(), BAND, RgbColor::PALE_SLATE);

    let ai = format!("{} ({}%)", report.classification_label, report.confidence_label);
    let cells = [
        (tr.t("report.eye_side"), report.eye_side.clone()),
        (tr.t("report.image_quality"), report.image_quality.clone()),
        (tr.t("report.ai_analysis"), ai),
    ];
    for ((label, value), x) in cells.iter().zip([25.0, 82.0, 139.0]) {
        engine.write_heading(label, x, y + 5.0, Align::Left, TextStyle::new(8.0).bold().color(RgbColor::SLATE));
        engine.write_heading(value, x, y + 11.0, Align::Left, TextStyle::new(10.0));
    }
    engine.set_cursor(y + BAND + 8.0);
}

/// Wrapped text that may continue on following pages, one line at a time.
fn flow_paragraph(engine: &mut LayoutEngine, text: &str, style: TextStyle) {
    let g = engine.geometry();
    let step = style.line_height();
    for line in wrap_text(text, chars_per_line(g.content_width(), &style)) {
        engine.ensure_space(step);
        let y = engine.cursor();
        if !line.is_empty() {
            engine.write_heading(&line, g.margin_x, y, Align::Left, style);
        }
        engine.advance(step);
    }
}

fn write_observations(engine: &mut LayoutEngine, report: &CompletedReport, tr: &Translator) {
    let style = TextStyle::new(10.0);
    engine.ensure_space(SECTION_TITLE_HEIGHT + 2.0 * style.line_height());
    section_title(engine, &tr.t("report.observations"));
    flow_paragraph(engine, &report.observations, style);
    engine.advance(SECTION_GAP);
}

fn write_diagnosis(engine: &mut LayoutEngine, report: &CompletedReport, tr: &Translator) {
    let g = engine.geometry();
    let style = TextStyle::new(11.0).bold();
    engine.ensure_space(SECTION_TITLE_HEIGHT + 7.0 + style.line_height());
    section_title(engine, &tr.t("report.diagnosis"));

    let color = if report.classification.is_risk_positive() {
        RgbColor::RISK_RED
    } else {
        RgbColor::SAFE_GREEN
    };
    let phrase = format!("{} ({}%)", report.result_phrase, report.confidence_label);
    let y = engine.cursor();
    engine.write_heading(&phrase, g.margin_x, y, Align::Left, TextStyle::new(12.0).bold().color(color));
    engine.advance(7.0);

    flow_paragraph(engine, &report.diagnosis, style);
    engine.advance(SECTION_GAP);
}

/// Bulleted lines on a highlight band. The band is painted one line at a
/// time so it follows the text across page breaks.
fn write_recommendations(engine: &mut LayoutEngine, report: &CompletedReport, tr: &Translator) {
    let g = engine.geometry();
    let style = TextStyle::new(10.0);
    let step = style.line_height();
    let text_x = g.margin_x + 5.0;
    let per_line = chars_per_line(g.content_width() - 10.0, &style);
    let lines: Vec<String> = report
        .recommendations
        .iter()
        .flat_map(|r| wrap_text(&format!("\u{2022} {r}"), per_line))
        .collect();
    let fill = if report.classification.is_risk_positive() {
        PALE_RED
    } else {
        RgbColor::PALE_GREEN
    };

    engine.ensure_space(SECTION_TITLE_HEIGHT + BAND_PAD + 2.0 * step);
    section_title(engine, &tr.t("report.recommendations"));
    engine.advance(BAND_PAD + 1.0);

    let mut segment_start = true;
    let mut last_baseline = engine.cursor();
    for line in &lines {
        if engine.ensure_space(step) {
            segment_start = true;
        }
        let y = engine.cursor();
        let bottom = y + BAND_DESCENT;
        let top = bottom - step - if segment_start { BAND_PAD } else { 0.0 };
        engine.fill_rect(g.margin_x, top, g.content_width(), bottom - top, fill);
        if !line.is_empty() {
            engine.write_heading(line, text_x, y, Align::Left, style);
        }
        segment_start = false;
        last_baseline = y;
        engine.advance(step);
    }

    let band_end = last_baseline + BAND_DESCENT;
    engine.fill_rect(g.margin_x, band_end, g.content_width(), BAND_PAD, fill);
    engine.set_cursor(band_end + BAND_PAD + SECTION_GAP + 4.0);
}

fn write_verification(
    engine: &mut LayoutEngine,
    report: &CompletedReport,
    qr: Option<&EncodedRaster>,
    tr: &Translator,
) {
    engine.ensure_space(QR_SIZE + 8.0);
    let g = engine.geometry();
    let y = engine.cursor();
    let right = g.width - g.margin_x;

    if let Some(qr) = qr {
        match engine.place_image(qr, g.margin_x, y, QR_SIZE, QR_SIZE) {
            Ok(()) => engine.write_pinned(
                &tr.t("report.verification"),
                g.margin_x + QR_SIZE / 2.0,
                y + QR_SIZE + 4.0,
                Align::Center,
                TextStyle::new(8.0).color(RgbColor::GREY),
            ),
            Err(e) => tracing::warn!(error = %e, "Verification code could not be embedded"),
        }
    }

    engine.write_pinned(
        &tr.t_with("report.verified_by", &[("doctor", report.doctor_name.as_str())]),
        right,
        y + 10.0,
        Align::Right,
        TextStyle::new(10.0).bold(),
    );
    engine.draw_rule(right - 60.0, right, y + 25.0, RgbColor::BLACK);
    engine.write_pinned(
        &tr.t("report.signature"),
        right - 30.0,
        y + 30.0,
        Align::Center,
        TextStyle::new(9.0).color(RgbColor::GREY),
    );
    engine.set_cursor(y + QR_SIZE + 8.0);
}

fn write_footer(engine: &mut LayoutEngine, tr: &Translator, now: NaiveDateTime) {
    let g = engine.geometry();
    let top = g.height - FOOTER_TOP;
    if engine.cursor() > top {
        engine.new_page();
    }

    engine.draw_rule(g.margin_x, g.width - g.margin_x, top + 2.0, RgbColor::GREY);
    let grey = |size: f32| TextStyle::new(size).color(RgbColor::GREY);
    let datetime = tr.format_datetime(now);
    let stamp = tr.t_with("report.generated_on", &[("datetime", datetime.as_str())]);
    engine.write_heading(&stamp, g.width / 2.0, top + 7.0, Align::Center, grey(8.0));
    engine.write_paragraph(&tr.t("report.disclaimer"), g.margin_x, top + 12.0, g.content_width(), grey(7.0));
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::i18n::Locale;
    use crate::models::{AnalysisRecord, Classification, Gender, PatientRef};
    use crate::report::export::ExportError;
    use crate::test_support::{png_bytes, serve};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use chrono::NaiveDate;

    #[derive(Default)]
    struct MemorySink {
        saved: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl MemorySink {
        fn count(&self) -> usize {
            self.saved.lock().unwrap().len()
        }
    }

    impl ReportSink for MemorySink {
        fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, ExportError> {
            self.saved
                .lock()
                .unwrap()
                .push((filename.to_string(), bytes.to_vec()));
            Ok(PathBuf::from("/memory").join(filename))
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(10, 15, 0)
            .unwrap()
    }

    fn inline_png() -> ImageRef {
        ImageRef::Inline(format!("data:image/png;base64,{}", BASE64.encode(png_bytes(24, 24))))
    }

    fn patient() -> PatientRef {
        PatientRef {
            id: "12".into(),
            full_name: "Jean Dupont".into(),
            age: Some(64),
            gender: Gender::Male,
            phone: None,
            created_at: None,
        }
    }

    fn draft(tr: &Translator) -> ReportDraft {
        let analysis = AnalysisRecord::new(
            Classification::GlaucomaSuspected,
            94.7,
            "2024-05-01T09:30:00Z".parse().unwrap(),
        )
        .with_id("a-1")
        .with_source_image(Some(inline_png()))
        .with_overlay(Some(inline_png()))
        .with_default_recommendations(tr);
        ReportDraft::open(analysis, Some(&patient()), tr)
    }

    fn assembler() -> ReportAssembler {
        ReportAssembler::new(Rasterizer::new(reqwest::Client::new()))
    }

    async fn run(tr: &Translator, draft: &ReportDraft, sink: &MemorySink) -> SavedReport {
        assembler()
            .assemble_at(
                draft,
                draft.analysis().source_image(),
                draft.analysis().overlay(),
                tr,
                sink,
                now(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn complete_draft_saves_exactly_once() {
        let tr = Translator::new(Locale::En);
        let sink = MemorySink::default();
        let saved = run(&tr, &draft(&tr), &sink).await;

        assert_eq!(sink.count(), 1);
        assert_eq!(&saved.document.bytes[0..4], b"%PDF");
        assert_eq!(saved.document.images.len(), 3);
        let (name, bytes) = sink.saved.lock().unwrap()[0].clone();
        assert_eq!(name, saved.filename);
        assert_eq!(bytes, saved.document.bytes);
    }

    #[tokio::test]
    async fn unreachable_source_image_degrades_to_placeholder() {
        let app = Router::new().route("/expired.png", get(|| async { StatusCode::FORBIDDEN }));
        let base = serve(app).await;
        let tr = Translator::new(Locale::En);
        let draft = draft(&tr);
        let sink = MemorySink::default();

        let source = ImageRef::Url(format!("{base}/expired.png"));
        let saved = assembler()
            .assemble_at(&draft, Some(&source), draft.analysis().overlay(), &tr, &sink, now())
            .await
            .unwrap();

        assert_eq!(sink.count(), 1);
        assert!(saved.document.contains_text("(Image unavailable or expired)"));
        // overlay + QR only
        assert_eq!(saved.document.images.len(), 2);
    }

    #[tokio::test]
    async fn same_input_gives_same_transcript() {
        let tr = Translator::new(Locale::Fr);
        let draft = draft(&tr);
        let first = run(&tr, &draft, &MemorySink::default()).await;
        let second = run(&tr, &draft, &MemorySink::default()).await;
        assert_eq!(first.document.text_runs, second.document.text_runs);
        assert_eq!(first.document.images, second.document.images);
    }

    #[tokio::test]
    async fn transcript_differs_only_in_timestamp_runs() {
        let tr = Translator::new(Locale::En);
        let draft = draft(&tr);
        let report = draft.complete(&tr);
        let later = now() + chrono::Duration::minutes(5);
        let a = assembler().build(&report, None, None, &tr, now()).await.unwrap();
        let b = assembler().build(&report, None, None, &tr, later).await.unwrap();

        let differing: Vec<_> = a
            .text_runs
            .iter()
            .zip(&b.text_runs)
            .filter(|(x, y)| x != y)
            .map(|(x, _)| x.text.clone())
            .collect();
        assert_eq!(differing.len(), 1);
        assert!(differing[0].starts_with("Generated on"));
    }

    #[tokio::test]
    async fn gender_label_is_localized_in_document() {
        let en = Translator::new(Locale::En);
        let fr = Translator::new(Locale::Fr);
        let draft = draft(&en);

        let english = run(&en, &draft, &MemorySink::default()).await;
        assert!(english.document.texts().contains(&"Male"));

        let french = run(&fr, &draft, &MemorySink::default()).await;
        assert!(french.document.texts().contains(&"Homme"));
        assert!(!french.document.texts().contains(&"Male"));
        assert_eq!(draft.patient().unwrap().gender(), Gender::Male);
    }

    #[tokio::test]
    async fn empty_recommendations_render_placeholder() {
        let tr = Translator::new(Locale::En);
        let mut draft = draft(&tr);
        draft.recommendations.clear();
        let sink = MemorySink::default();
        let saved = run(&tr, &draft, &sink).await;

        assert_eq!(sink.count(), 1);
        assert!(saved.document.contains_text("No recommendation provided."));
    }

    #[tokio::test]
    async fn suspected_glaucoma_names_file_and_flags_risk() {
        let tr = Translator::new(Locale::En);
        let saved = run(&tr, &draft(&tr), &MemorySink::default()).await;

        assert_eq!(saved.filename, "Rapport_Jean_Dupont_2024-05-01.pdf");
        assert_eq!(saved.path, PathBuf::from("/memory/Rapport_Jean_Dupont_2024-05-01.pdf"));
        assert!(saved.document.texts().contains(&"RISK DETECTED (94.7%)"));
    }

    #[test]
    fn rtl_locale_picks_embedded_font() {
        let ar = Translator::new(Locale::Ar);
        let en = Translator::new(Locale::En);

        let options = assembler().layout_options(&ar);
        assert!(options.mirrored);
        assert_eq!(options.font, FontSource::Bundled);
        assert_eq!(assembler().layout_options(&en).font, FontSource::Builtin);

        let configured = assembler().with_rtl_font(Some("/fonts/Amiri-Regular.ttf".into()));
        assert_eq!(
            configured.layout_options(&ar).font,
            FontSource::External("/fonts/Amiri-Regular.ttf".into())
        );
        assert_eq!(configured.layout_options(&en).font, FontSource::Builtin);
    }

    #[tokio::test]
    async fn arabic_mirrors_text_but_not_images() {
        let ar = Translator::new(Locale::Ar);
        let en = Translator::new(Locale::En);
        let assembler = assembler();

        let draft = draft(&en);
        let rtl = assembler
            .build(&draft.complete(&ar), draft.analysis().source_image(), draft.analysis().overlay(), &ar, now())
            .await
            .unwrap();
        let ltr = assembler
            .build(&draft.complete(&en), draft.analysis().source_image(), draft.analysis().overlay(), &en, now())
            .await
            .unwrap();

        assert!(rtl.external_font);
        assert!(!ltr.external_font);
        assert!(rtl.bytes.windows(9).any(|w| w == b"FontFile2"));
        assert_eq!(rtl.images, ltr.images);
        let title = |doc: &GeneratedDocument, text: String| {
            doc.text_runs.iter().find(|r| r.text == text).cloned().unwrap()
        };
        let ar_heading = title(&rtl, ar.t("report.patient_info"));
        let en_heading = title(&ltr, en.t("report.patient_info"));
        assert_eq!(ar_heading.align, Align::Right);
        assert_eq!(en_heading.align, Align::Left);
        assert!((ar_heading.x - (210.0 - en_heading.x)).abs() < 1e-4);
    }

    #[tokio::test]
    async fn unusable_rtl_font_still_embeds_bundled_font() {
        let ar = Translator::new(Locale::Ar);
        let draft = draft(&ar);
        let doc = assembler()
            .with_rtl_font(Some("/nonexistent/Amiri-Regular.ttf".into()))
            .build(&draft.complete(&ar), None, None, &ar, now())
            .await
            .unwrap();
        assert!(doc.external_font);
        assert!(doc.contains_text(&ar.t("report.patient_info")));
    }

    #[tokio::test]
    async fn long_recommendation_list_stays_inside_pages() {
        let tr = Translator::new(Locale::En);
        let mut draft = draft(&tr);
        draft.recommendations = (1..=70)
            .map(|n| format!("Recommendation number {n}: repeat the fundus photograph and compare"))
            .collect();
        let saved = run(&tr, &draft, &MemorySink::default()).await;
        let doc = &saved.document;

        let bottom = PageGeometry::A4.bottom_limit();
        let bullets: Vec<_> = doc.text_runs.iter().filter(|r| r.text.starts_with('\u{2022}')).collect();
        assert_eq!(bullets.len(), 70);
        assert!(doc.page_count >= 2);
        assert!(bullets.iter().all(|r| r.y <= bottom), "bullet below bottom margin");
        assert!(doc.text_runs.iter().all(|r| r.y <= PageGeometry::A4.height));
        // bullets stay in order across pages
        assert!(bullets.windows(2).all(|w| (w[0].page, w[0].y) < (w[1].page, w[1].y)));
    }

    #[tokio::test]
    async fn long_observations_flow_onto_next_page() {
        let tr = Translator::new(Locale::En);
        let mut draft = draft(&tr);
        draft.observations = "Cup-to-disc ratio increased with rim notching. ".repeat(120);
        let saved = run(&tr, &draft, &MemorySink::default()).await;
        let doc = &saved.document;
        assert!(doc.page_count >= 2);
        assert!(doc.contains_text("Generated on"));
        let bottom = PageGeometry::A4.bottom_limit();
        assert!(doc.text_runs.iter().filter(|r| r.size == 10.0).all(|r| r.y <= bottom));
    }

    #[test]
    fn filename_sanitizes_patient_name() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(report_filename("Jean Dupont", date), "Rapport_Jean_Dupont_2024-05-01.pdf");
        assert_eq!(report_filename("  O'Neil -- Ann ", date), "Rapport_O_Neil_Ann_2024-05-01.pdf");
        assert_eq!(report_filename("Hélène", date), "Rapport_Hélène_2024-05-01.pdf");
        assert_eq!(report_filename("///", date), "Rapport_patient_2024-05-01.pdf");
    }
}
