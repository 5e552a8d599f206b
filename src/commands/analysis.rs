//! Screening upload and the two chat assistants.

use std::io::Write;
use std::path::Path;

use super::{report, AppContext, ReportFields};
use crate::backend::{BackendError, ImageUpload};
use crate::models::AnalysisRecord;

pub async fn analyze(
    ctx: &AppContext,
    image: &Path,
    patient_id: Option<&str>,
    with_report: bool,
    fields: &ReportFields,
) -> Result<(), String> {
    let upload = ImageUpload::from_path(image, &ctx.config.upload)
        .map_err(|e| ctx.fail(BackendError::from(e)))?;
    let record = ctx
        .client
        .analyze(&ctx.session, &upload, patient_id)
        .await
        .map_err(|e| ctx.fail(e))?;

    print_result(ctx, &record);

    if with_report {
        let draft = report::open_draft(ctx, record).await?;
        report::finish(ctx, draft, None, fields).await?;
    }
    Ok(())
}

fn print_result(ctx: &AppContext, record: &AnalysisRecord) {
    let tr = ctx.tr();
    let label = tr.classification_label(record.classification());
    let confidence = record.confidence_label();
    println!(
        "{}",
        tr.t_with(
            "cli.analysis_result",
            &[("label", label.as_str()), ("confidence", confidence.as_str())],
        )
    );
    for line in record.recommendations() {
        println!("  • {line}");
    }
}

/// Ask the clinical assistant, optionally about one past analysis.
pub async fn chat(ctx: &AppContext, message: &str, history_id: Option<&str>) -> Result<(), String> {
    let context = match history_id {
        Some(id) => Some(history_record(ctx, id).await?),
        None => None,
    };
    let mut echo = StreamEcho::new(std::io::stdout());
    let reply = ctx
        .client
        .chat(&ctx.session, message, &[], context.as_ref(), |chunk| echo.push(chunk))
        .await;
    echo.finish();
    end_stream(ctx, reply)
}

pub async fn guide(ctx: &AppContext, message: &str) -> Result<(), String> {
    let mut echo = StreamEcho::new(std::io::stdout());
    let reply = ctx
        .client
        .guide(&ctx.session, message, &[], |chunk| echo.push(chunk))
        .await;
    echo.finish();
    end_stream(ctx, reply)
}

/// Prints assistant chunks as they arrive. The first write failure is
/// logged and later chunks are dropped; the reply itself is still collected.
struct StreamEcho<W: Write> {
    out: W,
    failed: bool,
}

impl<W: Write> StreamEcho<W> {
    fn new(out: W) -> Self {
        Self { out, failed: false }
    }

    fn push(&mut self, chunk: &str) {
        if self.failed {
            return;
        }
        if let Err(e) = self.out.write_all(chunk.as_bytes()) {
            tracing::warn!(error = %e, "Cannot print assistant reply");
            self.failed = true;
        }
    }

    /// Flush once the stream is over. Returns false if any write failed.
    fn finish(mut self) -> bool {
        if !self.failed {
            if let Err(e) = self.out.flush() {
                tracing::warn!(error = %e, "Cannot flush assistant reply");
                self.failed = true;
            }
        }
        !self.failed
    }
}

fn end_stream(ctx: &AppContext, reply: Result<String, BackendError>) -> Result<(), String> {
    println!();
    match reply {
        Ok(_) => Ok(()),
        Err(e) if e.needs_login() => Err(ctx.fail(e)),
        Err(e) => {
            tracing::error!(error = %e, "Assistant stream failed");
            Err(ctx.tr().t("errors.chat"))
        }
    }
}

async fn history_record(ctx: &AppContext, id: &str) -> Result<AnalysisRecord, String> {
    let entries = ctx
        .client
        .history(&ctx.session)
        .await
        .map_err(|e| ctx.fail(e))?;
    entries
        .iter()
        .find(|e| e.id == id)
        .map(|e| e.to_record())
        .ok_or_else(|| ctx.tr().t_with("cli.history_not_found", &[("id", id)]))
}
