//! Client-side PDF report generation.
//!
//! Leaf-first: `raster` and `verification` produce embeddable images,
//! `layout` writes pages, `assembler` drives the sections and hands the
//! finished bytes to an `export` sink.

pub mod assembler;
pub mod export;
pub mod layout;
pub mod raster;
pub mod shaping;
pub mod verification;

pub use assembler::{report_filename, ReportAssembler, SavedReport};
pub use export::{DirectorySink, ExportError, ReportSink};
pub use layout::{GeneratedDocument, LayoutEngine, LayoutError, LayoutOptions};
pub use raster::{EncodedRaster, RasterError, Rasterizer};
pub use verification::{encode_verification_code, VerificationError, VerificationRecord};

use crate::i18n::Translator;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

impl ReportError {
    /// Localized message for the clinician. Save failures name the target.
    pub fn user_message(&self, tr: &Translator) -> String {
        let path = match self {
            Self::Export(ExportError::CreateDir { path, .. } | ExportError::Write { path, .. }) => path,
            _ => return tr.t("errors.report"),
        };
        let shown = path.display().to_string();
        tr.t_with("errors.report_save", &[("path", shown.as_str())])
    }
}
