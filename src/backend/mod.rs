//! Client for the remote screening backend (auth, analysis, registry,
//! history, dashboard and the assistant chats).

pub mod client;
pub mod types;
pub mod upload;

pub use client::{BackendClient, Utf8StreamDecoder};
pub use types::{ChatMessage, ChatRole, UploadResponse};
pub use upload::{validate_credentials, validate_signup, ImageUpload, ValidationError};

use crate::i18n::Translator;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Session rejected by the backend (401)")]
    Unauthorized,

    #[error("Rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    /// Credentials or form refused, with the backend's reason.
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Backend returned HTTP {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Backend is not reachable at {0}")]
    Connection(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Malformed backend response: {0}")]
    InvalidResponse(String),

    #[error("Analysis failed: {0}")]
    Analysis(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl BackendError {
    /// Localized text for the user. Backend details are only shown for
    /// rejected forms, where the reason is meant for the user.
    pub fn user_message(&self, tr: &Translator) -> String {
        match self {
            Self::NotAuthenticated => tr.t("errors.not_authenticated"),
            Self::Unauthorized => tr.t("errors.unauthorized"),
            Self::RateLimited { .. } => tr.t("errors.rate_limited"),
            Self::Rejected(detail) if !detail.trim().is_empty() => detail.clone(),
            Self::Rejected(_) => tr.t("errors.unauthorized"),
            Self::Connection(_) | Self::Timeout(_) => tr.t("errors.network"),
            Self::Status { .. } | Self::Analysis(_) => tr.t("errors.server"),
            Self::Http(_) | Self::InvalidResponse(_) => tr.t("errors.unexpected"),
            Self::Validation(e) => e.user_message(tr),
        }
    }

    /// The user must log in (again) before retrying.
    pub fn needs_login(&self) -> bool {
        matches!(self, Self::NotAuthenticated | Self::Unauthorized)
    }
}
