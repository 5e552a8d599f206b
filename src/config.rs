use std::path::PathBuf;

use crate::i18n::Translator;

/// Application-level constants
pub const APP_NAME: &str = "Glaucoview";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Backend used when `GLAUCOVIEW_API_URL` is not set.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Upload service waits up to a minute on the inference service.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Largest fundus image accepted for upload.
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// Get the application data directory
/// Platform data dir (e.g. ~/.local/share/Glaucoview), falling back to the
/// working directory when no home is known.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Get the default report exports directory
pub fn exports_dir() -> PathBuf {
    app_data_dir().join("exports")
}

/// Get the persisted session file (token + locale)
pub fn session_path() -> PathBuf {
    app_data_dir().join("session.json")
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "glaucoview_lib=info,glaucoview=info,warn"
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

impl ConfigError {
    pub fn user_message(&self, tr: &Translator) -> String {
        match self {
            Self::InvalidValue { key, value } => {
                tr.t_with("errors.config", &[("key", *key), ("value", value.as_str())])
            }
        }
    }
}

/// Runtime configuration resolved from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_url: String,
    pub timeout_secs: u64,
    pub exports_dir: PathBuf,
    /// TrueType font for right-to-left locales, replacing the bundled one.
    pub rtl_font: Option<PathBuf>,
    /// Clinic name pre-filled in new report drafts.
    pub clinic_name: Option<String>,
    pub upload: UploadLimits,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            exports_dir: exports_dir(),
            rtl_font: None,
            clinic_name: None,
            upload: UploadLimits::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = get("GLAUCOVIEW_API_URL") {
            config.api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(raw) = get("GLAUCOVIEW_TIMEOUT_SECS") {
            config.timeout_secs = raw
                .trim()
                .parse()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidValue {
                    key: "GLAUCOVIEW_TIMEOUT_SECS",
                    value: raw.clone(),
                })?;
        }
        if let Some(dir) = get("GLAUCOVIEW_EXPORTS_DIR") {
            config.exports_dir = PathBuf::from(dir);
        }
        config.rtl_font = get("GLAUCOVIEW_RTL_FONT").map(PathBuf::from);
        config.clinic_name = get("GLAUCOVIEW_CLINIC");

        Ok(config)
    }
}

/// Upload constraints checked before any network call.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadLimits {
    pub max_bytes: u64,
    pub allowed_mime_types: Vec<String>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_bytes: MAX_UPLOAD_BYTES,
            allowed_mime_types: vec!["image/jpeg".into(), "image/png".into()],
        }
    }
}
