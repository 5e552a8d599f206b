//! Client-side checks run before anything is sent to the backend.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::UploadLimits;
use crate::i18n::Translator;

pub const MIN_PASSWORD_LEN: usize = 8;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("No image at {0}")]
    Missing(PathBuf),

    #[error("Cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Image is {size} bytes, limit is {max}")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Unsupported image type: {0}")]
    UnsupportedType(String),

    #[error("No patient selected")]
    NoPatient,

    #[error("Email and password are required")]
    MissingCredentials,

    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("Password shorter than {min} characters")]
    PasswordTooShort { min: usize },
}

impl ValidationError {
    pub fn user_message(&self, tr: &Translator) -> String {
        match self {
            Self::Missing(_) | Self::Unreadable { .. } => tr.t("errors.missing_file"),
            Self::FileTooLarge { max, .. } => {
                let mb = (max / (1024 * 1024)).to_string();
                tr.t_with("errors.file_too_large", &[("max", mb.as_str())])
            }
            Self::UnsupportedType(_) => tr.t("errors.unsupported_type"),
            Self::NoPatient => tr.t("errors.no_patient"),
            Self::MissingCredentials => tr.t("errors.missing_credentials"),
            Self::InvalidEmail(_) => tr.t("errors.invalid_email"),
            Self::PasswordTooShort { .. } => tr.t("errors.password_too_short"),
        }
    }
}

/// A fundus image that passed the upload checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    filename: String,
    mime: String,
    bytes: Vec<u8>,
    path: Option<PathBuf>,
}

impl ImageUpload {
    pub fn from_path(path: &Path, limits: &UploadLimits) -> Result<Self, ValidationError> {
        let meta = match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(ValidationError::Missing(path.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ValidationError::Missing(path.to_path_buf()))
            }
            Err(source) => {
                return Err(ValidationError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        check_size(meta.len(), limits)?;

        let bytes = std::fs::read(path).map_err(|source| ValidationError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "fundus".to_string());

        let mut upload = Self::from_bytes(filename, bytes, limits)?;
        upload.path = Some(path.to_path_buf());
        Ok(upload)
    }

    /// Validate in-memory bytes. Content sniffing wins over the extension.
    pub fn from_bytes(filename: impl Into<String>, bytes: Vec<u8>, limits: &UploadLimits) -> Result<Self, ValidationError> {
        let filename = filename.into();
        check_size(bytes.len() as u64, limits)?;

        let sniffed = image::guess_format(&bytes)
            .ok()
            .and_then(|format| match format {
                image::ImageFormat::Jpeg => Some("image/jpeg"),
                image::ImageFormat::Png => Some("image/png"),
                _ => None,
            });
        let declared = mime_guess::from_path(&filename).first_raw();

        let mime = match sniffed {
            Some(mime) => mime.to_string(),
            None => {
                return Err(ValidationError::UnsupportedType(
                    declared.unwrap_or("unknown").to_string(),
                ))
            }
        };
        if !limits.allowed_mime_types.iter().any(|m| m == &mime) {
            return Err(ValidationError::UnsupportedType(mime));
        }
        if declared.is_some_and(|d| d != mime) {
            tracing::debug!(filename = %filename, declared = ?declared, sniffed = %mime, "Extension does not match content");
        }

        Ok(Self {
            filename,
            mime,
            bytes,
            path: None,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

fn check_size(size: u64, limits: &UploadLimits) -> Result<(), ValidationError> {
    if size > limits.max_bytes {
        return Err(ValidationError::FileTooLarge {
            size,
            max: limits.max_bytes,
        });
    }
    Ok(())
}

pub fn validate_credentials(email: &str, password: &str) -> Result<(), ValidationError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(ValidationError::MissingCredentials);
    }
    Ok(())
}

pub fn validate_signup(email: &str, password: &str) -> Result<(), ValidationError> {
    validate_credentials(email, password)?;
    if !EMAIL_PATTERN.is_match(email.trim()) {
        return Err(ValidationError::InvalidEmail(email.to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

/// The analysis flow refuses to start without a selected patient.
pub fn require_patient(patient_id: Option<&str>) -> Result<&str, ValidationError> {
    patient_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(ValidationError::NoPatient)
}
