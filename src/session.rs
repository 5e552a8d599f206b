//! Explicit session context: auth token and UI locale, persisted as JSON in
//! the app data directory and passed to every call that needs them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::i18n::{Locale, Translator, FALLBACK_LOCALE};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session file error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Corrupt session file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl SessionError {
    /// Localized message; the raw error stays in the log.
    pub fn user_message(&self, tr: &Translator) -> String {
        match self {
            Self::Io { path, .. } => {
                let shown = path.display().to_string();
                tr.t_with("errors.session", &[("path", shown.as_str())])
            }
            Self::Corrupt { path, .. } => {
                let shown = path.display().to_string();
                tr.t_with("errors.session_corrupt", &[("path", shown.as_str())])
            }
        }
    }
}

/// On-disk shape. The locale is only stored once the user picks one.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSession {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    locale: Option<Locale>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    token: Option<String>,
    locale: Locale,
    /// Explicit user choice, the only locale that is persisted.
    chosen: Option<Locale>,
}

impl Session {
    pub fn anonymous(locale: Locale) -> Self {
        Self {
            token: None,
            locale,
            chosen: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn sign_out(&mut self) {
        self.token = None;
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Explicit user choice; persisted on the next save.
    pub fn set_locale(&mut self, locale: Locale) {
        self.locale = locale;
        self.chosen = Some(locale);
    }

    /// Use `locale` for this run only; the stored choice is left untouched.
    pub fn override_locale(&mut self, locale: Locale) {
        self.locale = locale;
    }

    pub fn translator(&self) -> Translator {
        Translator::new(self.locale)
    }
}

/// Loads and saves the session file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Locale order: stored choice, then the `LANG`-style tag, then `fr`.
    pub fn load(&self, system_lang: Option<&str>) -> Result<Session, SessionError> {
        let stored = match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str::<StoredSession>(&raw).map_err(|source| {
                SessionError::Corrupt {
                    path: self.path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoredSession::default(),
            Err(source) => {
                return Err(SessionError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let locale = stored
            .locale
            .or_else(|| system_lang.and_then(Locale::parse))
            .unwrap_or(FALLBACK_LOCALE);
        tracing::debug!(
            path = %self.path.display(),
            authenticated = stored.token.is_some(),
            locale = locale.code(),
            "Session loaded"
        );

        Ok(Session {
            token: stored.token,
            locale,
            chosen: stored.locale,
        })
    }

    pub fn save(&self, session: &Session) -> Result<(), SessionError> {
        let stored = StoredSession {
            token: session.token.clone(),
            locale: session.chosen,
        };
        let io_err = |source| SessionError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(&stored).map_err(|source| SessionError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, json).map_err(io_err)?;
        Ok(())
    }
}
