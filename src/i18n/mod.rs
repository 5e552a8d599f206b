//! Localization: four embedded dictionaries keyed by dotted paths.
//!
//! Lookups fall back to the French dictionary (the product default) and then
//! to the key itself, so a missing translation never aborts a report.
//! Placeholders use the `{{name}}` form. Plural forms live under
//! `<key>_<category>` with CLDR category names.

use std::fmt;
use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Classification, EyeSide, Gender, ImageQuality};

// ─── Locale ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    #[default]
    Fr,
    Es,
    Ar,
}

pub const FALLBACK_LOCALE: Locale = Locale::Fr;

pub const ALL_LOCALES: [Locale; 4] = [Locale::En, Locale::Fr, Locale::Es, Locale::Ar];

/// Text direction of a locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ltr,
    Rtl,
}

impl Locale {
    pub fn code(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Fr => "fr",
            Self::Es => "es",
            Self::Ar => "ar",
        }
    }

    /// Accepts bare codes and POSIX/BCP-47 tags: `fr`, `fr-FR`, `fr_FR.UTF-8`.
    pub fn parse(tag: &str) -> Option<Self> {
        let primary = tag
            .trim()
            .split(['-', '_', '.', '@'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match primary.as_str() {
            "en" => Some(Self::En),
            "fr" => Some(Self::Fr),
            "es" => Some(Self::Es),
            "ar" => Some(Self::Ar),
            _ => None,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Self::Ar => Direction::Rtl,
            _ => Direction::Ltr,
        }
    }

    pub fn is_rtl(&self) -> bool {
        self.direction() == Direction::Rtl
    }

    fn index(&self) -> usize {
        match self {
            Self::En => 0,
            Self::Fr => 1,
            Self::Es => 2,
            Self::Ar => 3,
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ─── Plural rules ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluralCategory {
    Zero,
    One,
    Two,
    Few,
    Many,
    Other,
}

impl PluralCategory {
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Zero => "zero",
            Self::One => "one",
            Self::Two => "two",
            Self::Few => "few",
            Self::Many => "many",
            Self::Other => "other",
        }
    }
}

/// Cardinal plural category for a non-negative integer.
pub fn plural_category(locale: Locale, n: u64) -> PluralCategory {
    match locale {
        Locale::En | Locale::Es => {
            if n == 1 {
                PluralCategory::One
            } else {
                PluralCategory::Other
            }
        }
        // French groups 0 with 1.
        Locale::Fr => {
            if n <= 1 {
                PluralCategory::One
            } else {
                PluralCategory::Other
            }
        }
        Locale::Ar => match (n, n % 100) {
            (0, _) => PluralCategory::Zero,
            (1, _) => PluralCategory::One,
            (2, _) => PluralCategory::Two,
            (_, 3..=10) => PluralCategory::Few,
            (_, 11..=99) => PluralCategory::Many,
            _ => PluralCategory::Other,
        },
    }
}

// ─── Catalogs ─────────────────────────────────────────────────────────────────

const SOURCES: [(Locale, &str); 4] = [
    (Locale::En, include_str!("locales/en.json")),
    (Locale::Fr, include_str!("locales/fr.json")),
    (Locale::Es, include_str!("locales/es.json")),
    (Locale::Ar, include_str!("locales/ar.json")),
];

static CATALOGS: OnceLock<Vec<Value>> = OnceLock::new();

fn catalog(locale: Locale) -> &'static Value {
    let catalogs = CATALOGS.get_or_init(|| {
        SOURCES
            .iter()
            .map(|(locale, raw)| {
                serde_json::from_str(raw).unwrap_or_else(|e| {
                    tracing::error!(locale = %locale, error = %e, "Locale dictionary is not valid JSON");
                    Value::Null
                })
            })
            .collect()
    });
    &catalogs[locale.index()]
}

fn lookup<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(root, |node, part| node.get(part))
}

/// Replace every `{{name}}` placeholder with its value.
pub fn interpolate(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{{{name}}}}}"), value);
    }
    out
}

// ─── Translator ───────────────────────────────────────────────────────────────

/// Resolves dotted keys for one locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translator {
    locale: Locale,
}

impl Translator {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn direction(&self) -> Direction {
        self.locale.direction()
    }

    /// Value for the `Accept-Language` header on localized backend calls.
    pub fn accept_language(&self) -> &'static str {
        self.locale.code()
    }

    fn resolve(&self, key: &str) -> Option<&'static Value> {
        lookup(catalog(self.locale), key).or_else(|| {
            if self.locale != FALLBACK_LOCALE {
                tracing::debug!(key, locale = %self.locale, "Missing translation, using fallback");
            }
            lookup(catalog(FALLBACK_LOCALE), key)
        })
    }

    pub fn has(&self, key: &str) -> bool {
        lookup(catalog(self.locale), key).is_some_and(Value::is_string)
    }

    pub fn t(&self, key: &str) -> String {
        match self.resolve(key).and_then(Value::as_str) {
            Some(text) => text.to_string(),
            None => {
                tracing::warn!(key, "Unknown translation key");
                key.to_string()
            }
        }
    }

    pub fn t_with(&self, key: &str, vars: &[(&str, &str)]) -> String {
        interpolate(&self.t(key), vars)
    }

    /// Ordered string array stored under `key`; empty when absent.
    pub fn t_list(&self, key: &str) -> Vec<String> {
        self.resolve(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Plural-aware lookup; `{{count}}` is filled with `n`.
    pub fn t_count(&self, key: &str, n: u64) -> String {
        let category = plural_category(self.locale, n);
        let candidate = format!("{key}_{}", category.suffix());
        let chosen = if self.has(&candidate) {
            candidate
        } else {
            format!("{key}_other")
        };
        let count = n.to_string();
        self.t_with(&chosen, &[("count", &count)])
    }

    pub fn gender_label(&self, gender: Gender) -> String {
        self.t(gender.i18n_key())
    }

    pub fn eye_side_label(&self, side: EyeSide) -> String {
        self.t(side.i18n_key())
    }

    pub fn image_quality_label(&self, quality: ImageQuality) -> String {
        self.t(quality.i18n_key())
    }

    pub fn classification_label(&self, classification: Classification) -> String {
        self.t(classification.i18n_key())
    }

    /// Short result phrase printed in reports ("RISK DETECTED" / "NO ANOMALY DETECTED").
    pub fn result_phrase(&self, classification: Classification) -> String {
        if classification.is_risk_positive() {
            self.t("result.risk_detected")
        } else {
            self.t("result.no_anomaly")
        }
    }

    pub fn format_date(&self, date: NaiveDate) -> String {
        date.format(self.date_pattern()).to_string()
    }

    pub fn format_datetime(&self, at: NaiveDateTime) -> String {
        format!("{} {}", at.format(self.date_pattern()), at.format("%H:%M"))
    }

    fn date_pattern(&self) -> &'static str {
        match self.locale {
            Locale::En => "%m/%d/%Y",
            Locale::Fr | Locale::Es | Locale::Ar => "%d/%m/%Y",
        }
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::new(FALLBACK_LOCALE)
    }
}
