use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ModelError;

/// Macro to generate enum with as_str + std::str::FromStr + translation key.
/// The wire form (`as_str`) is also the serde representation.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal : $key:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            /// Dotted translation key of the display label.
            pub fn i18n_key(&self) -> &'static str {
                match self {
                    $(Self::$variant => $key),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ModelError::InvalidEnum {
                        field: stringify!($name),
                        value: s.into(),
                    }),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

str_enum!(Classification {
    Healthy => "healthy" : "classification.healthy",
    GlaucomaSuspected => "glaucoma_suspected" : "classification.glaucoma_suspected",
});

str_enum!(Gender {
    Male => "M" : "gender.male",
    Female => "F" : "gender.female",
});

str_enum!(EyeSide {
    Right => "right" : "eye.right",
    Left => "left" : "eye.left",
    Both => "both" : "eye.both",
});

// Declaration order is the rating order: Poor < Fair < Good < Excellent.
str_enum!(ImageQuality {
    Poor => "poor" : "quality.poor",
    Fair => "fair" : "quality.fair",
    Good => "good" : "quality.good",
    Excellent => "excellent" : "quality.excellent",
});

impl Classification {
    /// Backend class index: 0 = no glaucoma, 1 = glaucoma detected.
    pub fn from_class_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(Self::Healthy),
            1 => Some(Self::GlaucomaSuspected),
            _ => None,
        }
    }

    pub fn from_flag(has_glaucoma: bool) -> Self {
        if has_glaucoma {
            Self::GlaucomaSuspected
        } else {
            Self::Healthy
        }
    }

    pub fn is_risk_positive(&self) -> bool {
        matches!(self, Self::GlaucomaSuspected)
    }

    /// Translation key of the default recommendation list.
    pub fn recommendations_key(&self) -> &'static str {
        match self {
            Self::Healthy => "recommendations.healthy",
            Self::GlaucomaSuspected => "recommendations.risk",
        }
    }

    /// Translation key of the diagnosis line pre-filled in new drafts.
    pub fn default_diagnosis_key(&self) -> &'static str {
        match self {
            Self::Healthy => "report.diagnosis_normal",
            Self::GlaucomaSuspected => "report.diagnosis_suspected",
        }
    }
}

impl Default for EyeSide {
    fn default() -> Self {
        Self::Right
    }
}

impl Default for ImageQuality {
    fn default() -> Self {
        Self::Good
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_index_mapping() {
        assert_eq!(Classification::from_class_index(0), Some(Classification::Healthy));
        assert_eq!(
            Classification::from_class_index(1),
            Some(Classification::GlaucomaSuspected)
        );
        assert_eq!(Classification::from_class_index(2), None);
        assert_eq!(Classification::from_class_index(-1), None);
    }

    #[test]
    fn gender_uses_single_letter_wire_form() {
        assert_eq!(serde_json::to_string(&Gender::Male).unwrap(), "\"M\"");
        let parsed: Gender = serde_json::from_str("\"F\"").unwrap();
        assert_eq!(parsed, Gender::Female);
        assert!(serde_json::from_str::<Gender>("\"X\"").is_err());
    }

    #[test]
    fn image_quality_is_ordered() {
        assert!(ImageQuality::Poor < ImageQuality::Fair);
        assert!(ImageQuality::Good < ImageQuality::Excellent);
        let max = ImageQuality::ALL.iter().max().unwrap();
        assert_eq!(*max, ImageQuality::Excellent);
    }

    #[test]
    fn unknown_value_reports_field() {
        let err = "sideways".parse::<EyeSide>().unwrap_err();
        assert!(err.to_string().contains("EyeSide"));
        assert!(err.to_string().contains("sideways"));
    }

    #[test]
    fn defaults_match_editor() {
        assert_eq!(EyeSide::default(), EyeSide::Right);
        assert_eq!(ImageQuality::default(), ImageQuality::Good);
    }

    #[test]
    fn risk_flag() {
        assert!(Classification::from_flag(true).is_risk_positive());
        assert!(!Classification::Healthy.is_risk_positive());
    }
}
