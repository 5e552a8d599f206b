//! Verification code: a QR code carrying a short attribution record so a
//! printed report can be matched back to its issuer and analysis.

use image::{DynamicImage, GrayImage, Luma};
use qrcode::{Color, EcLevel, QrCode};
use serde::{Deserialize, Serialize};

use super::raster::{EncodedRaster, RasterError, RasterFormat};

/// Keeps the code scannable at footer size.
pub const MAX_PAYLOAD_BYTES: usize = 512;

const MODULE_PX: u32 = 4;
const QUIET_ZONE_MODULES: u32 = 4;

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Verification payload is {size} bytes, limit is {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Could not serialize verification record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("QR encoding failed: {0}")]
    Encoding(String),

    #[error(transparent)]
    Raster(#[from] RasterError),
}

/// The handful of short fields encoded in the code. Never a report body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub report_id: String,
    pub doctor: String,
    pub patient_id: String,
    pub patient_name: String,
    /// `YYYY-MM-DD`
    pub date: String,
    pub result: String,
}

impl VerificationRecord {
    pub fn payload(&self) -> Result<String, VerificationError> {
        let json = serde_json::to_string(self)?;
        if json.len() > MAX_PAYLOAD_BYTES {
            return Err(VerificationError::PayloadTooLarge {
                size: json.len(),
                max: MAX_PAYLOAD_BYTES,
            });
        }
        Ok(json)
    }
}

/// Render the record as a PNG QR code (level M, 4 px modules, 4-module margin).
pub fn encode_verification_code(record: &VerificationRecord) -> Result<EncodedRaster, VerificationError> {
    let payload = record.payload()?;
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::M)
        .map_err(|e| VerificationError::Encoding(e.to_string()))?;

    let image = render_modules(code.width() as u32, &code.to_colors());
    Ok(EncodedRaster::encode(&DynamicImage::ImageLuma8(image), RasterFormat::Png)?)
}

fn render_modules(modules: u32, colors: &[Color]) -> GrayImage {
    let side = (modules + 2 * QUIET_ZONE_MODULES) * MODULE_PX;
    let mut image = GrayImage::from_pixel(side, side, Luma([255]));
    for (index, color) in colors.iter().enumerate() {
        if *color != Color::Dark {
            continue;
        }
        let mx = index as u32 % modules + QUIET_ZONE_MODULES;
        let my = index as u32 / modules + QUIET_ZONE_MODULES;
        for dy in 0..MODULE_PX {
            for dx in 0..MODULE_PX {
                image.put_pixel(mx * MODULE_PX + dx, my * MODULE_PX + dy, Luma([0]));
            }
        }
    }
    image
}
