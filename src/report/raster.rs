//! Image rasterization for report embedding.
//!
//! Any [`ImageRef`] is loaded, decoded, redrawn at its native pixel size on an
//! opaque canvas and re-encoded as a base64 raster payload. The payload can be
//! embedded any number of times.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::StreamExt;
use image::{DynamicImage, GenericImageView, ImageOutputFormat, RgbImage};

use crate::models::ImageRef;

/// Hard cap on downloaded or decoded image payloads.
pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

const JPEG_QUALITY: u8 = 92;

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("Image fetch failed: {0}")]
    Fetch(String),

    #[error("Image host refused {url} (status {status})")]
    Denied { url: String, status: u16 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data URI: {0}")]
    InvalidDataUri(String),

    #[error("Image too large: {size} bytes exceeds {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("Could not decode image: {0}")]
    Decode(String),

    #[error("Could not encode image: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    Jpeg,
    Png,
}

impl RasterFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    fn output_format(&self) -> ImageOutputFormat {
        match self {
            Self::Jpeg => ImageOutputFormat::Jpeg(JPEG_QUALITY),
            Self::Png => ImageOutputFormat::Png,
        }
    }
}

/// Base64 raster payload with its pixel dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRaster {
    format: RasterFormat,
    width: u32,
    height: u32,
    base64: String,
}

impl EncodedRaster {
    pub fn encode(image: &DynamicImage, format: RasterFormat) -> Result<Self, RasterError> {
        let mut buf = Cursor::new(Vec::new());
        image
            .write_to(&mut buf, format.output_format())
            .map_err(|e| RasterError::Encode(e.to_string()))?;
        let (width, height) = image.dimensions();
        Ok(Self {
            format,
            width,
            height,
            base64: BASE64.encode(buf.into_inner()),
        })
    }

    pub fn format(&self) -> RasterFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn base64(&self) -> &str {
        &self.base64
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.format.mime(), self.base64)
    }

    pub fn decode(&self) -> Result<DynamicImage, RasterError> {
        let bytes = BASE64
            .decode(&self.base64)
            .map_err(|e| RasterError::InvalidDataUri(e.to_string()))?;
        image::load_from_memory(&bytes).map_err(|e| RasterError::Decode(e.to_string()))
    }
}

/// Decode a `data:<mime>;base64,<payload>` URI or a bare base64 string.
pub fn decode_data_uri(input: &str) -> Result<Vec<u8>, RasterError> {
    let trimmed = input.trim();
    let payload = match trimmed.strip_prefix("data:") {
        Some(rest) => {
            let (meta, data) = rest
                .split_once(',')
                .ok_or_else(|| RasterError::InvalidDataUri("missing ',' separator".into()))?;
            if !meta.ends_with(";base64") {
                return Err(RasterError::InvalidDataUri(format!(
                    "unsupported encoding in '{meta}'"
                )));
            }
            data
        }
        None => trimmed,
    };
    if payload.is_empty() {
        return Err(RasterError::InvalidDataUri("empty payload".into()));
    }
    BASE64
        .decode(payload.as_bytes())
        .map_err(|e| RasterError::InvalidDataUri(e.to_string()))
}

/// Draw onto an opaque white canvas of the same size (JPEG has no alpha).
fn flatten(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut canvas = RgbImage::new(width, height);
    for (x, y, px) in rgba.enumerate_pixels() {
        let alpha = f32::from(px[3]) / 255.0;
        let blend = |c: u8| (f32::from(c) * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        canvas.put_pixel(x, y, image::Rgb([blend(px[0]), blend(px[1]), blend(px[2])]));
    }
    canvas
}

/// Loads image references into embeddable rasters.
#[derive(Debug, Clone)]
pub struct Rasterizer {
    client: reqwest::Client,
    max_bytes: usize,
}

impl Rasterizer {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            max_bytes: MAX_IMAGE_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub async fn rasterize(&self, image: &ImageRef) -> Result<EncodedRaster, RasterError> {
        let bytes = self.load(image).await?;
        let decoded =
            image::load_from_memory(&bytes).map_err(|e| RasterError::Decode(e.to_string()))?;
        let canvas = DynamicImage::ImageRgb8(flatten(&decoded));
        let raster = EncodedRaster::encode(&canvas, RasterFormat::Jpeg)?;
        tracing::debug!(
            source = %image.describe(),
            width = raster.width(),
            height = raster.height(),
            "Image rasterized"
        );
        Ok(raster)
    }

    async fn load(&self, image: &ImageRef) -> Result<Vec<u8>, RasterError> {
        let bytes = match image {
            ImageRef::Url(url) => self.fetch(url).await?,
            ImageRef::File(path) => tokio::fs::read(path).await?,
            ImageRef::Inline(payload) => decode_data_uri(payload)?,
        };
        self.check_size(bytes.len())?;
        Ok(bytes)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, RasterError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RasterError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RasterError::Denied {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if let Some(len) = response.content_length() {
            self.check_size(usize::try_from(len).unwrap_or(usize::MAX))?;
        }

        // chunked replies carry no length; stop reading once over the cap
        let mut body = Vec::new();
        let mut stream = std::pin::pin!(response.bytes_stream());
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| RasterError::Fetch(e.to_string()))?;
            self.check_size(body.len() + chunk.len())?;
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    fn check_size(&self, size: usize) -> Result<(), RasterError> {
        if size > self.max_bytes {
            return Err(RasterError::TooLarge {
                size,
                max: self.max_bytes,
            });
        }
        Ok(())
    }
}
