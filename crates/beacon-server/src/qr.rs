//! QR code rendering.
//!
//! Clients send text and get back a PNG. Rendering is pure CPU work, so
//! callers run it on the blocking pool.

use image::{imageops, ImageFormat, Rgba, RgbaImage};
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;
use thiserror::Error;

/// QR rendering errors.
#[derive(Debug, Error)]
pub enum QrError {
    /// The text does not fit in a QR code at the configured level.
    #[error("Cannot encode text: {0}")]
    Data(#[from] qrcode::types::QrError),

    /// PNG encoding failed.
    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),
}

/// Rendering options.
#[derive(Debug, Clone, PartialEq)]
pub struct QrOptions {
    /// Minimum edge length of the code in pixels, without padding.
    pub size: u32,
    /// Padding on every side in pixels.
    pub padding: u32,
    /// Error correction level.
    pub error_correction: EcLevel,
    /// Module color.
    pub foreground: [u8; 4],
    /// Background and padding color.
    pub background: [u8; 4],
    /// Caption shown alongside the code. Not drawn into the PNG.
    pub label: Option<String>,
}

impl Default for QrOptions {
    fn default() -> Self {
        Self {
            size: 300,
            padding: 10,
            error_correction: EcLevel::H,
            foreground: [0, 0, 0, 255],
            background: [255, 255, 255, 255],
            label: Some("Scan the code".to_string()),
        }
    }
}

/// Parse an error correction level name.
#[must_use]
pub fn parse_ec_level(name: &str) -> Option<EcLevel> {
    match name.to_ascii_lowercase().as_str() {
        "low" | "l" => Some(EcLevel::L),
        "medium" | "m" => Some(EcLevel::M),
        "quartile" | "q" => Some(EcLevel::Q),
        "high" | "h" => Some(EcLevel::H),
        _ => None,
    }
}

/// Turns text into image bytes.
pub trait QrEncoder: Send + Sync {
    /// Render `text`.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be encoded.
    fn encode(&self, text: &str) -> Result<Vec<u8>, QrError>;
}

/// PNG renderer backed by `qrcode` and `image`.
#[derive(Debug, Clone, Default)]
pub struct PngQrEncoder {
    options: QrOptions,
}

impl PngQrEncoder {
    /// Create an encoder with the given options.
    #[must_use]
    pub fn new(options: QrOptions) -> Self {
        Self { options }
    }

    /// The options in use.
    #[must_use]
    pub fn options(&self) -> &QrOptions {
        &self.options
    }
}

impl QrEncoder for PngQrEncoder {
    fn encode(&self, text: &str) -> Result<Vec<u8>, QrError> {
        let opts = &self.options;
        let code = QrCode::with_error_correction_level(text.as_bytes(), opts.error_correction)?;

        let modules = code
            .render::<Rgba<u8>>()
            .dark_color(Rgba(opts.foreground))
            .light_color(Rgba(opts.background))
            .quiet_zone(false)
            .min_dimensions(opts.size, opts.size)
            .build();

        let mut canvas = RgbaImage::from_pixel(
            modules.width() + 2 * opts.padding,
            modules.height() + 2 * opts.padding,
            Rgba(opts.background),
        );
        imageops::overlay(
            &mut canvas,
            &modules,
            i64::from(opts.padding),
            i64::from(opts.padding),
        );

        let mut png = Cursor::new(Vec::new());
        canvas.write_to(&mut png, ImageFormat::Png)?;
        Ok(png.into_inner())
    }
}
