//! # Code Renderer
//!
//! Rasterizes text into a QR code PNG. The defaults match the printed
//! stickers: error-correction level M, a 300 px square, and a 2-module
//! quiet zone, black modules on white.
//!
//! Modules are scaled by an integer factor so every module is a crisp
//! square. When the code plus quiet zone does not divide the target width
//! evenly, the code is centered and the leftover pixels widen the margin.

use std::io::Cursor;

use image::{GrayImage, ImageFormat, Luma};
use qrcode::types::QrError;
use qrcode::{Color, EcLevel, QrCode};

use crate::error::RenderError;

const DARK: Luma<u8> = Luma([0x00]);
const LIGHT: Luma<u8> = Luma([0xFF]);

/// Rendering parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Target image width (and height) in pixels.
    pub width_px: u32,
    /// Minimum quiet zone around the code, in modules.
    pub margin_modules: u32,
    /// Error-correction level.
    pub ec_level: EcLevel,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width_px: 300,
            margin_modules: 2,
            ec_level: EcLevel::M,
        }
    }
}

/// Renders text content into QR code PNG images.
#[derive(Debug, Clone, Default)]
pub struct QrRenderer {
    options: RenderOptions,
}

impl QrRenderer {
    /// Create a renderer with explicit options.
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    /// The options this renderer uses.
    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Encode `content` as a QR code and return PNG bytes.
    ///
    /// # Errors
    ///
    /// - [`RenderError::EmptyContent`] if `content` is empty.
    /// - [`RenderError::TooLong`] if it does not fit in any QR version at
    ///   the configured error-correction level.
    /// - [`RenderError::Encode`] for any other encoder or PNG failure.
    pub fn render_png(&self, content: &str) -> Result<Vec<u8>, RenderError> {
        let image = self.render_image(content)?;
        let mut buf = Cursor::new(Vec::new());
        image
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(|e| RenderError::Encode(e.to_string()))?;
        Ok(buf.into_inner())
    }

    fn render_image(&self, content: &str) -> Result<GrayImage, RenderError> {
        if content.is_empty() {
            return Err(RenderError::EmptyContent);
        }

        let code = QrCode::with_error_correction_level(content.as_bytes(), self.options.ec_level)
            .map_err(|e| match e {
                QrError::DataTooLong => RenderError::TooLong { len: content.len() },
                other => RenderError::Encode(other.to_string()),
            })?;

        let modules = code.width() as u32;
        let colors = code.to_colors();

        let span = modules + 2 * self.options.margin_modules;
        let scale = (self.options.width_px / span).max(1);
        let side = self.options.width_px.max(span * scale);
        let offset = (side - modules * scale) / 2;

        let mut image = GrayImage::from_pixel(side, side, LIGHT);
        for (i, color) in colors.iter().enumerate() {
            if *color != Color::Dark {
                continue;
            }
            let mx = i as u32 % modules;
            let my = i as u32 / modules;
            let x0 = offset + mx * scale;
            let y0 = offset + my * scale;
            for y in y0..y0 + scale {
                for x in x0..x0 + scale {
                    image.put_pixel(x, y, DARK);
                }
            }
        }

        tracing::debug!(
            modules,
            scale,
            side,
            bytes = content.len(),
            "rendered QR code"
        );
        Ok(image)
    }
}
