//! # Render Subcommand
//!
//! Writes a QR PNG for arbitrary content, using the sticker defaults
//! unless a width is given.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use legal_qr::{QrRenderer, RenderOptions};

/// Arguments for `legal render`.
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Text to encode, usually a verification URL.
    #[arg(value_name = "CONTENT")]
    pub content: String,

    /// Output PNG path.
    #[arg(long, short = 'o', value_name = "FILE")]
    pub out: PathBuf,

    /// Image width in pixels.
    #[arg(long)]
    pub width: Option<u32>,
}

/// Execute the render subcommand.
pub fn run_render(args: &RenderArgs) -> Result<u8> {
    let mut options = RenderOptions::default();
    if let Some(width) = args.width {
        options.width_px = width;
    }
    let png = QrRenderer::new(options)
        .render_png(&args.content)
        .context("QR render failed")?;

    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(&args.out, &png)
        .with_context(|| format!("failed to write {}", args.out.display()))?;

    println!("OK: wrote {} ({} bytes)", args.out.display(), png.len());
    Ok(0)
}
