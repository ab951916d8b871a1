//! Loading sources and writing sticker files.

use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbImage, RgbaImage};
use tracing::{info, warn};

use crate::color::Color;
use crate::compose::{PreviewMode, StickerStyle};
use crate::error::{Error, Result};
use crate::segment::{run_segmenter, Segmenter};
use crate::session::Session;

/// Options shared by every file of an export.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Directory the stickers are written to.
    pub output_dir: PathBuf,
    /// Write only `<stem>_final.png` rendered in [`ExportOptions::preview`].
    pub final_only: bool,
    /// Render mode used for the final-only export.
    pub preview: PreviewMode,
    /// Cutoff for files that were never edited interactively.
    pub threshold: f32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            final_only: false,
            preview: PreviewMode::Sticker,
            threshold: 0.5,
        }
    }
}

/// The files written for one source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// The current preview mode, when exporting only the final image.
    Final,
    /// Subject layer alone.
    BackgroundRemoved,
    /// Full sticker with the configured outline color.
    Outlined,
    /// Full sticker with a white outline.
    WhiteOutlined,
}

impl Variant {
    /// File name suffix, without extension.
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Variant::Final => "final",
            Variant::BackgroundRemoved => "bg_removed",
            Variant::Outlined => "outlined",
            Variant::WhiteOutlined => "white_outlined",
        }
    }

    /// Output path for `input` in `dir`: `<dir>/<stem>_<suffix>.png`.
    #[must_use]
    pub fn output_path(self, input: &Path, dir: &Path) -> PathBuf {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        dir.join(format!("{stem}_{}.png", self.suffix()))
    }
}

/// Variants written for the given mode.
#[must_use]
pub fn variants(final_only: bool) -> &'static [Variant] {
    if final_only {
        &[Variant::Final]
    } else {
        &[
            Variant::BackgroundRemoved,
            Variant::Outlined,
            Variant::WhiteOutlined,
        ]
    }
}

/// Result of exporting a single image file.
#[derive(Debug)]
pub struct ExportResult {
    /// Path of the source file.
    pub path: PathBuf,
    /// Files written, in variant order.
    pub outputs: Vec<PathBuf>,
    /// Subject pixel count of the exported mask.
    pub subject_pixels: usize,
    /// Why the export failed, if it did.
    pub error: Option<Error>,
}

impl ExportResult {
    /// Whether every variant was written.
    #[must_use]
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    fn failed(path: &Path, error: Error) -> Self {
        warn!(path = %path.display(), error = %error, "export failed");
        Self {
            path: path.to_path_buf(),
            outputs: Vec::new(),
            subject_pixels: 0,
            error: Some(error),
        }
    }
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}

/// Load a supported image as RGB.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormat`] for unknown extensions and
/// [`Error::Image`] when decoding fails.
pub fn load_rgb(path: &Path) -> Result<RgbImage> {
    if !is_supported_image(path) {
        return Err(Error::UnsupportedFormat(path.display().to_string()));
    }
    Ok(image::open(path)?.to_rgb8())
}

/// Supported images directly inside `dir`, sorted by path.
///
/// # Errors
///
/// Returns [`Error::Io`] if the directory cannot be read.
pub fn collect_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|p| is_supported_image(p))
        .collect();
    files.sort();
    Ok(files)
}

/// Write an RGBA image as PNG, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`Error::Io`] or [`Error::Image`] when writing fails.
pub fn save_png(img: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Render and write every variant of `session`.
///
/// # Errors
///
/// Returns the first render or write error; variants already written stay on disk.
pub fn export_session(
    session: &mut Session,
    input: &Path,
    style: &StickerStyle,
    opts: &ExportOptions,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for &variant in variants(opts.final_only) {
        let image = match variant {
            Variant::Final => session.render(opts.preview, style)?,
            Variant::BackgroundRemoved => session.render(PreviewMode::Cutout, style)?,
            Variant::Outlined => session.render(PreviewMode::Sticker, style)?,
            Variant::WhiteOutlined => {
                let white = StickerStyle {
                    outline_color: Color::WHITE,
                    ..style.clone()
                };
                session.render(PreviewMode::Sticker, &white)?
            }
        };
        let path = variant.output_path(input, &opts.output_dir);
        save_png(&image, &path)?;
        written.push(path);
    }
    info!(path = %input.display(), files = written.len(), "exported");
    Ok(written)
}

/// Export one file that has no interactive edits: load, segment, threshold, write.
#[must_use]
pub fn export_file(
    input: &Path,
    segmenter: &dyn Segmenter,
    style: &StickerStyle,
    opts: &ExportOptions,
) -> ExportResult {
    let run = || -> Result<(Vec<PathBuf>, usize)> {
        let source = load_rgb(input)?;
        let soft = run_segmenter(segmenter, input, &source)?;
        let mut session = Session::new(source, soft, opts.threshold, 1)?;
        let outputs = export_session(&mut session, input, style, opts)?;
        Ok((outputs, session.alpha().count()))
    };
    match run() {
        Ok((outputs, subject_pixels)) => ExportResult {
            path: input.to_path_buf(),
            outputs,
            subject_pixels,
            error: None,
        },
        Err(e) => ExportResult::failed(input, e),
    }
}

/// Export many unedited files. One failure never stops the others.
///
/// Uses parallel iteration when the `cli` feature is enabled (via rayon).
#[must_use]
pub fn export_files(
    inputs: &[PathBuf],
    segmenter: &dyn Segmenter,
    style: &StickerStyle,
    opts: &ExportOptions,
) -> Vec<ExportResult> {
    if let Err(e) = style.validate() {
        return inputs
            .iter()
            .map(|p| ExportResult::failed(p, Error::invalid("style", e.to_string())))
            .collect();
    }

    #[cfg(feature = "cli")]
    {
        use rayon::prelude::*;
        inputs
            .par_iter()
            .map(|input| export_file(input, segmenter, style, opts))
            .collect()
    }

    #[cfg(not(feature = "cli"))]
    {
        inputs
            .iter()
            .map(|input| export_file(input, segmenter, style, opts))
            .collect()
    }
}
