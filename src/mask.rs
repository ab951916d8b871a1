//! Subject masks: the segmentation output, its thresholded form, and brush painting.
//!
//! A [`SoftMask`] holds per-pixel subject confidence in `[0, 1]` as produced by
//! the segmentation model. [`threshold`] turns it into a binary [`AlphaMask`]
//! (`0` or `255` per pixel) which brush strokes then edit in place.

use image::{GrayImage, ImageBuffer, Luma, RgbImage, Rgba, RgbaImage};

use crate::error::{ensure_unit, Error, Result};

/// Mask value for pixels that belong to the subject.
pub const SUBJECT: u8 = 255;

/// Largest accepted brush radius in pixels.
pub const MAX_BRUSH_RADIUS: u32 = 2000;

/// Raw single-channel `f32` buffer backing a [`SoftMask`].
pub type SoftBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Continuous per-pixel subject confidence, pre-threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftMask(SoftBuffer);

impl SoftMask {
    /// Wrap a confidence buffer. Values are clamped into `[0, 1]`; `NaN` becomes `0`.
    #[must_use]
    pub fn new(mut buffer: SoftBuffer) -> Self {
        for p in buffer.pixels_mut() {
            p[0] = if p[0].is_nan() { 0.0 } else { p[0].clamp(0.0, 1.0) };
        }
        Self(buffer)
    }

    /// Build a soft mask from an 8-bit grayscale matte (`255` = certain subject).
    #[must_use]
    pub fn from_gray(gray: &GrayImage) -> Self {
        let (w, h) = gray.dimensions();
        Self(ImageBuffer::from_fn(w, h, |x, y| {
            Luma([f32::from(gray.get_pixel(x, y)[0]) / 255.0])
        }))
    }

    /// Width and height in pixels.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    /// Confidence at `(x, y)`.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.0.get_pixel(x, y)[0]
    }

    /// The underlying buffer.
    #[must_use]
    pub fn as_buffer(&self) -> &SoftBuffer {
        &self.0
    }
}

/// Binary subject membership; every pixel is either `0` or [`SUBJECT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlphaMask(GrayImage);

impl AlphaMask {
    /// A mask with no subject pixels.
    #[must_use]
    pub fn empty(width: u32, height: u32) -> Self {
        Self(GrayImage::new(width, height))
    }

    /// A mask where every pixel is subject.
    #[must_use]
    pub fn full(width: u32, height: u32) -> Self {
        Self(GrayImage::from_pixel(width, height, Luma([SUBJECT])))
    }

    /// Binarize a grayscale image: any non-zero pixel becomes subject.
    #[must_use]
    pub fn from_gray(mut gray: GrayImage) -> Self {
        for p in gray.pixels_mut() {
            p[0] = if p[0] > 0 { SUBJECT } else { 0 };
        }
        Self(gray)
    }

    /// Width and height in pixels.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    /// Whether `(x, y)` belongs to the subject.
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel(x, y)[0] == SUBJECT
    }

    /// Number of subject pixels.
    #[must_use]
    pub fn count(&self) -> usize {
        self.0.as_raw().iter().filter(|&&v| v == SUBJECT).count()
    }

    /// Whether the mask has no subject pixels at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.0.as_raw().contains(&SUBJECT)
    }

    /// The mask as a `0`/`255` grayscale image.
    #[must_use]
    pub fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    /// Consume the mask and return its grayscale image.
    #[must_use]
    pub fn into_gray(self) -> GrayImage {
        self.0
    }

    /// Apply brush overlays: `(self OR keep) AND NOT remove`.
    pub(crate) fn apply_overrides(&mut self, keep: &GrayImage, remove: &GrayImage) {
        for ((m, k), r) in self.0.iter_mut().zip(keep.iter()).zip(remove.iter()) {
            if *r > 0 {
                *m = 0;
            } else if *k > 0 {
                *m = SUBJECT;
            }
        }
    }
}

/// What a brush stroke does to the pixels under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrushMode {
    /// Force pixels into the subject.
    Keep,
    /// Force pixels out of the subject.
    Remove,
}

/// Binarize a soft mask: a pixel is subject when `soft >= cutoff`.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if `cutoff` is outside `[0, 1]`.
pub fn threshold(soft: &SoftMask, cutoff: f32) -> Result<AlphaMask> {
    ensure_unit("threshold", cutoff)?;
    let (w, h) = soft.dimensions();
    let mut out = GrayImage::new(w, h);
    for (dst, src) in out.pixels_mut().zip(soft.0.pixels()) {
        if src[0] >= cutoff {
            dst[0] = SUBJECT;
        }
    }
    Ok(AlphaMask(out))
}

/// Paint a filled disk of `radius` around `center` into `mask`.
///
/// Every pixel within Euclidean distance `radius` of `center` becomes subject
/// ([`BrushMode::Keep`]) or background ([`BrushMode::Remove`]). The disk is
/// clipped to the mask bounds, so `center` may lie outside the image.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if `radius` is `0` or above
/// [`MAX_BRUSH_RADIUS`]; the mask is left untouched.
pub fn paint(mask: &mut AlphaMask, center: (i32, i32), radius: u32, mode: BrushMode) -> Result<()> {
    validate_radius(radius)?;
    let value = match mode {
        BrushMode::Keep => SUBJECT,
        BrushMode::Remove => 0,
    };
    stamp_disk(&mut mask.0, center, radius, value);
    Ok(())
}

pub(crate) fn validate_radius(radius: u32) -> Result<()> {
    if radius == 0 || radius > MAX_BRUSH_RADIUS {
        return Err(Error::invalid(
            "brush radius",
            format!("{radius} is outside 1..={MAX_BRUSH_RADIUS}"),
        ));
    }
    Ok(())
}

/// Write `value` into every pixel of `plane` inside the clipped disk.
pub(crate) fn stamp_disk(plane: &mut GrayImage, center: (i32, i32), radius: u32, value: u8) {
    let (w, h) = plane.dimensions();
    let (cx, cy) = (i64::from(center.0), i64::from(center.1));
    let r = i64::from(radius);
    let r2 = r * r;

    let y0 = (cy - r).max(0);
    let y1 = (cy + r).min(i64::from(h) - 1);
    let x0 = (cx - r).max(0);
    let x1 = (cx + r).min(i64::from(w) - 1);

    for y in y0..=y1 {
        let dy = y - cy;
        for x in x0..=x1 {
            let dx = x - cx;
            if dx * dx + dy * dy <= r2 {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                plane.put_pixel(x as u32, y as u32, Luma([value]));
            }
        }
    }
}

/// Cut the subject out of `original`: RGB from the photo, alpha from the mask.
///
/// # Errors
///
/// Returns [`Error::DimensionMismatch`] if the mask and image sizes differ.
pub fn isolate(mask: &AlphaMask, original: &RgbImage) -> Result<RgbaImage> {
    check_dimensions(original.dimensions(), mask.dimensions())?;
    Ok(RgbaImage::from_fn(original.width(), original.height(), |x, y| {
        let [r, g, b] = original.get_pixel(x, y).0;
        Rgba([r, g, b, mask.0.get_pixel(x, y)[0]])
    }))
}

/// "Keep original background": interpolate between the isolated subject and
/// the untouched original using a single, uniform `blend_alpha`.
///
/// Only the background fades. Subject pixels stay fully opaque and background
/// pixels take opacity `blend_alpha`, so `0.0` is a clean cutout and `1.0` is
/// the original photo. The subject itself is never attenuated.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if `blend_alpha` is outside `[0, 1]`
/// and [`Error::DimensionMismatch`] if the mask and image sizes differ.
pub fn blend(mask: &AlphaMask, original: &RgbImage, blend_alpha: f32) -> Result<RgbaImage> {
    ensure_unit("blend alpha", blend_alpha)?;
    let mut out = isolate(mask, original)?;
    for p in out.pixels_mut() {
        let m = f32::from(p[3]) / 255.0;
        let a = m + (1.0 - m) * blend_alpha;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            p[3] = (a * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(out)
}

/// Reject `actual` unless it equals `expected`.
pub(crate) fn check_dimensions(expected: (u32, u32), actual: (u32, u32)) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::DimensionMismatch { expected, actual })
    }
}
