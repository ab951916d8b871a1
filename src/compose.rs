//! Layer compositing for the final sticker.
//!
//! Z-order, bottom to top:
//!
//! 1. solid outline ring (flat [`StickerStyle::outline_color`])
//! 2. reveal ring (pixels copied from the source photo, fully opaque)
//! 3. decorative stroke (flat [`StickerStyle::decor_color`])
//! 4. subject layer (cutout, or blended over the kept background)
//!
//! [`composite`] is a pure function of its inputs.

use image::{RgbImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::error::{ensure_unit, Result};
use crate::mask::{blend, check_dimensions, isolate, AlphaMask};
use crate::rings::{RingMask, RingWidths};

/// Visual parameters shared by every image in a studio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StickerStyle {
    /// Width of the background-reveal ring (`0` disables it).
    pub reveal_width: u32,
    /// Width of the solid outline ring (`0` disables it).
    pub outline_width: u32,
    /// Fill color of the solid outline ring.
    pub outline_color: Color,
    /// Width of the decorative stroke around the reveal ring (`0` disables it).
    pub decor_width: u32,
    /// Fill color of the decorative stroke.
    pub decor_color: Color,
    /// Keep the original background, faded to `blend_alpha`.
    pub keep_background: bool,
    /// Background opacity used when `keep_background` is on, in `[0, 1]`.
    pub blend_alpha: f32,
    /// Pad the output so outer rings are never clipped by the image edge.
    pub expand_canvas: bool,
}

impl Default for StickerStyle {
    fn default() -> Self {
        Self {
            reveal_width: 15,
            outline_width: 5,
            outline_color: Color::BLACK,
            decor_width: 0,
            decor_color: Color::BLACK,
            keep_background: false,
            blend_alpha: 0.3,
            expand_canvas: false,
        }
    }
}

impl StickerStyle {
    /// Ring widths for the ring extractor.
    #[must_use]
    pub fn ring_widths(&self) -> RingWidths {
        RingWidths {
            reveal: self.reveal_width,
            outline: self.outline_width,
            decor: self.decor_width,
        }
    }

    /// Transparent margin added around the image.
    #[must_use]
    pub fn padding(&self) -> u32 {
        if self.expand_canvas {
            self.ring_widths().extent()
        } else {
            0
        }
    }

    /// Check every numeric field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for out-of-range widths or blend alpha.
    pub fn validate(&self) -> Result<()> {
        self.ring_widths().validate()?;
        ensure_unit("blend alpha", self.blend_alpha)
    }
}

/// What the processed view (and "save only final") shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewMode {
    /// The unmodified photo.
    Original,
    /// The subject layer alone.
    Cutout,
    /// Rings plus subject.
    #[default]
    Sticker,
}

/// The subject layer: a cutout, or a blend over the kept background.
///
/// # Errors
///
/// Returns [`Error::DimensionMismatch`] if the mask does not match `source`
/// and [`Error::InvalidParameter`] for an out-of-range blend alpha.
pub fn subject_layer(source: &RgbImage, mask: &AlphaMask, style: &StickerStyle) -> Result<RgbaImage> {
    if style.keep_background {
        blend(mask, source, style.blend_alpha)
    } else {
        isolate(mask, source)
    }
}

/// Composite rings and subject into one RGBA image.
///
/// `rings` may have been extracted from a different (locked) mask than
/// `mask`; only its canvas size has to agree with `source` and its padding.
///
/// # Errors
///
/// Returns [`Error::DimensionMismatch`] when `mask` or `rings` do not fit
/// `source`, and [`Error::InvalidParameter`] for an invalid style.
pub fn composite(
    source: &RgbImage,
    mask: &AlphaMask,
    rings: &RingMask,
    style: &StickerStyle,
) -> Result<RgbaImage> {
    style.validate()?;
    let (w, h) = source.dimensions();
    let pad = rings.padding();
    check_dimensions((w + 2 * pad, h + 2 * pad), rings.dimensions())?;

    let subject = subject_layer(source, mask, style)?;
    let (cw, ch) = rings.dimensions();
    let outline = style.outline_color.to_rgba();
    let decor = style.decor_color.to_rgba();

    Ok(RgbaImage::from_fn(cw, ch, |x, y| {
        let mut px = Rgba([0, 0, 0, 0]);
        if rings.in_outline(x, y) {
            px = outline;
        }
        let inside = x >= pad && y >= pad && x < pad + w && y < pad + h;
        if inside && rings.in_reveal(x, y) {
            let [r, g, b] = source.get_pixel(x - pad, y - pad).0;
            px = Rgba([r, g, b, 255]);
        }
        if rings.in_decor(x, y) {
            px = decor;
        }
        if inside {
            px = over(px, *subject.get_pixel(x - pad, y - pad));
        }
        px
    }))
}

/// Porter-Duff "source over destination" for straight (non-premultiplied) alpha.
fn over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    if src[3] == 255 || dst[3] == 0 {
        return src;
    }
    if src[3] == 0 {
        return dst;
    }
    let sa = f32::from(src[3]) / 255.0;
    let da = f32::from(dst[3]) / 255.0;
    let oa = sa + da * (1.0 - sa);
    let mut out = [0u8; 4];
    for (c, o) in out.iter_mut().take(3).enumerate() {
        let v = (f32::from(src[c]) * sa + f32::from(dst[c]) * da * (1.0 - sa)) / oa;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            *o = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        out[3] = (oa * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::rings::extract_rings;
    use image::{GrayImage, Luma, Rgb};

    /// 100x100 white photo with a 40x40 black square in the middle.
    fn scene() -> (RgbImage, AlphaMask) {
        let mut img = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
        let mut gray = GrayImage::new(100, 100);
        for y in 30..70 {
            for x in 30..70 {
                img.put_pixel(x, y, Rgb([0, 0, 0]));
                gray.put_pixel(x, y, Luma([255]));
            }
        }
        (img, AlphaMask::from_gray(gray))
    }

    fn style(reveal: u32, outline: u32) -> StickerStyle {
        StickerStyle {
            reveal_width: reveal,
            outline_width: outline,
            outline_color: Color::RED,
            ..StickerStyle::default()
        }
    }

    #[test]
    fn square_scene_layers_land_in_their_bands() {
        let (img, mask) = scene();
        let style = style(5, 3);
        let rings = extract_rings(&mask, style.ring_widths(), style.padding()).unwrap();
        let out = composite(&img, &mask, &rings, &style).unwrap();
        assert_eq!(out.dimensions(), (100, 100));

        // Subject: black and opaque.
        assert_eq!(out.get_pixel(50, 50).0, [0, 0, 0, 255]);
        // Reveal band (x 25..30): original white pixels.
        for x in 25..30 {
            assert_eq!(out.get_pixel(x, 50).0, [255, 255, 255, 255], "x={x}");
        }
        // Outline band (x 22..25): solid red.
        for x in 22..25 {
            assert_eq!(out.get_pixel(x, 50).0, [255, 0, 0, 255], "x={x}");
        }
        // Beyond: transparent.
        assert_eq!(out.get_pixel(21, 50)[3], 0);
        assert_eq!(out.get_pixel(0, 0)[3], 0);

        // Solid color appears only on outline pixels.
        for (x, y, p) in out.enumerate_pixels() {
            if p.0 == [255, 0, 0, 255] {
                assert!(rings.in_outline(x, y));
            }
        }
    }

    #[test]
    fn no_rings_yields_subject_alone() {
        let (img, mask) = scene();
        let style = style(0, 0);
        let rings = extract_rings(&mask, style.ring_widths(), 0).unwrap();
        let out = composite(&img, &mask, &rings, &style).unwrap();
        assert_eq!(out, isolate(&mask, &img).unwrap());
    }

    #[test]
    fn composite_is_pure() {
        let (img, mask) = scene();
        let style = StickerStyle {
            decor_width: 2,
            decor_color: Color([0, 0, 255]),
            keep_background: true,
            ..style(4, 2)
        };
        let rings = extract_rings(&mask, style.ring_widths(), 0).unwrap();
        let a = composite(&img, &mask, &rings, &style).unwrap();
        let b = composite(&img, &mask, &rings, &style).unwrap();
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn expanded_canvas_keeps_outline_past_the_photo_edge() {
        let img = RgbImage::from_pixel(20, 20, Rgb([9, 9, 9]));
        let mut gray = GrayImage::new(20, 20);
        for y in 5..15 {
            for x in 0..8 {
                gray.put_pixel(x, y, Luma([255]));
            }
        }
        let mask = AlphaMask::from_gray(gray);
        let style = StickerStyle {
            expand_canvas: true,
            ..style(2, 2)
        };
        let rings = extract_rings(&mask, style.ring_widths(), style.padding()).unwrap();
        let out = composite(&img, &mask, &rings, &style).unwrap();

        assert_eq!(out.dimensions(), (28, 28));
        // Left of the photo: outline only, never stretched photo pixels.
        assert_eq!(out.get_pixel(2, 12).0, [255, 0, 0, 255]);
        assert_eq!(out.get_pixel(0, 12)[3], 0);
        // Subject sits at its original position shifted by the padding.
        assert_eq!(out.get_pixel(4, 12).0, [9, 9, 9, 255]);
    }

    #[test]
    fn keep_background_fades_everything_outside_subject() {
        let (img, mask) = scene();
        let style = StickerStyle {
            keep_background: true,
            blend_alpha: 0.5,
            ..style(0, 0)
        };
        let rings = extract_rings(&mask, style.ring_widths(), 0).unwrap();
        let out = composite(&img, &mask, &rings, &style).unwrap();
        assert_eq!(out.get_pixel(50, 50).0, [0, 0, 0, 255]);
        assert_eq!(out.get_pixel(5, 5).0, [255, 255, 255, 128]);
    }

    #[test]
    fn rejects_rings_of_another_size() {
        let (img, mask) = scene();
        let small = AlphaMask::empty(10, 10);
        let rings = extract_rings(&small, RingWidths::default(), 0).unwrap();
        assert!(matches!(
            composite(&img, &mask, &rings, &StickerStyle::default()),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn decor_never_hides_the_outline() {
        let (img, mask) = scene();
        let style = StickerStyle {
            decor_width: 3,
            decor_color: Color([0, 0, 255]),
            ..style(5, 3)
        };
        let rings = extract_rings(&mask, style.ring_widths(), 0).unwrap();
        let out = composite(&img, &mask, &rings, &style).unwrap();

        // Reveal x 25..30, decor x 22..25, outline x 19..22.
        for x in 22..25 {
            assert_eq!(out.get_pixel(x, 50).0, [0, 0, 255, 255], "x={x}");
        }
        for x in 19..22 {
            assert_eq!(out.get_pixel(x, 50).0, [255, 0, 0, 255], "x={x}");
        }
        assert_eq!(out.get_pixel(18, 50)[3], 0);
        let solid = out.pixels().filter(|p| p.0 == [255, 0, 0, 255]).count();
        assert_eq!(solid, rings.outline_count());
    }

    #[test]
    fn transparent_backdrop_keeps_source_color() {
        let src = Rgba([10, 20, 30, 0]);
        assert_eq!(over(Rgba([0, 0, 0, 0]), src), src);
        assert_eq!(over(Rgba([1, 2, 3, 255]), src), Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn over_blends_translucent_source() {
        let dst = Rgba([255, 0, 0, 255]);
        let src = Rgba([0, 0, 255, 128]);
        let out = over(dst, src);
        assert_eq!(out[3], 255);
        assert!(out[0] > 100 && out[2] > 100);
    }
}
