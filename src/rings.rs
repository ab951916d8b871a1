//! Reveal, decorative and outline rings derived from a subject mask.
//!
//! All rings are morphological dilations with a Euclidean disk, computed from
//! an exact squared distance transform so a pixel is inside a ring of width `r`
//! exactly when `dx² + dy² <= r²` to the nearest seed pixel.
//!
//! The reveal ring samples pixels from the source photo, so it is always
//! clipped to the image extent: on a padded canvas the padding never joins the
//! reveal region and no edge pixel is ever replicated outward.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::distance_transform::euclidean_squared_distance_transform;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::mask::{AlphaMask, SUBJECT};

/// Largest accepted width for any ring.
pub const MAX_RING_WIDTH: u32 = 400;

/// Per-pixel Euclidean distance buffer.
pub type DistanceField = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Widths of the three rings, in pixels. A width of `0` disables that ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RingWidths {
    /// Band of original-photo pixels just outside the subject.
    pub reveal: u32,
    /// Solid-color band outside the decorative stroke and reveal ring (or the
    /// subject if both are off).
    pub outline: u32,
    /// Decorative stroke hugging the reveal ring.
    pub decor: u32,
}

impl RingWidths {
    /// Reject widths above [`MAX_RING_WIDTH`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] naming the first offending width.
    pub fn validate(&self) -> Result<()> {
        for (name, width) in [
            ("reveal width", self.reveal),
            ("outline width", self.outline),
            ("decor width", self.decor),
        ] {
            if width > MAX_RING_WIDTH {
                return Err(Error::invalid(
                    name,
                    format!("{width} exceeds the maximum of {MAX_RING_WIDTH}"),
                ));
            }
        }
        Ok(())
    }

    /// Padding needed around the image so no ring is clipped.
    #[must_use]
    pub fn extent(&self) -> u32 {
        if self.reveal > 0 {
            self.reveal + self.decor + self.outline
        } else {
            self.outline
        }
    }
}

/// Derived ring membership for one mask, on a canvas that may be padded.
#[derive(Debug, Clone, PartialEq)]
pub struct RingMask {
    reveal: GrayImage,
    outline: GrayImage,
    decor: GrayImage,
    distance: DistanceField,
    padding: u32,
}

impl RingMask {
    /// Canvas dimensions (image size plus padding on every side).
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.reveal.dimensions()
    }

    /// Transparent margin added on every side of the image.
    #[must_use]
    pub fn padding(&self) -> u32 {
        self.padding
    }

    /// Reveal ring plane (`255` = member).
    #[must_use]
    pub fn reveal(&self) -> &GrayImage {
        &self.reveal
    }

    /// Solid outline ring plane.
    #[must_use]
    pub fn outline(&self) -> &GrayImage {
        &self.outline
    }

    /// Decorative stroke plane.
    #[must_use]
    pub fn decor(&self) -> &GrayImage {
        &self.decor
    }

    /// Euclidean distance of every canvas pixel to the subject boundary.
    ///
    /// `f32::INFINITY` everywhere when the subject has no boundary.
    #[must_use]
    pub fn distance(&self) -> &DistanceField {
        &self.distance
    }

    /// Whether canvas pixel `(x, y)` is in the reveal ring.
    #[must_use]
    pub fn in_reveal(&self, x: u32, y: u32) -> bool {
        self.reveal.get_pixel(x, y)[0] > 0
    }

    /// Whether canvas pixel `(x, y)` is in the outline ring.
    #[must_use]
    pub fn in_outline(&self, x: u32, y: u32) -> bool {
        self.outline.get_pixel(x, y)[0] > 0
    }

    /// Whether canvas pixel `(x, y)` is in the decorative stroke.
    #[must_use]
    pub fn in_decor(&self, x: u32, y: u32) -> bool {
        self.decor.get_pixel(x, y)[0] > 0
    }

    /// Number of reveal ring pixels.
    #[must_use]
    pub fn reveal_count(&self) -> usize {
        count(&self.reveal)
    }

    /// Number of outline ring pixels.
    #[must_use]
    pub fn outline_count(&self) -> usize {
        count(&self.outline)
    }

    /// Number of decorative stroke pixels.
    #[must_use]
    pub fn decor_count(&self) -> usize {
        count(&self.decor)
    }
}

/// Subject pixels with at least one 4-neighbour outside the subject.
///
/// Neighbours beyond the plane edge are ignored, so a subject filling the
/// whole plane has no boundary.
#[must_use]
pub fn subject_boundary(subject: &GrayImage) -> GrayImage {
    let (w, h) = subject.dimensions();
    let on = |x: u32, y: u32| subject.get_pixel(x, y)[0] > 0;
    GrayImage::from_fn(w, h, |x, y| {
        if !on(x, y) {
            return Luma([0]);
        }
        let edge = (x > 0 && !on(x - 1, y))
            || (x + 1 < w && !on(x + 1, y))
            || (y > 0 && !on(x, y - 1))
            || (y + 1 < h && !on(x, y + 1));
        Luma([if edge { SUBJECT } else { 0 }])
    })
}

/// Compute reveal, outline and decorative rings for `mask`.
///
/// The rings live on a canvas padded by `padding` transparent pixels on every
/// side (`0` keeps the image size). Steps:
///
/// 1. distance of every pixel to the subject boundary;
/// 2. `reveal region = subject ∪ {d <= reveal}`, clipped to the image extent,
///    and `reveal ring = reveal region \ subject`;
/// 3. `decor = dilate(reveal ring, decor) \ (reveal ring ∪ subject)`;
/// 4. `outline ring = dilate(reveal region ∪ decor, outline) \ (reveal region ∪ decor)`
///    (the reveal region is just the subject when reveal is off).
///
/// The outline always lies outside the decorative stroke, so the two never
/// share a pixel.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if any width exceeds [`MAX_RING_WIDTH`].
pub fn extract_rings(mask: &AlphaMask, widths: RingWidths, padding: u32) -> Result<RingMask> {
    widths.validate()?;
    let (w, h) = mask.dimensions();
    let (cw, ch) = (w + 2 * padding, h + 2 * padding);

    let mut subject = GrayImage::new(cw, ch);
    image::imageops::replace(
        &mut subject,
        mask.as_gray(),
        i64::from(padding),
        i64::from(padding),
    );
    let in_image = |x: u32, y: u32| {
        x >= padding && y >= padding && x < padding + w && y < padding + h
    };

    let distance = boundary_distance(&subject);

    let mut region = subject.clone();
    if widths.reveal > 0 {
        let limit = f64::from(widths.reveal);
        for (x, y, p) in region.enumerate_pixels_mut() {
            if in_image(x, y) && f64::from(distance.get_pixel(x, y)[0]) <= limit {
                p[0] = SUBJECT;
            }
        }
    }
    let reveal = difference(&region, &subject);

    let decor = if widths.decor > 0 && count(&reveal) > 0 {
        let spread = dilate_disk(&reveal, widths.decor);
        difference(&difference(&spread, &reveal), &subject)
    } else {
        GrayImage::new(cw, ch)
    };

    let inner = union(&region, &decor);
    let outline = difference(&dilate_disk(&inner, widths.outline), &inner);

    let rings = RingMask {
        reveal,
        outline,
        decor,
        distance,
        padding,
    };
    debug!(
        reveal = rings.reveal_count(),
        outline = rings.outline_count(),
        decor = rings.decor_count(),
        padding,
        "extracted rings"
    );
    Ok(rings)
}

/// Euclidean distance of every pixel to the nearest subject boundary pixel.
fn boundary_distance(subject: &GrayImage) -> DistanceField {
    let (w, h) = subject.dimensions();
    let boundary = subject_boundary(subject);
    if count(&boundary) == 0 {
        return DistanceField::from_pixel(w, h, Luma([f32::INFINITY]));
    }
    let squared = euclidean_squared_distance_transform(&boundary);
    #[allow(clippy::cast_possible_truncation)]
    DistanceField::from_fn(w, h, |x, y| {
        Luma([squared.get_pixel(x, y)[0].sqrt() as f32])
    })
}

/// Dilate `seed` with a Euclidean disk of `radius`.
fn dilate_disk(seed: &GrayImage, radius: u32) -> GrayImage {
    let mut out = seed.clone();
    if radius == 0 || count(seed) == 0 {
        return out;
    }
    let squared = euclidean_squared_distance_transform(seed);
    let limit = f64::from(radius) * f64::from(radius);
    for (o, d) in out.iter_mut().zip(squared.iter()) {
        if *d <= limit {
            *o = SUBJECT;
        }
    }
    out
}

/// Pixels set in `a` or `b`.
fn union(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let mut out = a.clone();
    for (o, &m) in out.iter_mut().zip(b.iter()) {
        if m > 0 {
            *o = SUBJECT;
        }
    }
    out
}

/// Pixels set in `a` but not in `b`.
fn difference(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let mut out = a.clone();
    for (o, &m) in out.iter_mut().zip(b.iter()) {
        if m > 0 {
            *o = 0;
        }
    }
    out
}

fn count(plane: &GrayImage) -> usize {
    plane.iter().filter(|&&v| v > 0).count()
}
