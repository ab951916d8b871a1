//! Zoom/pan view math shared by the original and processed canvases.
//!
//! A canvas point `c` maps to image point `i` by `c = i * zoom + pan`.

use serde::{Deserialize, Serialize};

/// Margin kept around the image when fitting it to the canvas.
const FIT_MARGIN: f32 = 20.0;
/// Minimum number of image pixels (in canvas units) that must stay on screen.
const MIN_VISIBLE: f32 = 32.0;
/// Zoom factor applied per mouse-wheel notch.
const WHEEL_STEP: f32 = 1.1;

/// Allowed zoom range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomLimits {
    /// Smallest zoom factor.
    pub min: f32,
    /// Largest zoom factor.
    pub max: f32,
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self { min: 0.1, max: 5.0 }
    }
}

impl ZoomLimits {
    /// These limits ordered so `min <= max`, with both bounds finite and
    /// positive. A bound that is neither falls back to its default.
    #[must_use]
    pub fn normalized(self) -> Self {
        let usable = |v: f32| v.is_finite() && v > 0.0;
        let defaults = Self::default();
        let min = if usable(self.min) { self.min } else { defaults.min };
        let max = if usable(self.max) { self.max } else { defaults.max };
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }
}

/// Zoom and pan of one canvas showing one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    zoom: f32,
    pan: (f32, f32),
    image: (u32, u32),
    canvas: (u32, u32),
    limits: ZoomLimits,
}

impl ViewTransform {
    /// A 1:1 view with the image at the canvas origin.
    ///
    /// `limits` are [normalized](ZoomLimits::normalized) first.
    #[must_use]
    pub fn new(image: (u32, u32), canvas: (u32, u32), limits: ZoomLimits) -> Self {
        let limits = limits.normalized();
        Self {
            zoom: 1.0_f32.clamp(limits.min, limits.max),
            pan: (0.0, 0.0),
            image,
            canvas,
            limits,
        }
    }

    /// Current zoom factor.
    #[must_use]
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Current pan offset in canvas pixels.
    #[must_use]
    pub fn pan(&self) -> (f32, f32) {
        self.pan
    }

    /// Map a canvas point to (fractional) image coordinates.
    #[must_use]
    pub fn to_image(&self, canvas_x: f32, canvas_y: f32) -> (f32, f32) {
        (
            (canvas_x - self.pan.0) / self.zoom,
            (canvas_y - self.pan.1) / self.zoom,
        )
    }

    /// Map a canvas point to the image pixel under it.
    ///
    /// The result may lie outside the image; brush painting clips it.
    #[must_use]
    pub fn to_image_pixel(&self, canvas_x: f32, canvas_y: f32) -> (i32, i32) {
        let (x, y) = self.to_image(canvas_x, canvas_y);
        #[allow(clippy::cast_possible_truncation)]
        (x.floor() as i32, y.floor() as i32)
    }

    /// Map an image point to canvas coordinates.
    #[must_use]
    pub fn to_canvas(&self, image_x: f32, image_y: f32) -> (f32, f32) {
        (
            image_x * self.zoom + self.pan.0,
            image_y * self.zoom + self.pan.1,
        )
    }

    /// On-screen radius of the brush preview circle.
    #[must_use]
    pub fn brush_radius_on_canvas(&self, radius: u32) -> f32 {
        #[allow(clippy::cast_precision_loss)]
        (radius as f32 * self.zoom).max(1.0)
    }

    /// Scale so the whole image fits (never above 1:1) and center it.
    pub fn fit(&mut self) {
        let (iw, ih) = dims_f32(self.image);
        let (cw, ch) = dims_f32(self.canvas);
        if iw <= 0.0 || ih <= 0.0 {
            return;
        }
        let scale = ((cw - FIT_MARGIN) / iw)
            .min((ch - FIT_MARGIN) / ih)
            .min(1.0);
        self.zoom = scale.clamp(self.limits.min, self.limits.max);
        self.pan = (
            (cw - iw * self.zoom) / 2.0,
            (ch - ih * self.zoom) / 2.0,
        );
    }

    /// Zoom by `factor`, keeping the canvas point `anchor` fixed on screen.
    ///
    /// The result is clamped to the zoom limits.
    pub fn zoom_at(&mut self, factor: f32, anchor: (f32, f32)) {
        let old = self.zoom;
        let new = (old * factor).clamp(self.limits.min, self.limits.max);
        if (new - old).abs() <= f32::EPSILON {
            return;
        }
        let ratio = new / old;
        self.pan = (
            anchor.0 - (anchor.0 - self.pan.0) * ratio,
            anchor.1 - (anchor.1 - self.pan.1) * ratio,
        );
        self.zoom = new;
        self.clamp_pan();
    }

    /// One mouse-wheel notch: zoom in for positive `delta`, out otherwise.
    pub fn wheel(&mut self, delta: f32, anchor: (f32, f32)) {
        let factor = if delta > 0.0 { WHEEL_STEP } else { 1.0 / WHEEL_STEP };
        self.zoom_at(factor, anchor);
    }

    /// Drag the image by `(dx, dy)` canvas pixels.
    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        self.pan.0 += dx;
        self.pan.1 += dy;
        self.clamp_pan();
    }

    /// Update the canvas size (window resize).
    pub fn set_canvas(&mut self, canvas: (u32, u32)) {
        self.canvas = canvas;
        self.clamp_pan();
    }

    /// Keep at least a sliver of the image inside the viewport.
    fn clamp_pan(&mut self) {
        let (iw, ih) = dims_f32(self.image);
        let (cw, ch) = dims_f32(self.canvas);
        let clamp_axis = |pan: f32, img: f32, canvas: f32| {
            let visible = MIN_VISIBLE.min(img).min(canvas);
            pan.clamp(visible - img, canvas - visible)
        };
        self.pan = (
            clamp_axis(self.pan.0, iw * self.zoom, cw),
            clamp_axis(self.pan.1, ih * self.zoom, ch),
        );
    }
}

/// Original and processed canvases, kept at the same zoom and pan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewPair {
    /// View of the untouched photo.
    pub original: ViewTransform,
    /// View of the processed result.
    pub processed: ViewTransform,
}

/// Which of the two canvases an input event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    /// The original-photo canvas.
    Original,
    /// The processed-result canvas.
    Processed,
}

impl ViewPair {
    /// Two identical views.
    #[must_use]
    pub fn new(view: ViewTransform) -> Self {
        Self {
            original: view,
            processed: view,
        }
    }

    /// Apply `op` to the view of `pane` and mirror the result to the other.
    pub fn update(&mut self, pane: Pane, op: impl FnOnce(&mut ViewTransform)) {
        let (source, mirror) = match pane {
            Pane::Original => (&mut self.original, &mut self.processed),
            Pane::Processed => (&mut self.processed, &mut self.original),
        };
        op(source);
        mirror.zoom = source.zoom;
        mirror.pan = source.pan;
    }

    /// The view belonging to `pane`.
    #[must_use]
    pub fn get(&self, pane: Pane) -> &ViewTransform {
        match pane {
            Pane::Original => &self.original,
            Pane::Processed => &self.processed,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn dims_f32((w, h): (u32, u32)) -> (f32, f32) {
    (w as f32, h as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> ViewTransform {
        ViewTransform::new((400, 300), (800, 600), ZoomLimits::default())
    }

    #[test]
    fn canvas_and_image_coordinates_round_trip() {
        let mut v = view();
        v.zoom_at(2.0, (100.0, 50.0));
        let (ix, iy) = v.to_image(321.0, 123.0);
        let (cx, cy) = v.to_canvas(ix, iy);
        assert!((cx - 321.0).abs() < 1e-3);
        assert!((cy - 123.0).abs() < 1e-3);
    }

    #[test]
    fn zoom_keeps_anchor_fixed() {
        let mut v = view();
        let anchor = (200.0, 150.0);
        let before = v.to_image(anchor.0, anchor.1);
        v.zoom_at(1.5, anchor);
        let after = v.to_image(anchor.0, anchor.1);
        assert!((before.0 - after.0).abs() < 1e-3);
        assert!((before.1 - after.1).abs() < 1e-3);
    }

    #[test]
    fn zoom_is_clamped_to_limits() {
        let mut v = view();
        for _ in 0..100 {
            v.wheel(1.0, (0.0, 0.0));
        }
        assert!((v.zoom() - 5.0).abs() < 1e-6);
        for _ in 0..200 {
            v.wheel(-1.0, (0.0, 0.0));
        }
        assert!((v.zoom() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn inverted_or_nan_limits_are_normalized() {
        let v = ViewTransform::new((100, 100), (400, 300), ZoomLimits { min: 5.0, max: 0.1 });
        assert!((v.zoom() - 1.0).abs() < 1e-6);

        let mut v = ViewTransform::new(
            (100, 100),
            (400, 300),
            ZoomLimits {
                min: f32::NAN,
                max: -2.0,
            },
        );
        assert!((v.zoom() - 1.0).abs() < 1e-6);
        for _ in 0..100 {
            v.wheel(1.0, (0.0, 0.0));
        }
        assert!((v.zoom() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn fit_never_upscales_and_centers() {
        let mut v = view();
        v.fit();
        assert!((v.zoom() - 1.0).abs() < 1e-6);
        assert_eq!(v.pan(), (200.0, 150.0));

        let mut big = ViewTransform::new((2000, 1000), (1020, 520), ZoomLimits::default());
        big.fit();
        assert!((big.zoom() - 0.5).abs() < 1e-6);
        assert_eq!(big.pan(), (10.0, 10.0));
    }

    #[test]
    fn pan_cannot_drag_image_out_of_view() {
        let mut v = view();
        v.pan_by(10_000.0, -10_000.0);
        let (px, py) = v.pan();
        assert!((px - (800.0 - 32.0)).abs() < 1e-3);
        assert!((py - (32.0 - 300.0)).abs() < 1e-3);
    }

    #[test]
    fn pixel_mapping_floors_and_may_leave_image() {
        let mut v = view();
        v.pan_by(100.0, 100.0);
        assert_eq!(v.to_image_pixel(100.5, 100.9), (0, 0));
        assert_eq!(v.to_image_pixel(99.0, 50.0), (-1, -50));
    }

    #[test]
    fn brush_preview_radius_scales_with_zoom() {
        let mut v = view();
        v.zoom_at(0.1, (0.0, 0.0));
        assert!((v.brush_radius_on_canvas(30) - 3.0).abs() < 1e-4);
        assert!((v.brush_radius_on_canvas(1) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn pair_mirrors_zoom_and_pan() {
        let mut pair = ViewPair::new(view());
        pair.update(Pane::Processed, |v| {
            v.zoom_at(2.0, (10.0, 10.0));
            v.pan_by(5.0, 7.0);
        });
        assert_eq!(pair.original.zoom(), pair.processed.zoom());
        assert_eq!(pair.get(Pane::Original).pan(), pair.get(Pane::Processed).pan());
    }
}
