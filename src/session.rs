//! One image and its edit state.
//!
//! A [`Session`] owns the source photo, the cached soft mask, and a bounded
//! history of [`EditState`]s. The working alpha mask is always derived as
//! `(soft >= threshold OR keep) AND NOT remove`, so brush work survives
//! threshold changes.

use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use tracing::debug;

use crate::compose::{composite, subject_layer, PreviewMode, StickerStyle};
use crate::error::{ensure_unit, Result};
use crate::history::History;
use crate::mask::{check_dimensions, paint, stamp_disk, threshold, validate_radius};
use crate::mask::{AlphaMask, BrushMode, SoftMask, SUBJECT};
use crate::rings::{extract_rings, RingMask, RingWidths};

/// Result of an undo or redo request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// The history cursor moved.
    Applied,
    /// The undo stack was empty; nothing changed.
    NothingToUndo,
    /// The redo stack was empty; nothing changed.
    NothingToRedo,
}

/// Everything an undo step restores.
#[derive(Debug, Clone, PartialEq)]
pub struct EditState {
    /// Binarization cutoff applied to the soft mask.
    pub threshold: f32,
    /// Pixels forced into the subject by Keep strokes.
    pub keep: GrayImage,
    /// Pixels forced out of the subject by Remove strokes.
    pub remove: GrayImage,
    /// Mask the rings are frozen to while "lock reveal outline" is on.
    pub reveal_lock: Option<AlphaMask>,
}

struct Stroke {
    mode: BrushMode,
    radius: u32,
    stamps: usize,
}

struct CachedRings {
    widths: RingWidths,
    padding: u32,
    rings: RingMask,
}

/// Edit state for one source image.
pub struct Session {
    source: RgbImage,
    soft: SoftMask,
    state: EditState,
    history: History<EditState>,
    alpha: AlphaMask,
    stroke: Option<Stroke>,
    rings: Option<CachedRings>,
}

impl Session {
    /// Start editing `source` with the segmentation output `soft`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`](crate::Error::DimensionMismatch)
    /// when `soft` does not match `source`, and
    /// [`Error::InvalidParameter`](crate::Error::InvalidParameter) for a
    /// cutoff outside `[0, 1]`.
    pub fn new(source: RgbImage, soft: SoftMask, cutoff: f32, history_limit: usize) -> Result<Self> {
        check_dimensions(source.dimensions(), soft.dimensions())?;
        let alpha = threshold(&soft, cutoff)?;
        let (w, h) = source.dimensions();
        let state = EditState {
            threshold: cutoff,
            keep: GrayImage::new(w, h),
            remove: GrayImage::new(w, h),
            reveal_lock: None,
        };
        Ok(Self {
            history: History::new(state.clone(), history_limit),
            source,
            soft,
            state,
            alpha,
            stroke: None,
            rings: None,
        })
    }

    /// The untouched photo.
    #[must_use]
    pub fn source(&self) -> &RgbImage {
        &self.source
    }

    /// The segmentation output this session was built from.
    #[must_use]
    pub fn soft(&self) -> &SoftMask {
        &self.soft
    }

    /// The current binary subject mask.
    #[must_use]
    pub fn alpha(&self) -> &AlphaMask {
        &self.alpha
    }

    /// The current edit state.
    #[must_use]
    pub fn state(&self) -> &EditState {
        &self.state
    }

    /// Current threshold.
    #[must_use]
    pub fn threshold(&self) -> f32 {
        self.state.threshold
    }

    /// Whether the rings are frozen to a locked mask.
    #[must_use]
    pub fn is_reveal_locked(&self) -> bool {
        self.state.reveal_lock.is_some()
    }

    /// Number of available undo steps.
    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.history.undo_depth()
    }

    /// Number of available redo steps.
    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.history.redo_depth()
    }

    /// Re-threshold the soft mask. Brush overlays are kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`](crate::Error::InvalidParameter) for a
    /// cutoff outside `[0, 1]`; the session is unchanged.
    pub fn set_threshold(&mut self, cutoff: f32) -> Result<()> {
        ensure_unit("threshold", cutoff)?;
        self.end_stroke();
        if (cutoff - self.state.threshold).abs() <= f32::EPSILON {
            return Ok(());
        }
        self.state.threshold = cutoff;
        self.refresh_alpha()?;
        self.commit();
        Ok(())
    }

    /// Begin a brush stroke. Stamps until [`Session::end_stroke`] form one undo step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`](crate::Error::InvalidParameter) for a
    /// bad radius; no stroke is started.
    pub fn begin_stroke(&mut self, mode: BrushMode, radius: u32) -> Result<()> {
        validate_radius(radius)?;
        self.end_stroke();
        self.stroke = Some(Stroke {
            mode,
            radius,
            stamps: 0,
        });
        Ok(())
    }

    /// Stamp the active brush at `center` (image pixels, may lie off-image).
    ///
    /// Ignored when no stroke is in progress.
    ///
    /// # Errors
    ///
    /// Propagates brush validation errors; the radius was already checked by
    /// [`Session::begin_stroke`].
    pub fn stamp(&mut self, center: (i32, i32)) -> Result<()> {
        let Some(stroke) = self.stroke.as_mut() else {
            debug!("stamp outside of a stroke ignored");
            return Ok(());
        };
        let (set, clear) = match stroke.mode {
            BrushMode::Keep => (&mut self.state.keep, &mut self.state.remove),
            BrushMode::Remove => (&mut self.state.remove, &mut self.state.keep),
        };
        stamp_disk(set, center, stroke.radius, SUBJECT);
        stamp_disk(clear, center, stroke.radius, 0);
        paint(&mut self.alpha, center, stroke.radius, stroke.mode)?;
        stroke.stamps += 1;
        if self.state.reveal_lock.is_none() {
            self.rings = None;
        }
        Ok(())
    }

    /// Finish the active stroke, recording it if it touched anything.
    ///
    /// Returns whether a history entry was recorded.
    pub fn end_stroke(&mut self) -> bool {
        match self.stroke.take() {
            Some(stroke) if stroke.stamps > 0 => {
                debug!(stamps = stroke.stamps, mode = ?stroke.mode, "stroke recorded");
                self.commit();
                true
            }
            _ => false,
        }
    }

    /// Paint a whole stroke through `points` as a single undo step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`](crate::Error::InvalidParameter) for a
    /// bad radius; the mask is left untouched.
    pub fn paint_stroke(&mut self, mode: BrushMode, radius: u32, points: &[(i32, i32)]) -> Result<()> {
        self.begin_stroke(mode, radius)?;
        for &point in points {
            self.stamp(point)?;
        }
        self.end_stroke();
        Ok(())
    }

    /// Freeze (or release) the mask the reveal and outline rings are built from.
    pub fn set_reveal_lock(&mut self, locked: bool) {
        self.end_stroke();
        if locked == self.is_reveal_locked() {
            return;
        }
        self.state.reveal_lock = locked.then(|| self.alpha.clone());
        self.rings = None;
        self.commit();
    }

    /// Step back one edit.
    pub fn undo(&mut self) -> EditOutcome {
        self.end_stroke();
        match self.history.undo().cloned() {
            Some(state) => {
                self.restore(state);
                EditOutcome::Applied
            }
            None => EditOutcome::NothingToUndo,
        }
    }

    /// Re-apply the last undone edit.
    pub fn redo(&mut self) -> EditOutcome {
        self.end_stroke();
        match self.history.redo().cloned() {
            Some(state) => {
                self.restore(state);
                EditOutcome::Applied
            }
            None => EditOutcome::NothingToRedo,
        }
    }

    /// Rings for `style`, built from the locked mask when the lock is on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`](crate::Error::InvalidParameter) for
    /// invalid ring widths.
    pub fn rings(&mut self, style: &StickerStyle) -> Result<&RingMask> {
        let ring_source = self.state.reveal_lock.as_ref().unwrap_or(&self.alpha);
        cached_rings(&mut self.rings, ring_source, style)
    }

    /// Render what the processed view shows in `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`](crate::Error::InvalidParameter) for
    /// an invalid style.
    pub fn render(&mut self, mode: PreviewMode, style: &StickerStyle) -> Result<RgbaImage> {
        match mode {
            PreviewMode::Original => Ok(DynamicImage::ImageRgb8(self.source.clone()).into_rgba8()),
            PreviewMode::Cutout => subject_layer(&self.source, &self.alpha, style),
            PreviewMode::Sticker => {
                let ring_source = self.state.reveal_lock.as_ref().unwrap_or(&self.alpha);
                let rings = cached_rings(&mut self.rings, ring_source, style)?;
                composite(&self.source, &self.alpha, rings, style)
            }
        }
    }

    fn commit(&mut self) {
        self.history.record(self.state.clone());
    }

    fn restore(&mut self, state: EditState) {
        self.state = state;
        self.rings = None;
        // Recorded thresholds were validated when they were set.
        if let Err(e) = self.refresh_alpha() {
            debug!(error = %e, "restored state failed to re-threshold");
        }
    }

    fn refresh_alpha(&mut self) -> Result<()> {
        let mut alpha = threshold(&self.soft, self.state.threshold)?;
        alpha.apply_overrides(&self.state.keep, &self.state.remove);
        self.alpha = alpha;
        if self.state.reveal_lock.is_none() {
            self.rings = None;
        }
        Ok(())
    }
}

fn cached_rings<'a>(
    cache: &'a mut Option<CachedRings>,
    mask: &AlphaMask,
    style: &StickerStyle,
) -> Result<&'a RingMask> {
    let widths = style.ring_widths();
    let padding = style.padding();
    let entry = match cache.take() {
        Some(hit) if hit.widths == widths && hit.padding == padding => hit,
        _ => CachedRings {
            widths,
            padding,
            rings: extract_rings(mask, widths, padding)?,
        },
    };
    Ok(&cache.insert(entry).rings)
}
