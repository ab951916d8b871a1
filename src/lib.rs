//! Turn segmented photo subjects into stickers.
//!
//! A segmentation model (any [`Segmenter`]) produces a soft subject mask. The
//! mask is thresholded into an [`AlphaMask`], touched up with keep/remove
//! brush strokes, and composited with up to three rings around the subject:
//! a band of original background pixels (the "reveal" ring), a decorative
//! stroke hugging it, and a solid outline outside everything.
//!
//! # Quick Start
//!
//! ```no_run
//! use sticker_studio::{extract_rings, composite, threshold, SoftMask, StickerStyle};
//!
//! let photo = image::open("photo.jpg").unwrap().to_rgb8();
//! let matte = image::open("photo_mask.png").unwrap().to_luma8();
//! let mask = threshold(&SoftMask::from_gray(&matte), 0.5).unwrap();
//!
//! let style = StickerStyle::default();
//! let rings = extract_rings(&mask, style.ring_widths(), style.padding()).unwrap();
//! composite(&photo, &mask, &rings, &style).unwrap().save("sticker.png").unwrap();
//! ```
//!
//! # Editing
//!
//! A [`Session`] keeps one image's edits with undo/redo; a [`Studio`] manages
//! a list of images, their sessions, and batch export.
//!
//! ```no_run
//! use std::sync::Arc;
//! use sticker_studio::{BrushMode, MaskFileSegmenter, MaskLocation, PreviewMode, Studio};
//!
//! let mut studio = Studio::new(Arc::new(MaskFileSegmenter::new(MaskLocation::Beside)));
//! studio.add_files(["cat.png".into()]);
//! let style = studio.style().clone();
//! let session = studio.selected_session().unwrap();
//! session.paint_stroke(BrushMode::Remove, 12, &[(40, 40), (44, 41)]).unwrap();
//! session.undo();
//! let preview = session.render(PreviewMode::Sticker, &style).unwrap();
//! ```

#![deny(missing_docs)]

pub mod color;
pub mod compose;
pub mod error;
pub mod export;
pub mod history;
pub mod mask;
pub mod prefs;
pub mod rings;
pub mod segment;
pub mod session;
pub mod studio;
pub mod view;
pub mod worker;

pub use color::Color;
pub use compose::{composite, subject_layer, PreviewMode, StickerStyle};
pub use error::{Error, Result};
pub use export::{
    collect_images, export_file, export_files, export_session, is_supported_image, load_rgb,
    save_png, ExportOptions, ExportResult, Variant,
};
pub use history::{History, DEFAULT_HISTORY_LIMIT};
pub use mask::{blend, isolate, paint, threshold, AlphaMask, BrushMode, SoftMask};
pub use prefs::{Preferences, PreferencesStore, Presets, WindowGeometry, DEFAULT_PRESET};
pub use rings::{extract_rings, RingMask, RingWidths, MAX_RING_WIDTH};
pub use segment::{letterbox, Letterbox, MaskFileSegmenter, MaskLocation, Segmenter};
pub use session::{EditOutcome, EditState, Session};
pub use studio::{DeleteOutcome, Studio};
pub use view::{Pane, ViewPair, ViewTransform, ZoomLimits};
pub use worker::{SegmentationReply, SegmentationWorker};
