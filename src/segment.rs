//! The segmentation collaborator and its pre/post-processing.
//!
//! The model itself is opaque: anything that turns an RGB image into a
//! same-sized [`SoftMask`] can implement [`Segmenter`]. Models that expect a
//! fixed square input can use [`letterbox`] to prepare the image and
//! [`Letterbox::restore`] to map the prediction back to the source size.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use tracing::debug;

use crate::error::{Error, Result};
use crate::mask::{check_dimensions, SoftMask};

/// Square input resolution of the usual dichotomous segmentation models.
pub const MODEL_INPUT_SIZE: u32 = 1024;

/// Something that produces a soft subject mask for an image.
pub trait Segmenter: Send + Sync {
    /// Segment `image`. The returned mask must match its dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelUnavailable`] when the model cannot be loaded or run.
    fn segment(&self, image: &RgbImage) -> Result<SoftMask>;

    /// Segment `image`, which was loaded from `path`.
    ///
    /// Collaborators that look masks up by file name override this.
    ///
    /// # Errors
    ///
    /// Same as [`Segmenter::segment`].
    fn segment_file(&self, path: &Path, image: &RgbImage) -> Result<SoftMask> {
        let _ = path;
        self.segment(image)
    }
}

impl<F> Segmenter for F
where
    F: Fn(&RgbImage) -> Result<SoftMask> + Send + Sync,
{
    fn segment(&self, image: &RgbImage) -> Result<SoftMask> {
        self(image)
    }
}

/// Run `segmenter` and verify the mask it returned fits `image`.
///
/// # Errors
///
/// Propagates segmenter errors; returns [`Error::DimensionMismatch`] when the
/// mask size is wrong.
pub fn run_segmenter(segmenter: &dyn Segmenter, path: &Path, image: &RgbImage) -> Result<SoftMask> {
    let soft = segmenter.segment_file(path, image)?;
    check_dimensions(image.dimensions(), soft.dimensions())?;
    debug!(path = %path.display(), "segmented");
    Ok(soft)
}

/// An image scaled onto a square model canvas, plus where it landed.
#[derive(Debug, Clone)]
pub struct Letterbox {
    /// The square model input, black outside the image region.
    pub canvas: RgbImage,
    offset: (u32, u32),
    scaled: (u32, u32),
    source: (u32, u32),
}

/// Scale `image` to fit a `size`x`size` canvas, preserving aspect ratio, and center it.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] for a zero `size` or an empty image.
pub fn letterbox(image: &RgbImage, size: u32) -> Result<Letterbox> {
    let (w, h) = image.dimensions();
    if size == 0 {
        return Err(Error::invalid("model input size", "must be positive"));
    }
    if w == 0 || h == 0 {
        return Err(Error::invalid("image", "has no pixels"));
    }

    let scale = (f64::from(size) / f64::from(w)).min(f64::from(size) / f64::from(h));
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let scaled = (
        ((f64::from(w) * scale).round() as u32).clamp(1, size),
        ((f64::from(h) * scale).round() as u32).clamp(1, size),
    );
    let offset = ((size - scaled.0) / 2, (size - scaled.1) / 2);

    let resized = imageops::resize(image, scaled.0, scaled.1, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([0, 0, 0]));
    imageops::replace(&mut canvas, &resized, i64::from(offset.0), i64::from(offset.1));

    Ok(Letterbox {
        canvas,
        offset,
        scaled,
        source: (w, h),
    })
}

impl Letterbox {
    /// Crop the image region out of a model-resolution `prediction` and
    /// resize it (bilinear) back to the source dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `prediction` is not the size of
    /// the letterbox canvas.
    pub fn restore(&self, prediction: &SoftMask) -> Result<SoftMask> {
        check_dimensions(self.canvas.dimensions(), prediction.dimensions())?;
        let crop = imageops::crop_imm(
            prediction.as_buffer(),
            self.offset.0,
            self.offset.1,
            self.scaled.0,
            self.scaled.1,
        )
        .to_image();
        let full = imageops::resize(&crop, self.source.0, self.source.1, FilterType::Triangle);
        Ok(SoftMask::new(full))
    }
}

/// Where a [`MaskFileSegmenter`] finds precomputed masks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskLocation {
    /// `<stem>_mask.png` next to each image.
    Beside,
    /// `<stem>_mask.png` inside this directory.
    Dir(PathBuf),
    /// This exact file, for every image.
    File(PathBuf),
}

/// A segmentation collaborator that reads grayscale masks from disk,
/// e.g. produced offline by a separate model run.
#[derive(Debug, Clone)]
pub struct MaskFileSegmenter {
    location: MaskLocation,
}

impl MaskFileSegmenter {
    /// Look masks up at `location`.
    #[must_use]
    pub fn new(location: MaskLocation) -> Self {
        Self { location }
    }

    /// The mask path used for the image at `image_path`.
    #[must_use]
    pub fn mask_path_for(&self, image_path: &Path) -> PathBuf {
        let stem = image_path.file_stem().unwrap_or_default().to_string_lossy();
        let name = format!("{stem}_mask.png");
        match &self.location {
            MaskLocation::Beside => image_path.parent().unwrap_or(Path::new(".")).join(name),
            MaskLocation::Dir(dir) => dir.join(name),
            MaskLocation::File(file) => file.clone(),
        }
    }

    /// Drop from `files` every path that is the mask of another listed image.
    ///
    /// A folder scanned for photos also holds their `<stem>_mask.png` files
    /// when masks live beside the images; those are inputs to this
    /// segmenter, not images to process.
    #[must_use]
    pub fn without_masks(&self, files: Vec<PathBuf>) -> Vec<PathBuf> {
        let masks: HashSet<PathBuf> = files
            .iter()
            .map(|f| self.mask_path_for(f))
            .filter(|m| files.contains(m))
            .collect();
        files
            .into_iter()
            .filter(|f| {
                let skip = masks.contains(f);
                if skip {
                    debug!(path = %f.display(), "skipping mask file");
                }
                !skip
            })
            .collect()
    }
}

impl Segmenter for MaskFileSegmenter {
    fn segment(&self, image: &RgbImage) -> Result<SoftMask> {
        match &self.location {
            MaskLocation::File(file) => load_mask(file, image.dimensions()),
            _ => Err(Error::ModelUnavailable(
                "mask lookup needs the source file path".to_string(),
            )),
        }
    }

    fn segment_file(&self, path: &Path, image: &RgbImage) -> Result<SoftMask> {
        load_mask(&self.mask_path_for(path), image.dimensions())
    }
}

/// Load a grayscale mask, resizing it (bilinear) if its size differs.
fn load_mask(path: &Path, (w, h): (u32, u32)) -> Result<SoftMask> {
    let gray = image::open(path)
        .map_err(|e| Error::ModelUnavailable(format!("no usable mask at {}: {e}", path.display())))?
        .to_luma8();
    let gray = if gray.dimensions() == (w, h) {
        gray
    } else {
        debug!(path = %path.display(), "resizing mask to image size");
        imageops::resize(&gray, w, h, FilterType::Triangle)
    };
    Ok(SoftMask::from_gray(&gray))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma};

    #[test]
    fn letterbox_centers_wide_image() {
        let img = RgbImage::from_pixel(200, 100, Rgb([255, 255, 255]));
        let lb = letterbox(&img, 64).unwrap();
        assert_eq!(lb.canvas.dimensions(), (64, 64));
        assert_eq!(lb.scaled, (64, 32));
        assert_eq!(lb.offset, (0, 16));
        assert_eq!(lb.canvas.get_pixel(10, 5).0, [0, 0, 0]);
        assert_eq!(lb.canvas.get_pixel(10, 30).0, [255, 255, 255]);
    }

    #[test]
    fn restore_maps_prediction_back_to_source_size() {
        let img = RgbImage::new(200, 100);
        let lb = letterbox(&img, 64).unwrap();
        // Prediction: subject in the letterboxed image area only.
        let pred = SoftMask::new(ImageBuffer::from_fn(64, 64, |_, y| {
            Luma([if (16..48).contains(&y) { 1.0 } else { 0.0 }])
        }));
        let restored = lb.restore(&pred).unwrap();
        assert_eq!(restored.dimensions(), (200, 100));
        assert!(restored.get(100, 0) > 0.99);
        assert!(restored.get(100, 99) > 0.99);
    }

    #[test]
    fn restore_rejects_wrong_prediction_size() {
        let lb = letterbox(&RgbImage::new(10, 10), 32).unwrap();
        let pred = SoftMask::new(ImageBuffer::new(16, 16));
        assert!(lb.restore(&pred).is_err());
    }

    #[test]
    fn letterbox_rejects_empty_inputs() {
        assert!(letterbox(&RgbImage::new(0, 10), 32).is_err());
        assert!(letterbox(&RgbImage::new(10, 10), 0).is_err());
    }

    #[test]
    fn closures_are_segmenters() {
        let seg = |img: &RgbImage| -> Result<SoftMask> {
            Ok(SoftMask::new(ImageBuffer::from_pixel(img.width(), img.height(), Luma([0.7]))))
        };
        let img = RgbImage::new(4, 3);
        let soft = run_segmenter(&seg, Path::new("a.png"), &img).unwrap();
        assert_eq!(soft.dimensions(), (4, 3));
    }

    #[test]
    fn wrong_sized_model_output_is_rejected() {
        let seg = |_: &RgbImage| -> Result<SoftMask> { Ok(SoftMask::new(ImageBuffer::new(2, 2))) };
        let err = run_segmenter(&seg, Path::new("a.png"), &RgbImage::new(4, 3)).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn mask_file_segmenter_reads_mask_beside_image() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("cat.jpg");
        let mut gray = GrayImage::new(8, 8);
        gray.put_pixel(3, 3, Luma([255]));
        gray.save(dir.path().join("cat_mask.png")).unwrap();

        let seg = MaskFileSegmenter::new(MaskLocation::Beside);
        assert_eq!(seg.mask_path_for(&image_path), dir.path().join("cat_mask.png"));
        let soft = seg.segment_file(&image_path, &RgbImage::new(8, 8)).unwrap();
        assert!((soft.get(3, 3) - 1.0).abs() < f32::EPSILON);
        assert_eq!(soft.get(0, 0), 0.0);
    }

    #[test]
    fn masks_beside_images_are_not_inputs() {
        let files = vec![
            PathBuf::from("/p/cat.png"),
            PathBuf::from("/p/cat_mask.png"),
            PathBuf::from("/p/dog.jpg"),
            PathBuf::from("/p/dog_mask.png"),
            PathBuf::from("/p/lone_mask.png"),
        ];
        let seg = MaskFileSegmenter::new(MaskLocation::Beside);
        assert_eq!(
            seg.without_masks(files.clone()),
            vec![
                PathBuf::from("/p/cat.png"),
                PathBuf::from("/p/dog.jpg"),
                PathBuf::from("/p/lone_mask.png"),
            ]
        );

        let shared = MaskFileSegmenter::new(MaskLocation::File(PathBuf::from("/p/dog_mask.png")));
        assert_eq!(shared.without_masks(files.clone()).len(), 4);

        let elsewhere = MaskFileSegmenter::new(MaskLocation::Dir(PathBuf::from("/masks")));
        assert_eq!(elsewhere.without_masks(files.clone()), files);
    }

    #[test]
    fn missing_mask_reports_model_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let seg = MaskFileSegmenter::new(MaskLocation::Dir(dir.path().to_path_buf()));
        let err = seg
            .segment_file(Path::new("/photos/dog.png"), &RgbImage::new(4, 4))
            .unwrap_err();
        assert!(matches!(err, Error::ModelUnavailable(_)));
    }
}
