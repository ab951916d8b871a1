//! The working set of images: file list, selection, per-file sessions and
//! the soft-mask cache.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::compose::StickerStyle;
use crate::error::{ensure_unit, Error, Result};
use crate::export::{export_files, export_session, is_supported_image, load_rgb};
use crate::export::{ExportOptions, ExportResult};
use crate::history::DEFAULT_HISTORY_LIMIT;
use crate::mask::SoftMask;
use crate::prefs::Preferences;
use crate::segment::{run_segmenter, Segmenter};
use crate::session::Session;
use crate::worker::SegmentationReply;

/// Outcome of deleting one file from disk.
#[derive(Debug)]
pub struct DeleteOutcome {
    /// The file that was targeted.
    pub path: PathBuf,
    /// `Ok` if it is gone.
    pub result: Result<()>,
}

/// A list of images being turned into stickers.
pub struct Studio {
    files: Vec<PathBuf>,
    selected: Option<usize>,
    masks: HashMap<PathBuf, SoftMask>,
    sessions: HashMap<PathBuf, Session>,
    style: StickerStyle,
    threshold: f32,
    history_limit: usize,
    segmenter: Arc<dyn Segmenter>,
}

impl Studio {
    /// An empty studio using `segmenter` for images without a cached mask.
    #[must_use]
    pub fn new(segmenter: Arc<dyn Segmenter>) -> Self {
        Self {
            files: Vec::new(),
            selected: None,
            masks: HashMap::new(),
            sessions: HashMap::new(),
            style: StickerStyle::default(),
            threshold: 0.5,
            history_limit: DEFAULT_HISTORY_LIMIT,
            segmenter,
        }
    }

    /// Take style and threshold from saved preferences.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `prefs` fails validation; the
    /// studio is unchanged.
    pub fn apply_preferences(&mut self, prefs: &Preferences) -> Result<()> {
        prefs.validate()?;
        self.style = prefs.style.clone();
        self.threshold = prefs.threshold;
        Ok(())
    }

    /// The shared sticker style.
    #[must_use]
    pub fn style(&self) -> &StickerStyle {
        &self.style
    }

    /// Replace the shared sticker style.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for an invalid style.
    pub fn set_style(&mut self, style: StickerStyle) -> Result<()> {
        style.validate()?;
        self.style = style;
        Ok(())
    }

    /// Cutoff used when a session is first opened.
    #[must_use]
    pub fn default_threshold(&self) -> f32 {
        self.threshold
    }

    /// Set the cutoff used when a session is first opened.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] outside `[0, 1]`.
    pub fn set_default_threshold(&mut self, cutoff: f32) -> Result<()> {
        ensure_unit("threshold", cutoff)?;
        self.threshold = cutoff;
        Ok(())
    }

    /// Set the undo depth for sessions opened from now on.
    pub fn set_history_limit(&mut self, limit: usize) {
        self.history_limit = limit;
    }

    /// Files in list order.
    #[must_use]
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Append supported images that are not already listed.
    ///
    /// Returns how many were added. The first file added to an empty list is
    /// selected.
    pub fn add_files<I>(&mut self, paths: I) -> usize
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let before = self.files.len();
        for path in paths {
            if !is_supported_image(&path) {
                debug!(path = %path.display(), "skipping unsupported file");
                continue;
            }
            if !self.files.contains(&path) {
                self.files.push(path);
            }
        }
        if self.selected.is_none() && !self.files.is_empty() {
            self.selected = Some(0);
        }
        self.files.len() - before
    }

    /// Index of the selected file.
    #[must_use]
    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// Path of the selected file.
    #[must_use]
    pub fn selected_path(&self) -> Option<&Path> {
        self.selected
            .and_then(|i| self.files.get(i))
            .map(PathBuf::as_path)
    }

    /// Select the file at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for an index past the end.
    pub fn select(&mut self, index: usize) -> Result<()> {
        if index >= self.files.len() {
            return Err(Error::invalid(
                "selection",
                format!("index {index} but only {} files", self.files.len()),
            ));
        }
        self.selected = Some(index);
        Ok(())
    }

    /// Select the next file, wrapping to the first.
    pub fn select_next(&mut self) -> Option<&Path> {
        let len = self.files.len();
        if len == 0 {
            return None;
        }
        self.selected = Some(self.selected.map_or(0, |i| (i + 1) % len));
        self.selected_path()
    }

    /// Select the previous file, wrapping to the last.
    pub fn select_previous(&mut self) -> Option<&Path> {
        let len = self.files.len();
        if len == 0 {
            return None;
        }
        self.selected = Some(self.selected.map_or(len - 1, |i| (i + len - 1) % len));
        self.selected_path()
    }

    /// Drop the selected file from the list (the file on disk is untouched).
    pub fn remove_selected(&mut self) -> Option<PathBuf> {
        let index = self.selected?;
        let path = self.files.remove(index);
        self.forget(&path);
        self.fix_selection(index);
        Some(path)
    }

    /// Empty the list and every cache.
    pub fn clear(&mut self) {
        self.files.clear();
        self.masks.clear();
        self.sessions.clear();
        self.selected = None;
    }

    /// Delete the files at `indices` from disk.
    ///
    /// Nothing happens unless `confirmed` is `true`. Successfully deleted
    /// files leave the list; failures are reported and stay listed.
    pub fn delete_from_disk(&mut self, indices: &[usize], confirmed: bool) -> Vec<DeleteOutcome> {
        if !confirmed {
            debug!(count = indices.len(), "delete not confirmed");
            return Vec::new();
        }
        let targets: Vec<PathBuf> = indices
            .iter()
            .filter_map(|&i| self.files.get(i).cloned())
            .collect();

        let mut outcomes = Vec::with_capacity(targets.len());
        for path in targets {
            let result = std::fs::remove_file(&path).map_err(Error::from);
            match &result {
                Ok(()) => {
                    info!(path = %path.display(), "deleted");
                    if let Some(index) = self.files.iter().position(|p| *p == path) {
                        self.files.remove(index);
                        self.fix_selection(index);
                    }
                    self.forget(&path);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "delete failed"),
            }
            outcomes.push(DeleteOutcome { path, result });
        }
        outcomes
    }

    /// Store a soft mask for `path`, e.g. from a [`SegmentationReply`].
    pub fn cache_mask(&mut self, path: PathBuf, soft: SoftMask) {
        self.masks.insert(path, soft);
    }

    /// Whether a soft mask is cached for `path`.
    #[must_use]
    pub fn has_mask(&self, path: &Path) -> bool {
        self.masks.contains_key(path)
    }

    /// Take a worker reply into the mask cache.
    ///
    /// # Errors
    ///
    /// Returns the segmentation error carried by the reply.
    pub fn accept_reply(&mut self, reply: SegmentationReply) -> Result<()> {
        let soft = reply.result?;
        self.cache_mask(reply.key, soft);
        Ok(())
    }

    /// The editing session for `path`, opening it on first use.
    ///
    /// Opening loads the image and uses the cached soft mask, running the
    /// segmenter (and caching its output) only if there is none.
    ///
    /// # Errors
    ///
    /// Returns load, segmentation, or dimension errors.
    pub fn session(&mut self, path: &Path) -> Result<&mut Session> {
        match self.sessions.entry(path.to_path_buf()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let source = load_rgb(path)?;
                let soft = match self.masks.get(path) {
                    Some(soft) => soft.clone(),
                    None => {
                        let soft = run_segmenter(&*self.segmenter, path, &source)?;
                        self.masks.insert(path.to_path_buf(), soft.clone());
                        soft
                    }
                };
                let session = Session::new(source, soft, self.threshold, self.history_limit)?;
                info!(path = %path.display(), "opened");
                Ok(entry.insert(session))
            }
        }
    }

    /// The session of the selected file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] when nothing is selected, otherwise
    /// as [`Studio::session`].
    pub fn selected_session(&mut self) -> Result<&mut Session> {
        let path = self
            .selected_path()
            .ok_or_else(|| Error::invalid("selection", "no file selected"))?
            .to_path_buf();
        self.session(&path)
    }

    /// Export the selected file with its current edits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] when nothing is selected.
    pub fn export_selected(&mut self, opts: &ExportOptions) -> Result<ExportResult> {
        let path = self
            .selected_path()
            .ok_or_else(|| Error::invalid("selection", "no file selected"))?
            .to_path_buf();
        Ok(self.export_one(&path, opts))
    }

    /// Export every listed file. Edited files keep their edits; the rest are
    /// processed in parallel from the mask cache or the segmenter.
    pub fn export_all(&mut self, opts: &ExportOptions) -> Vec<ExportResult> {
        let (edited, fresh): (Vec<PathBuf>, Vec<PathBuf>) = self
            .files
            .iter()
            .cloned()
            .partition(|p| self.sessions.contains_key(p));

        let opts_fresh = ExportOptions {
            threshold: self.threshold,
            ..opts.clone()
        };
        let cached = CachedSegmenter {
            cache: &self.masks,
            inner: &*self.segmenter,
        };
        let mut results: HashMap<PathBuf, ExportResult> =
            export_files(&fresh, &cached, &self.style, &opts_fresh)
                .into_iter()
                .map(|r| (r.path.clone(), r))
                .collect();
        for path in edited {
            let result = self.export_one(&path, opts);
            results.insert(path, result);
        }

        let ordered: Vec<ExportResult> = self
            .files
            .iter()
            .filter_map(|p| results.remove(p))
            .collect();
        let failed = ordered.iter().filter(|r| !r.success()).count();
        info!(total = ordered.len(), failed, "batch export finished");
        ordered
    }

    fn export_one(&mut self, path: &Path, opts: &ExportOptions) -> ExportResult {
        let style = self.style.clone();
        let exported = self.session(path).and_then(|session| {
            let outputs = export_session(session, path, &style, opts)?;
            Ok((outputs, session.alpha().count()))
        });
        match exported {
            Ok((outputs, subject_pixels)) => ExportResult {
                path: path.to_path_buf(),
                outputs,
                subject_pixels,
                error: None,
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "export failed");
                ExportResult {
                    path: path.to_path_buf(),
                    outputs: Vec::new(),
                    subject_pixels: 0,
                    error: Some(e),
                }
            }
        }
    }

    fn forget(&mut self, path: &Path) {
        self.masks.remove(path);
        self.sessions.remove(path);
    }

    /// Keep the selection valid after removing the entry at `removed`.
    fn fix_selection(&mut self, removed: usize) {
        self.selected = match self.selected {
            _ if self.files.is_empty() => None,
            Some(i) if i > removed => Some(i - 1),
            Some(i) => Some(i.min(self.files.len() - 1)),
            None => None,
        };
    }
}

/// Serves cached masks before falling back to the real segmenter.
struct CachedSegmenter<'a> {
    cache: &'a HashMap<PathBuf, SoftMask>,
    inner: &'a dyn Segmenter,
}

impl Segmenter for CachedSegmenter<'_> {
    fn segment(&self, image: &RgbImage) -> Result<SoftMask> {
        self.inner.segment(image)
    }

    fn segment_file(&self, path: &Path, image: &RgbImage) -> Result<SoftMask> {
        match self.cache.get(path) {
            Some(soft) => Ok(soft.clone()),
            None => self.inner.segment_file(path, image),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::BrushMode;
    use image::{ImageBuffer, Luma, Rgb};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn write_image(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(20, 20, Rgb([50, 60, 70])).save(&path).unwrap();
        path
    }

    fn counting_segmenter(calls: &Arc<AtomicUsize>) -> Arc<dyn Segmenter> {
        let calls = Arc::clone(calls);
        Arc::new(move |img: &RgbImage| -> Result<SoftMask> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(SoftMask::new(ImageBuffer::from_fn(img.width(), img.height(), |x, _| {
                Luma([if x < 10 { 0.9 } else { 0.1 }])
            })))
        })
    }

    fn studio() -> Studio {
        Studio::new(counting_segmenter(&Arc::new(AtomicUsize::new(0))))
    }

    #[test]
    fn add_files_filters_and_dedupes() {
        let mut s = studio();
        let added = s.add_files(["a.png", "b.txt", "a.png", "c.JPG"].map(PathBuf::from));
        assert_eq!(added, 2);
        assert_eq!(s.files(), &[PathBuf::from("a.png"), PathBuf::from("c.JPG")]);
        assert_eq!(s.selected(), Some(0));
    }

    #[test]
    fn navigation_wraps() {
        let mut s = studio();
        s.add_files(["a.png", "b.png", "c.png"].map(PathBuf::from));
        assert_eq!(s.select_previous(), Some(Path::new("c.png")));
        assert_eq!(s.select_next(), Some(Path::new("a.png")));
        assert_eq!(s.select_next(), Some(Path::new("b.png")));
        assert!(s.select(3).is_err());
        s.select(2).unwrap();
        assert_eq!(s.select_next(), Some(Path::new("a.png")));
    }

    #[test]
    fn remove_selected_keeps_selection_valid() {
        let mut s = studio();
        s.add_files(["a.png", "b.png"].map(PathBuf::from));
        s.select(1).unwrap();
        assert_eq!(s.remove_selected(), Some(PathBuf::from("b.png")));
        assert_eq!(s.selected(), Some(0));
        assert_eq!(s.remove_selected(), Some(PathBuf::from("a.png")));
        assert_eq!(s.selected(), None);
        assert_eq!(s.remove_selected(), None);
    }

    #[test]
    fn delete_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_image(dir.path(), "a.png");
        let b = write_image(dir.path(), "b.png");
        let mut s = studio();
        s.add_files([a.clone(), b.clone()]);

        assert!(s.delete_from_disk(&[0], false).is_empty());
        assert!(a.exists());

        let outcomes = s.delete_from_disk(&[0, 7], true);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result.is_ok());
        assert!(!a.exists());
        assert_eq!(s.files(), &[b]);
    }

    #[test]
    fn delete_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = studio();
        s.add_files([dir.path().join("ghost.png")]);
        let outcomes = s.delete_from_disk(&[0], true);
        assert!(matches!(outcomes[0].result, Err(Error::Io(_))));
        assert_eq!(s.files().len(), 1);
    }

    #[test]
    fn mask_cache_avoids_resegmenting() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_image(dir.path(), "a.png");
        let calls = Arc::new(AtomicUsize::new(0));
        let mut s = Studio::new(counting_segmenter(&calls));
        s.add_files([path.clone()]);

        s.selected_session().unwrap().set_threshold(0.05).unwrap();
        assert_eq!(s.selected_session().unwrap().alpha().count(), 400);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(s.has_mask(&path));

        // Dropping the list entry forgets the session and mask.
        s.remove_selected();
        assert!(!s.has_mask(&path));
    }

    #[test]
    fn export_all_keeps_edits_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_image(dir.path(), "a.png");
        let b = write_image(dir.path(), "b.png");
        let calls = Arc::new(AtomicUsize::new(0));
        let mut s = Studio::new(counting_segmenter(&calls));
        s.add_files([a.clone(), b.clone()]);
        s.set_style(StickerStyle {
            reveal_width: 0,
            outline_width: 0,
            ..StickerStyle::default()
        })
        .unwrap();

        // Edit b only: wipe its subject.
        s.select(1).unwrap();
        s.selected_session()
            .unwrap()
            .paint_stroke(BrushMode::Remove, 30, &[(5, 10)])
            .unwrap();

        let opts = ExportOptions {
            output_dir: dir.path().join("out"),
            ..ExportOptions::default()
        };
        let results = s.export_all(&opts);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].path, a);
        assert_eq!(results[0].subject_pixels, 200);
        assert_eq!(results[1].path, b);
        assert_eq!(results[1].subject_pixels, 0);
        assert!(results.iter().all(ExportResult::success));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn accept_reply_fills_cache() {
        let mut s = studio();
        let reply = SegmentationReply {
            generation: 1,
            key: PathBuf::from("x.png"),
            result: Ok(SoftMask::new(ImageBuffer::new(2, 2))),
        };
        s.accept_reply(reply).unwrap();
        assert!(s.has_mask(Path::new("x.png")));

        let failed = SegmentationReply {
            generation: 2,
            key: PathBuf::from("y.png"),
            result: Err(Error::ModelUnavailable("no weights".into())),
        };
        assert!(s.accept_reply(failed).is_err());
        assert!(!s.has_mask(Path::new("y.png")));
    }

    #[test]
    fn export_without_selection_fails() {
        let mut s = studio();
        assert!(s.export_selected(&ExportOptions::default()).is_err());
    }
}
