//! Persisted preferences and named presets.
//!
//! Both documents are pretty-printed JSON in one directory. A missing file
//! means "use defaults"; a corrupt one is logged and replaced by defaults so
//! startup never fails on stale state.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::compose::{PreviewMode, StickerStyle};
use crate::error::{ensure_unit, Error, Result};
use crate::mask::validate_radius;

/// Name of the built-in preset that always exists.
pub const DEFAULT_PRESET: &str = "Default";

const SESSION_FILE: &str = "last_session.json";
const PRESETS_FILE: &str = "presets.json";

/// Main window position and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowGeometry {
    /// Left edge in screen pixels.
    pub x: i32,
    /// Top edge in screen pixels.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Every user-facing setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Soft-mask cutoff.
    pub threshold: f32,
    /// Ring and background settings.
    pub style: StickerStyle,
    /// Brush radius in image pixels.
    pub brush_size: u32,
    /// What the processed view shows.
    pub preview_mode: PreviewMode,
    /// Freeze the rings to the mask at the time of locking.
    pub lock_reveal: bool,
    /// Export only the current preview instead of every variant.
    pub save_only_final: bool,
    /// Where exports go. Not stored in presets.
    pub output_dir: Option<PathBuf>,
    /// Last window geometry. Not stored in presets.
    pub window: Option<WindowGeometry>,
    /// Preset these settings were last loaded from.
    pub preset: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            style: StickerStyle::default(),
            brush_size: 30,
            preview_mode: PreviewMode::default(),
            lock_reveal: false,
            save_only_final: false,
            output_dir: None,
            window: None,
            preset: DEFAULT_PRESET.to_string(),
        }
    }
}

impl Preferences {
    /// Check numeric ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for the first out-of-range field.
    pub fn validate(&self) -> Result<()> {
        ensure_unit("threshold", self.threshold)?;
        validate_radius(self.brush_size)?;
        self.style.validate()
    }

    /// These settings minus the per-machine fields (output dir, window).
    #[must_use]
    pub fn as_preset(&self) -> Self {
        Self {
            output_dir: None,
            window: None,
            ..self.clone()
        }
    }

    /// Apply a preset, keeping this machine's output dir and window geometry.
    pub fn apply_preset(&mut self, name: &str, preset: &Preferences) {
        *self = Self {
            output_dir: self.output_dir.take(),
            window: self.window.take(),
            preset: name.to_string(),
            ..preset.clone()
        };
    }
}

/// Named presets. Always contains [`DEFAULT_PRESET`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Presets(BTreeMap<String, Preferences>);

impl Default for Presets {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        map.insert(DEFAULT_PRESET.to_string(), Preferences::default());
        Self(map)
    }
}

impl Presets {
    /// Look a preset up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Preferences> {
        self.0.get(name)
    }

    /// Preset names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Store `prefs` under `name`, replacing any existing preset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for a blank name.
    pub fn save(&mut self, name: &str, prefs: &Preferences) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid("preset", "name must not be empty"));
        }
        self.0.insert(name.to_string(), prefs.as_preset());
        Ok(())
    }

    /// Remove a preset, returning it if it existed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] when asked to delete [`DEFAULT_PRESET`].
    pub fn delete(&mut self, name: &str) -> Result<Option<Preferences>> {
        if name == DEFAULT_PRESET {
            return Err(Error::invalid("preset", "the Default preset cannot be deleted"));
        }
        Ok(self.0.remove(name))
    }

    fn ensure_default(&mut self) {
        self.0
            .entry(DEFAULT_PRESET.to_string())
            .or_insert_with(Preferences::default);
    }
}

/// Directory holding the session and presets documents.
#[derive(Debug, Clone)]
pub struct PreferencesStore {
    dir: PathBuf,
}

impl PreferencesStore {
    /// A store rooted at `dir` (created on first save).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The platform config directory plus `sticker-studio`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the platform has no config directory.
    pub fn default_location() -> Result<Self> {
        let base = dirs::config_dir().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine the config directory",
            )
        })?;
        Ok(Self::new(base.join("sticker-studio")))
    }

    /// The store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load the last session, or defaults.
    #[must_use]
    pub fn load_session(&self) -> Preferences {
        self.load_or_default(SESSION_FILE)
    }

    /// Persist the current session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] or [`Error::Preferences`] when writing fails.
    pub fn save_session(&self, prefs: &Preferences) -> Result<()> {
        self.write(SESSION_FILE, prefs)
    }

    /// Load the presets, or just the built-in default.
    #[must_use]
    pub fn load_presets(&self) -> Presets {
        let mut presets: Presets = self.load_or_default(PRESETS_FILE);
        presets.ensure_default();
        presets
    }

    /// Persist the presets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] or [`Error::Preferences`] when writing fails.
    pub fn save_presets(&self, presets: &Presets) -> Result<()> {
        self.write(PRESETS_FILE, presets)
    }

    fn load_or_default<T: DeserializeOwned + Default>(&self, file: &str) -> T {
        let path = self.dir.join(file);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no saved file, using defaults");
                return T::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read, using defaults");
                return T::default();
            }
        };
        serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "corrupt file, using defaults");
            T::default()
        })
    }

    fn write<T: Serialize>(&self, file: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file);
        let text = serde_json::to_string_pretty(value)?;
        fs::write(&path, text)?;
        info!(path = %path.display(), "saved");
        Ok(())
    }
}
