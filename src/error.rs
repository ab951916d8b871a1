//! Error types for the sticker-studio crate.

/// Errors that can occur while building, editing, or exporting stickers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A parameter was outside its accepted range. Nothing was mutated.
    #[error("invalid {name}: {reason}")]
    InvalidParameter {
        /// Name of the offending parameter.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A mask does not have the same dimensions as its source image.
    #[error("dimension mismatch: expected {}x{}, got {}x{}", expected.0, expected.1, actual.0, actual.1)]
    DimensionMismatch {
        /// Dimensions of the source image.
        expected: (u32, u32),
        /// Dimensions that were supplied.
        actual: (u32, u32),
    },

    /// The segmentation collaborator failed to load or run.
    #[error("segmentation model unavailable: {0}")]
    ModelUnavailable(String),

    /// An I/O error occurred while reading, writing, or deleting files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred while decoding or encoding an image.
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// A preferences or presets document could not be (de)serialized.
    #[error("preferences error: {0}")]
    Preferences(#[from] serde_json::Error),
}

impl Error {
    /// Build an [`Error::InvalidParameter`].
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Reject `value` unless it lies in `[0, 1]`.
pub(crate) fn ensure_unit(name: &'static str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::invalid(name, format!("{value} is outside [0, 1]")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let io_err = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(io_err.to_string().contains("gone"));

        let unsupported = Error::UnsupportedFormat("tiff".to_string());
        assert!(unsupported.to_string().contains("tiff"));

        let mismatch = Error::DimensionMismatch {
            expected: (10, 20),
            actual: (48, 48),
        };
        let msg = mismatch.to_string();
        assert!(msg.contains("10x20"));
        assert!(msg.contains("48x48"));

        let invalid = Error::invalid("threshold", "1.5 is outside [0, 1]");
        assert_eq!(invalid.to_string(), "invalid threshold: 1.5 is outside [0, 1]");
    }

    #[test]
    fn ensure_unit_accepts_bounds_and_rejects_outside() {
        assert!(ensure_unit("x", 0.0).is_ok());
        assert!(ensure_unit("x", 1.0).is_ok());
        assert!(ensure_unit("x", -0.01).is_err());
        assert!(ensure_unit("x", 1.01).is_err());
        assert!(ensure_unit("x", f32::NAN).is_err());
    }
}
