use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort the placement work of a single symbolizer.
///
/// Search exhaustion and geometric edge cases are not errors: they surface as
/// `Ok(None)` / empty results.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Unable to find specified font face '{0}'")]
    MissingFontFace(String),

    #[error("Unable to find any fontset named '{0}'")]
    UnknownFontset(String),

    #[error("Can't have both face-name and fontset-name")]
    ConflictingFontSpec,

    #[error("Must have face-name or fontset-name")]
    NoFontSpec,

    #[error("invalid expression '{input}': {reason}")]
    Expression { input: String, reason: String },

    #[error("scale factor must be positive and finite, got {0}")]
    InvalidScaleFactor(f64),

    #[error("metrics provider returned {actual} entries for {expected} characters")]
    MetricsMismatch { expected: usize, actual: usize },
}
