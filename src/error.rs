//! Error types returned by [`crate::run`].

/// Possible errors that may occur while validating inputs or configuration.
///
/// All errors are surfaced during the validation pass that runs before any
/// compute begins; the core itself has no recoverable faults once a run
/// starts (see the crate's error handling design notes).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchMatchError {
    /// The left/right images and/or DSIs disagree on height, width, or
    /// disparity count.
    #[error("shape mismatch: {reason}")]
    ShapeMismatch {
        /// Human-readable description of which dimensions disagreed.
        reason: String,
    },
    /// A configuration value is out of its valid range.
    #[error("invalid configuration: {reason}")]
    ConfigInvalid {
        /// Human-readable description of the invalid field.
        reason: String,
    },
    /// A weight or cost evaluated to a non-finite value during setup.
    ///
    /// Unreachable under documented inputs (finite 8-bit images, finite
    /// positive gammas); kept as a fatal diagnostic rather than silently
    /// propagating `NaN` into the optimizer.
    #[error("numeric overflow: {reason}")]
    NumericOverflow {
        /// Human-readable description of where the non-finite value arose.
        reason: String,
    },
}
