//! Specification errors.

/// Errors that can occur while evaluating a specification.
#[derive(Debug, thiserror::Error)]
pub enum SpecificationError {
  /// The evaluation target was missing.
  #[error("cannot evaluate a specification against a null target")]
  NullTarget,

  /// Deferred evaluation did not run to completion.
  #[error("specification evaluation did not complete: {message}")]
  Evaluation { message: String },
}
