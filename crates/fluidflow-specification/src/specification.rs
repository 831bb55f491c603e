//! The specification trait and leaf specifications.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::combinators::{And, Not, Or};
use crate::error::SpecificationError;

/// A boolean predicate over a value of type `T`.
///
/// Implementations must be deterministic and side-effect free.
pub trait Specification<T: ?Sized>: Send + Sync {
  /// Returns `true` if `target` satisfies this specification.
  fn is_satisfied_by(&self, target: &T) -> bool;

  /// Evaluate against a target that may be missing.
  ///
  /// A missing target is rejected before any predicate is invoked.
  fn evaluate(&self, target: Option<&T>) -> Result<bool, SpecificationError> {
    let target = target.ok_or(SpecificationError::NullTarget)?;
    Ok(self.is_satisfied_by(target))
  }
}

impl<T: ?Sized, S: Specification<T> + ?Sized> Specification<T> for Arc<S> {
  fn is_satisfied_by(&self, target: &T) -> bool {
    (**self).is_satisfied_by(target)
  }
}

impl<T: ?Sized, S: Specification<T> + ?Sized> Specification<T> for Box<S> {
  fn is_satisfied_by(&self, target: &T) -> bool {
    (**self).is_satisfied_by(target)
  }
}

impl<T: ?Sized, S: Specification<T> + ?Sized> Specification<T> for &S {
  fn is_satisfied_by(&self, target: &T) -> bool {
    (**self).is_satisfied_by(target)
  }
}

/// Combinator methods available on every specification.
pub trait SpecificationExt<T: ?Sized>: Specification<T> + Sized {
  /// Satisfied when both `self` and `other` are satisfied.
  fn and<R: Specification<T>>(self, other: R) -> And<Self, R> {
    And::new(self, other)
  }

  /// Satisfied when either `self` or `other` is satisfied.
  fn or<R: Specification<T>>(self, other: R) -> Or<Self, R> {
    Or::new(self, other)
  }

  /// Satisfied when `self` is not.
  fn not(self) -> Not<Self> {
    Not::new(self)
  }
}

impl<T: ?Sized, S: Specification<T>> SpecificationExt<T> for S {}

/// A specification backed by a predicate closure.
pub struct FnSpecification<T: ?Sized, F> {
  predicate: F,
  _target: PhantomData<fn(&T)>,
}

impl<T: ?Sized, F> FnSpecification<T, F>
where
  F: Fn(&T) -> bool + Send + Sync,
{
  /// Wrap a predicate.
  pub fn new(predicate: F) -> Self {
    Self {
      predicate,
      _target: PhantomData,
    }
  }
}

impl<T: ?Sized, F> Specification<T> for FnSpecification<T, F>
where
  F: Fn(&T) -> bool + Send + Sync,
{
  fn is_satisfied_by(&self, target: &T) -> bool {
    (self.predicate)(target)
  }
}

/// A specification that every target satisfies.
pub struct Always<T: ?Sized>(PhantomData<fn(&T)>);

impl<T: ?Sized> Always<T> {
  pub fn new() -> Self {
    Self(PhantomData)
  }
}

impl<T: ?Sized> Default for Always<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: ?Sized> Specification<T> for Always<T> {
  fn is_satisfied_by(&self, _target: &T) -> bool {
    true
  }
}

/// A specification that no target satisfies.
pub struct Never<T: ?Sized>(PhantomData<fn(&T)>);

impl<T: ?Sized> Never<T> {
  pub fn new() -> Self {
    Self(PhantomData)
  }
}

impl<T: ?Sized> Default for Never<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: ?Sized> Specification<T> for Never<T> {
  fn is_satisfied_by(&self, _target: &T) -> bool {
    false
  }
}

/// Evaluate a specification on the blocking worker pool.
///
/// Semantics are identical to [`Specification::evaluate`]; only the execution
/// context differs.
pub async fn evaluate_async<T, S>(
  specification: Arc<S>,
  target: Option<T>,
) -> Result<bool, SpecificationError>
where
  T: Send + 'static,
  S: Specification<T> + ?Sized + 'static,
{
  let target = target.ok_or(SpecificationError::NullTarget)?;
  tokio::task::spawn_blocking(move || specification.is_satisfied_by(&target))
    .await
    .map_err(|e| SpecificationError::Evaluation {
      message: e.to_string(),
    })
}
