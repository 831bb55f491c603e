//! Boolean combinators over specifications.
//!
//! `And` and `Or` always evaluate both operands, left first. A short-circuit
//! would skip the right operand, and operands are allowed to observe that they
//! were consulted.

use crate::specification::Specification;

/// Satisfied when both operands are satisfied.
#[derive(Debug, Clone)]
pub struct And<L, R> {
  left: L,
  right: R,
}

impl<L, R> And<L, R> {
  pub fn new(left: L, right: R) -> Self {
    Self { left, right }
  }

  pub fn left(&self) -> &L {
    &self.left
  }

  pub fn right(&self) -> &R {
    &self.right
  }
}

impl<T, L, R> Specification<T> for And<L, R>
where
  T: ?Sized,
  L: Specification<T>,
  R: Specification<T>,
{
  fn is_satisfied_by(&self, target: &T) -> bool {
    let left = self.left.is_satisfied_by(target);
    let right = self.right.is_satisfied_by(target);
    left && right
  }
}

/// Satisfied when at least one operand is satisfied.
#[derive(Debug, Clone)]
pub struct Or<L, R> {
  left: L,
  right: R,
}

impl<L, R> Or<L, R> {
  pub fn new(left: L, right: R) -> Self {
    Self { left, right }
  }

  pub fn left(&self) -> &L {
    &self.left
  }

  pub fn right(&self) -> &R {
    &self.right
  }
}

impl<T, L, R> Specification<T> for Or<L, R>
where
  T: ?Sized,
  L: Specification<T>,
  R: Specification<T>,
{
  fn is_satisfied_by(&self, target: &T) -> bool {
    let left = self.left.is_satisfied_by(target);
    let right = self.right.is_satisfied_by(target);
    left || right
  }
}

/// Negates the wrapped specification.
#[derive(Debug, Clone)]
pub struct Not<S> {
  inner: S,
}

impl<S> Not<S> {
  pub fn new(inner: S) -> Self {
    Self { inner }
  }

  pub fn inner(&self) -> &S {
    &self.inner
  }
}

impl<T, S> Specification<T> for Not<S>
where
  T: ?Sized,
  S: Specification<T>,
{
  fn is_satisfied_by(&self, target: &T) -> bool {
    !self.inner.is_satisfied_by(target)
  }
}
