//! FluidFlow Specification
//!
//! This crate provides composable boolean predicates ("specifications") over a
//! value of type `T`. Workflows use them to decide which branch of a
//! conditional fork runs, based on the result of a previously completed
//! activity.
//!
//! Specifications are pure: evaluation never mutates the specification or the
//! target. Combinators wrap their operands and never modify them.
//!
//! ```ignore
//! use fluidflow_specification::{FnSpecification, Specification, SpecificationExt};
//!
//! let positive = FnSpecification::new(|n: &i64| *n > 0);
//! let even = FnSpecification::new(|n: &i64| n % 2 == 0);
//!
//! let spec = positive.and(even.not());
//! assert!(spec.is_satisfied_by(&3));
//! ```

mod combinators;
mod error;
mod specification;

pub use combinators::{And, Not, Or};
pub use error::SpecificationError;
pub use specification::{
  Always, FnSpecification, Never, Specification, SpecificationExt, evaluate_async,
};
