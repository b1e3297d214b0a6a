//! Multi-strategy element resolution
//!
//! A logical UI target is described by a [`LocatorList`]: an ordered list of
//! (strategy, selector) guesses. [`SelectorResolver`] tries them first to last
//! and returns the first that currently exists on the active surface.
//! Resolution never retries; waiting is bounded by [`SelectorResolver::find_one`].

pub mod errors;
pub mod resolver;
pub mod types;

pub use errors::*;
pub use resolver::*;
pub use types::*;
