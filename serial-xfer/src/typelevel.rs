//! Type-level helpers

/// Restricts a public trait to the implementations provided by this crate.
pub trait Sealed {}
