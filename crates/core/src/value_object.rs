//! Values compared by content.

/// Marker for immutable values with structural equality.
///
/// Normalised e-mail addresses, role sets and finalised session claims are
/// values: replace them, never patch them.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
