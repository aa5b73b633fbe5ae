//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. A stock
/// reservation is one: two reservations with the same id, item, order and
/// quantity describe the same commitment.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
