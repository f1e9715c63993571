//! Identity and content equality for sections, items and supplementaries.
//!
//! Identity is the only key used to match entities across two snapshots. It
//! is independent of position and of content. Content equality is a separate
//! question that is only asked about entities that already matched by
//! identity, to decide whether they should be flagged as changed.

use std::any::Any;
use std::fmt;
use std::hash::Hash;

use crate::collections::hash_one;

/// Opaque, hashable key supplied by the author of a section or item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(u64);

impl Identity {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Derives an identity by hashing any hashable key.
    #[inline]
    pub fn of<K: Hash + ?Sized>(key: &K) -> Self {
        Self(hash_one(key))
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:016x}", self.0)
    }
}

/// Capability every item and supplementary payload implements.
///
/// `content_eq` defaults to comparing identities, which means "matched
/// entities never change". Override it to compare payload fields when a
/// matched row should be reloaded after its data changes.
pub trait Identifiable: 'static {
    fn identity(&self) -> Identity;

    fn content_eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

/// Type-erased view over an [`Identifiable`] payload.
///
/// Payloads of different concrete types are never content-equal.
pub(crate) trait ErasedContent {
    fn identity(&self) -> Identity;
    fn content_eq_erased(&self, other: &dyn ErasedContent) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Identifiable> ErasedContent for T {
    fn identity(&self) -> Identity {
        Identifiable::identity(self)
    }

    fn content_eq_erased(&self, other: &dyn ErasedContent) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |other| self.content_eq(other))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Convenience payload pairing an identity with a comparable value.
///
/// Content equality compares `value`, so a `Keyed` row is reported as
/// mutated whenever its value changes under a stable key.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyed<T> {
    identity: Identity,
    value: T,
}

impl<T> Keyed<T> {
    pub fn new<K: Hash + ?Sized>(key: &K, value: T) -> Self {
        Self {
            identity: Identity::of(key),
            value,
        }
    }

    pub fn with_identity(identity: Identity, value: T) -> Self {
        Self { identity, value }
    }

    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T: PartialEq + 'static> Identifiable for Keyed<T> {
    fn identity(&self) -> Identity {
        self.identity
    }

    fn content_eq(&self, other: &Self) -> bool {
        self.identity == other.identity && self.value == other.value
    }
}
