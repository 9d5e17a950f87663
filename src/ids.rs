//! Identity types and the [`IdGenerator`] abstraction.
//!
//! UUID generation is named as an external collaborator rather than baked
//! into the engine, so the engine never calls `Uuid::now_v7()` inline.
//! Instead every new entity's `ID` is minted through an injected
//! [`IdGenerator`], the same way [`crate::time::Clock`] is injected — tests
//! want deterministic, reproducible values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Globally unique identifier assigned by the engine to every entity.
///
/// Backed by a version-7 UUID (monotonic-ish, timestamp-ordered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(pub uuid::Uuid);

impl Id {
    pub fn nil() -> Self {
        Id(uuid::Uuid::nil())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user-supplied cross-reference key, also a v7 UUID. Unlike [`Id`], a
/// `Key` is optional and chosen by the caller constructing a Plan, not by
/// the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(pub uuid::Uuid);

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mints new [`Id`] values.
///
/// Injected into [`crate::workstream::Workstream`] at construction, exactly
/// like [`crate::time::Clock`] — concrete generation strategy (v7 UUIDs from
/// the system's random source, a counter in tests, etc.) is the caller's
/// choice.
pub trait IdGenerator: Send + Sync {
    /// Mint a fresh, globally unique [`Id`].
    fn new_id(&self) -> Id;
}

/// The default [`IdGenerator`], backed by `uuid::Uuid::now_v7`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV7Generator;

impl IdGenerator for UuidV7Generator {
    fn new_id(&self) -> Id {
        Id(uuid::Uuid::now_v7())
    }
}

/// A deterministic [`IdGenerator`] for tests: hands out `1, 2, 3, ...`
/// encoded into the low bits of a nil UUID, in submission order.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    next: std::sync::atomic::AtomicU64,
}

impl IdGenerator for SequentialIdGenerator {
    fn new_id(&self) -> Id {
        let n = self.next.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Id(uuid::Uuid::from_u128(n as u128 + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_v7_generator_produces_unique_ids() {
        let gen = UuidV7Generator;
        let a = gen.new_id();
        let b = gen.new_id();
        assert_ne!(a, b);
        assert_eq!(a.0.get_version_num(), 7);
    }

    #[test]
    fn sequential_generator_is_deterministic_and_increasing() {
        let gen = SequentialIdGenerator::default();
        let a = gen.new_id();
        let b = gen.new_id();
        let c = gen.new_id();
        assert!(a.0.as_u128() < b.0.as_u128());
        assert!(b.0.as_u128() < c.0.as_u128());
    }

    #[test]
    fn id_display_matches_uuid_display() {
        let u = uuid::Uuid::now_v7();
        let id = Id(u);
        assert_eq!(id.to_string(), u.to_string());
    }
}
