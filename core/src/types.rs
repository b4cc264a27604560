//! Shared primitive types used across the desk.

/// A stable, unique identifier for any persisted entity.
pub type EntityId = String;

/// Technician points. Signed: manual corrections may leave a deficit.
pub type Points = i64;

/// Currency amount in the shop's base unit.
pub type Money = f64;
