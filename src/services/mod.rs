//! Storage-backed access-control operations. Handlers in `routes` call into
//! these; uniqueness is enforced by the schema's unique indexes and mapped to
//! domain errors here.

pub mod permissions;
pub mod roles;
pub mod seed;
pub mod staff;

use std::collections::HashSet;

use uuid::Uuid;

/// Drops repeated ids, keeping the first occurrence's position.
pub(crate) fn dedup_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
