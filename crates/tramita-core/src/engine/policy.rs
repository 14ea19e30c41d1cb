//! Authorization policy for stage transitions.
//!
//! Kept as a free function so it stays unit-testable in isolation and
//! is invoked before any mutation.

use tramita_types::{Actor, SectorId};

/// An actor may act on a stage execution when they belong to the sector
/// captured on that execution, or when they hold an override role.
pub fn is_authorized(actor: &Actor, sector_id: &SectorId) -> bool {
    if actor.has_sector_override() {
        return true;
    }

    actor.sector_id.as_ref() == Some(sector_id)
}
