// Role-set comparison for the role notifier. Pure so the event handler
// stays a thin adapter.

/// Roles that appeared and disappeared between two member snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleChanges {
    pub added: Vec<u64>,
    pub removed: Vec<u64>,
}

impl RoleChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compare a member's role ids before and after an update. Both directions
/// are reported, so a swap produces one added and one removed entry. Output
/// is sorted for deterministic messaging order.
pub fn diff_roles(before: &[u64], after: &[u64]) -> RoleChanges {
    let mut added: Vec<u64> = after
        .iter()
        .filter(|role| !before.contains(role))
        .copied()
        .collect();
    let mut removed: Vec<u64> = before
        .iter()
        .filter(|role| !after.contains(role))
        .copied()
        .collect();

    added.sort_unstable();
    removed.sort_unstable();

    RoleChanges { added, removed }
}
