//! Application snapshot store and reconciler.
//!
//! The snapshot is a positional cursor over the most recent `/apps` listing.
//! Selection is 1-based; `0` means "nothing selected" and is only possible
//! while the listing is empty.
//!
//! Reconciliation does not track apps by identity.  When the listing shrinks
//! the cursor goes back to the first entry; otherwise it stays at the same
//! position even if a different app now lives there.

use crate::protocol::AppEntry;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("selection {index} is out of range (1..={len})")]
    OutOfRange { index: usize, len: usize },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    apps: Vec<AppEntry>,
    selected: usize,
}

impl Snapshot {
    /// Build a snapshot directly.  `selected` is clamped the same way a
    /// reconciliation would clamp it.
    pub fn new(apps: Vec<AppEntry>, selected: usize) -> Self {
        let selected = clamp_selection(selected, apps.len());
        Self { apps, selected }
    }

    /// Current listing and 1-based selection.
    pub fn current(&self) -> (&[AppEntry], Option<usize>) {
        (&self.apps, self.selected())
    }

    pub fn apps(&self) -> &[AppEntry] {
        &self.apps
    }

    pub fn selected(&self) -> Option<usize> {
        (self.selected != 0).then_some(self.selected)
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    pub fn select(&mut self, index: usize) -> Result<(), StoreError> {
        if index == 0 || index > self.apps.len() {
            return Err(StoreError::OutOfRange {
                index,
                len: self.apps.len(),
            });
        }
        self.selected = index;
        Ok(())
    }

    pub fn active_app(&self) -> Option<&AppEntry> {
        self.selected.checked_sub(1).and_then(|i| self.apps.get(i))
    }

    pub fn active_app_mut(&mut self) -> Option<&mut AppEntry> {
        self.selected.checked_sub(1).and_then(|i| self.apps.get_mut(i))
    }

    /// Advance the cursor by one, wrapping from the last entry to the first.
    /// Returns the new selection, or `None` when there is nothing to select.
    pub fn rotate_next(&mut self) -> Option<usize> {
        let len = self.apps.len();
        if len == 0 {
            return None;
        }
        let next = if self.selected >= len { 1 } else { self.selected + 1 };
        self.selected = next;
        Some(next)
    }
}

/// Merge a fresh listing into `old`, producing the next snapshot.
pub fn reconcile(old: &Snapshot, fresh: Vec<AppEntry>) -> Snapshot {
    let mut selected = old.selected;
    if fresh.len() < old.apps.len() {
        selected = 1;
    }
    let selected = clamp_selection(selected, fresh.len());

    if selected != old.selected || fresh.len() != old.apps.len() {
        debug!(
            "reconcile: {} → {} apps, selection {} → {}",
            old.apps.len(),
            fresh.len(),
            old.selected,
            selected
        );
    }

    Snapshot {
        apps: fresh,
        selected,
    }
}

fn clamp_selection(selected: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else if selected < 1 || selected > len {
        1
    } else {
        selected
    }
}

/// Orders overlapping `/apps` fetches.
///
/// Every fetch is stamped with `issue()`; when it resolves, `accept()` says
/// whether its result may be applied.  A result older than one already
/// applied is rejected, so a slow response can't overwrite newer data.
#[derive(Debug, Default, Clone)]
pub struct FetchGenerations {
    issued: u64,
    applied: u64,
}

impl FetchGenerations {
    pub fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    pub fn accept(&mut self, generation: u64) -> bool {
        if generation <= self.applied {
            return false;
        }
        self.applied = generation;
        true
    }

    pub fn latest_applied(&self) -> u64 {
        self.applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apps(names: &[&str]) -> Vec<AppEntry> {
        names.iter().map(|n| AppEntry::new(*n, 0.5)).collect()
    }

    #[test]
    fn test_empty_store() {
        let snap = Snapshot::default();
        assert_eq!(snap.selected(), None);
        assert!(snap.active_app().is_none());
        assert_eq!(snap.current().0.len(), 0);
    }

    #[test]
    fn test_first_listing_selects_first_entry() {
        let snap = reconcile(&Snapshot::default(), apps(&["a", "b"]));
        assert_eq!(snap.selected(), Some(1));
        assert_eq!(snap.active_app().map(|a| a.name.as_str()), Some("a"));
    }

    #[test]
    fn test_select_validates_range() {
        let mut snap = Snapshot::new(apps(&["a", "b"]), 1);
        assert_eq!(
            snap.select(3),
            Err(StoreError::OutOfRange { index: 3, len: 2 })
        );
        assert!(snap.select(0).is_err());
        assert_eq!(snap.selected(), Some(1));
        snap.select(2).unwrap();
        assert_eq!(snap.active_app().map(|a| a.name.as_str()), Some("b"));
    }

    #[test]
    fn test_shrink_resets_selection() {
        let old = Snapshot::new(apps(&["a", "b", "c"]), 3);
        let snap = reconcile(&old, apps(&["c", "b"]));
        assert_eq!(snap.selected(), Some(1));
        assert_eq!(snap.active_app().map(|a| a.name.as_str()), Some("c"));
    }

    #[test]
    fn test_shrink_to_empty_clears_selection() {
        let old = Snapshot::new(apps(&["a", "b"]), 2);
        let snap = reconcile(&old, Vec::new());
        assert_eq!(snap.selected(), None);
        assert!(snap.active_app().is_none());
    }

    #[test]
    fn test_growth_keeps_position_not_identity() {
        let old = Snapshot::new(apps(&["a", "b"]), 2);
        let snap = reconcile(&old, apps(&["x", "a", "b"]));
        assert_eq!(snap.selected(), Some(2));
        // The cursor is positional: it now points at "a".
        assert_eq!(snap.active_app().map(|a| a.name.as_str()), Some("a"));
    }

    #[test]
    fn test_rotate_wraps() {
        let mut snap = Snapshot::new(apps(&["a", "b", "c"]), 3);
        assert_eq!(snap.rotate_next(), Some(1));
        assert_eq!(snap.rotate_next(), Some(2));

        let mut empty = Snapshot::default();
        assert_eq!(empty.rotate_next(), None);
        assert_eq!(empty.selected(), None);
    }

    #[test]
    fn test_active_app_mut_edits_in_place() {
        let mut snap = Snapshot::new(apps(&["a", "b"]), 2);
        if let Some(app) = snap.active_app_mut() {
            app.mute = true;
        }
        assert!(snap.apps()[1].mute);
        assert!(!snap.apps()[0].mute);
    }

    #[test]
    fn test_generations_reject_stale() {
        let mut gens = FetchGenerations::default();
        let periodic = gens.issue();
        let on_demand = gens.issue();

        assert!(gens.accept(on_demand));
        assert!(!gens.accept(periodic));
        assert_eq!(gens.latest_applied(), on_demand);

        let next = gens.issue();
        assert!(gens.accept(next));
        assert!(!gens.accept(next));
        assert_eq!(next, 3);
    }
}
