//! # Sequence Reconciliation
//!
//! Computes the edit script that turns a collection's current order into a
//! desired order, and commits it through the [`EditLog`].
//!
//! ## Edit script
//!
//! A plan is applied in three phases, each in increasing structural order:
//!
//! 1. **Removal** - every key missing from the desired order, in one edit
//! 2. **Additions** - one insert per run of consecutive desired indices
//! 3. **Moves** - one move per run of keys that are adjacent in both orders
//!
//! Moves are derived from an [`OffsetTracker`] seeded with every key's
//! position after phases 1 and 2. Walking the desired order front to back,
//! the key due at position `k` is found at or after `k`; if it is elsewhere,
//! the longest block that travels with it is moved into place and the tracker
//! is updated before continuing.
//!
//! Collections whose order the service does not keep (liked songs, saved
//! albums) get no moves: desired keys that are new are appended instead.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let reconciler = Reconciler::from_config(&config);
//! let edits = reconciler.reconcile(&playlist, &desired, &mut store, &mut log, &clock)?;
//! ```

pub mod change;
pub mod offset;

pub use change::{Change, ChangeKind};
pub use offset::OffsetTracker;

use bridge_traits::time::Clock;
use core_library::{Handle, ResourceStore};
use core_runtime::config::CoreConfig;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use tracing::{debug, info, instrument};

use crate::edit::{Edit, EditableCollection};
use crate::edits::{InsertEntries, MoveEntries, RemoveEntries};
use crate::error::{Result, SyncError};
use crate::log::EditLog;

/// Indices to remove from the current order, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub indices: Vec<usize>,
    /// The indices form one contiguous range.
    pub sequential: bool,
}

/// A block inserted at one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Addition<K> {
    pub index: usize,
    pub keys: Vec<K>,
}

/// Move `range_length` items from `range_start` to sit before the item at
/// `insert_before`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub insert_before: usize,
    pub range_start: usize,
    pub range_length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan<K> {
    pub removal: Option<Removal>,
    pub additions: Vec<Addition<K>>,
    pub moves: Vec<Move>,
}

impl<K> Default for ReconcilePlan<K> {
    fn default() -> Self {
        Self {
            removal: None,
            additions: Vec::new(),
            moves: Vec::new(),
        }
    }
}

impl<K: Clone> ReconcilePlan<K> {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of edits the plan commits.
    pub fn len(&self) -> usize {
        usize::from(self.removal.is_some()) + self.additions.len() + self.moves.len()
    }

    /// Run the plan against a plain list.
    pub fn apply_to(&self, items: &mut Vec<K>) {
        if let Some(removal) = &self.removal {
            for &i in removal.indices.iter().rev() {
                items.remove(i);
            }
        }

        for addition in &self.additions {
            let tail = items.split_off(addition.index);
            items.extend(addition.keys.iter().cloned());
            items.extend(tail);
        }

        for m in &self.moves {
            let n = m.range_length;
            if m.insert_before > m.range_start {
                items[m.range_start..m.insert_before].rotate_left(n);
            } else {
                items[m.insert_before..m.range_start + n].rotate_right(n);
            }
        }
    }
}

fn duplicated(target: &dyn fmt::Display, key: &dyn fmt::Display, list: &str) -> SyncError {
    SyncError::illegal_edit(
        target,
        format!("Element `{}' was duplicated in the {} list", key, list),
    )
}

/// Plans and applies reorderings.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    reject_duplicates: bool,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Reconciler {
    /// With `reject_duplicates`, a key listed twice in either order is an
    /// [`IllegalEdit`](SyncError::IllegalEdit). Otherwise extra copies in the
    /// current order are removed and repeats in the desired order ignored.
    pub fn new(reject_duplicates: bool) -> Self {
        Self { reject_duplicates }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(config.reject_duplicates)
    }

    /// Plan the edits turning `current` into `desired`.
    ///
    /// Either list being empty yields an empty plan.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::IllegalEdit`] naming `target` for a duplicated
    /// key when duplicates are rejected.
    pub fn plan<K>(
        &self,
        target: impl fmt::Display,
        current: &[K],
        desired: &[K],
    ) -> Result<ReconcilePlan<K>>
    where
        K: Clone + Eq + Hash + fmt::Display,
    {
        self.plan_with(target, current, desired, true)
    }

    /// Plan for a collection without a user-defined order: remove what
    /// `desired` lacks and append what it adds, in desired order. Keys kept
    /// by both lists stay where they are.
    ///
    /// # Errors
    ///
    /// Same as [`plan`](Self::plan).
    pub fn plan_membership<K>(
        &self,
        target: impl fmt::Display,
        current: &[K],
        desired: &[K],
    ) -> Result<ReconcilePlan<K>>
    where
        K: Clone + Eq + Hash + fmt::Display,
    {
        self.plan_with(target, current, desired, false)
    }

    fn plan_with<K>(
        &self,
        target: impl fmt::Display,
        current: &[K],
        desired: &[K],
        ordered: bool,
    ) -> Result<ReconcilePlan<K>>
    where
        K: Clone + Eq + Hash + fmt::Display,
    {
        if current.is_empty() || desired.is_empty() {
            return Ok(ReconcilePlan::default());
        }

        let mut old_index: HashMap<&K, usize> = HashMap::with_capacity(current.len());
        let mut extra_copies = Vec::new();
        for (i, key) in current.iter().enumerate() {
            if old_index.contains_key(key) {
                if self.reject_duplicates {
                    return Err(duplicated(&target, key, "original"));
                }
                extra_copies.push(i);
            } else {
                old_index.insert(key, i);
            }
        }

        let mut new_index: HashMap<&K, usize> = HashMap::with_capacity(desired.len());
        let mut order: Vec<&K> = Vec::with_capacity(desired.len());
        for key in desired {
            if new_index.contains_key(key) {
                if self.reject_duplicates {
                    return Err(duplicated(&target, key, "filtered"));
                }
                continue;
            }
            new_index.insert(key, order.len());
            order.push(key);
        }

        let mut changes: Vec<Change<&K>> = current
            .iter()
            .enumerate()
            .filter(|&(i, key)| old_index.get(key) == Some(&i))
            .filter_map(|(i, key)| Change::new(key, Some(i), new_index.get(key).copied()))
            .chain(
                order
                    .iter()
                    .enumerate()
                    .filter(|(_, key)| !old_index.contains_key(*key))
                    .filter_map(|(n, &key)| Change::new(key, None, Some(n))),
            )
            .collect();
        changes.sort_by(Change::structural_cmp);

        // Removal
        let mut removed = vec![false; current.len()];
        let mut indices = extra_copies;
        for change in changes.iter().filter(|c| c.kind() == ChangeKind::Remove) {
            if let Some(i) = change.old_index {
                indices.push(i);
            }
        }
        indices.sort_unstable();
        for &i in &indices {
            removed[i] = true;
        }
        let removal = (!indices.is_empty()).then(|| Removal {
            sequential: indices.windows(2).all(|w| w[1] == w[0] + 1),
            indices,
        });

        // Additions
        let adds: Vec<(&K, usize)> = changes
            .iter()
            .filter(|c| c.kind() == ChangeKind::Add)
            .filter_map(|c| c.new_index.map(|n| (c.key, n)))
            .collect();
        if !ordered {
            let kept = current.len() - removed.iter().filter(|&&gone| gone).count();
            let additions = (!adds.is_empty())
                .then(|| Addition {
                    index: kept,
                    keys: adds.iter().map(|&(key, _)| key.clone()).collect(),
                })
                .into_iter()
                .collect();
            let plan = ReconcilePlan {
                removal,
                additions,
                moves: Vec::new(),
            };
            debug!(changes = changes.len(), edits = plan.len(), "Planned membership change");
            return Ok(plan);
        }

        let mut additions: Vec<Addition<K>> = Vec::new();
        for &(key, n) in &adds {
            match additions.last_mut() {
                Some(run) if run.index + run.keys.len() == n => run.keys.push(key.clone()),
                _ => additions.push(Addition {
                    index: n,
                    keys: vec![key.clone()],
                }),
            }
        }

        // Moves
        let mut tracker = OffsetTracker::new(settled_positions(&removed, &adds));
        let add_slot: HashMap<&K, usize> = adds
            .iter()
            .enumerate()
            .map(|(rank, &(key, _))| (key, current.len() + rank))
            .collect();
        let slots: Vec<usize> = order
            .iter()
            .map(|key| match old_index.get(key) {
                Some(&i) => i,
                None => add_slot[key],
            })
            .collect();

        let mut moves = Vec::new();
        let mut k = 0;
        while k < slots.len() {
            let position = tracker.get(slots[k]);
            if position == k {
                k += 1;
                continue;
            }
            debug_assert!(position > k, "positions before {} are settled", k);

            let mut len = 1;
            while k + len < slots.len() && tracker.get(slots[k + len]) == position + len {
                len += 1;
            }
            moves.push(Move {
                insert_before: k,
                range_start: position,
                range_length: len,
            });
            tracker.relocate(position, len, k);
            k += len;
        }

        let plan = ReconcilePlan {
            removal,
            additions,
            moves,
        };
        debug!(
            changes = changes.len(),
            edits = plan.len(),
            runs = tracker.runs(),
            "Planned reconciliation"
        );
        Ok(plan)
    }

    /// Reorder `collection` to match `desired`, committing one edit per plan
    /// step. Returns the number of edits committed.
    ///
    /// Collections without a user-defined order only gain and lose entries;
    /// see [`plan_membership`](Self::plan_membership).
    ///
    /// Either every edit is committed or none is.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::IllegalEdit`] for duplicates when they are
    /// rejected.
    #[instrument(skip_all, fields(target = %collection.id(), desired = desired.len()))]
    pub fn reconcile<C: EditableCollection>(
        &self,
        collection: &Handle<C>,
        desired: &[Handle<C::Item>],
        store: &mut ResourceStore,
        log: &mut EditLog,
        clock: &dyn Clock,
    ) -> Result<usize> {
        let current: Vec<String> = collection
            .read()
            .entries()
            .iter()
            .map(|e| e.key().to_string())
            .collect();
        let wanted: Vec<String> = desired.iter().map(|h| h.key().to_string()).collect();

        let plan = if C::SUPPORTS_MOVE {
            self.plan(collection.id(), &current, &wanted)?
        } else {
            self.plan_membership(collection.id(), &current, &wanted)?
        };
        if plan.is_empty() {
            debug!("Already in the desired order");
            return Ok(0);
        }

        let handles: HashMap<&str, &Handle<C::Item>> =
            desired.iter().map(|h| (h.key(), h)).collect();
        let mut committed = 0;
        if let Err(e) = commit_plan(&plan, collection, &handles, store, log, clock, &mut committed) {
            for _ in 0..committed {
                log.undo(store);
            }
            log.discard_redo();
            return Err(e);
        }

        info!(edits = committed, "Reconciled collection");
        Ok(committed)
    }
}

/// Position of every current slot after removal and additions, followed by
/// one slot per addition. Removed slots take the position they vacated.
fn settled_positions<K>(removed: &[bool], adds: &[(K, usize)]) -> Vec<usize> {
    let mut values = Vec::with_capacity(removed.len() + adds.len());
    let mut removed_before = 0;
    let mut added_before = 0;
    for (i, &gone) in removed.iter().enumerate() {
        let mut position = i - removed_before + added_before;
        if gone {
            values.push(position);
            removed_before += 1;
            continue;
        }
        while added_before < adds.len() && adds[added_before].1 <= position {
            added_before += 1;
            position += 1;
        }
        values.push(position);
    }
    values.extend(adds.iter().map(|&(_, n)| n));
    values
}

fn commit_plan<C: EditableCollection>(
    plan: &ReconcilePlan<String>,
    collection: &Handle<C>,
    handles: &HashMap<&str, &Handle<C::Item>>,
    store: &mut ResourceStore,
    log: &mut EditLog,
    clock: &dyn Clock,
    committed: &mut usize,
) -> Result<()> {
    let mut commit = |edit: Box<dyn Edit>, store: &mut ResourceStore| {
        log.commit(edit, store);
        *committed += 1;
    };

    if let Some(removal) = &plan.removal {
        let edit = RemoveEntries::new(collection.clone(), removal.indices.clone())?;
        commit(Box::new(edit), store);
    }

    for addition in &plan.additions {
        let resources = addition
            .keys
            .iter()
            .filter_map(|key| handles.get(key.as_str()).copied().cloned())
            .collect();
        let edit = InsertEntries::new(collection.clone(), resources, addition.index, clock.now())?;
        commit(Box::new(edit), store);
    }

    for m in &plan.moves {
        let edit = MoveEntries::new(
            collection.clone(),
            m.insert_before,
            m.range_start,
            m.range_length,
        )?;
        commit(Box::new(edit), store);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(current: &str, desired: &str) -> ReconcilePlan<char> {
        let current: Vec<char> = current.chars().collect();
        let desired: Vec<char> = desired.chars().collect();
        Reconciler::new(true).plan("list", &current, &desired).unwrap()
    }

    fn applied(current: &str, desired: &str) -> String {
        let mut items: Vec<char> = current.chars().collect();
        plan(current, desired).apply_to(&mut items);
        items.into_iter().collect()
    }

    #[test]
    fn test_identical_orders_need_nothing() {
        assert!(plan("ABCD", "ABCD").is_empty());
        assert!(plan("", "ABC").is_empty());
        assert!(plan("ABC", "").is_empty());
    }

    #[test]
    fn test_additions_grouped_by_consecutive_index() {
        let plan = plan("AB", "XAYZB");
        assert_eq!(
            plan.additions,
            vec![
                Addition { index: 0, keys: vec!['X'] },
                Addition { index: 2, keys: vec!['Y', 'Z'] },
            ]
        );
        assert!(plan.moves.is_empty());
    }

    #[test]
    fn test_removal_sequential_flag() {
        let contiguous = plan("ABCDE", "ADE");
        assert_eq!(
            contiguous.removal,
            Some(Removal { indices: vec![1, 2], sequential: true })
        );

        let scattered = plan("ABCDE", "BD");
        assert_eq!(
            scattered.removal,
            Some(Removal { indices: vec![0, 2, 4], sequential: false })
        );
    }

    #[test]
    fn test_block_moves_together() {
        let plan = plan("ABCDEF", "DEFABC");
        assert_eq!(
            plan.moves,
            vec![Move { insert_before: 0, range_start: 3, range_length: 3 }]
        );
    }

    #[test]
    fn test_settled_positions() {
        // A B C D with B removed and E added at 2: A C E D
        let values = settled_positions(&[false, true, false, false], &[('E', 2)]);
        assert_eq!(values, vec![0, 1, 1, 3, 2]);
    }

    #[test]
    fn test_reversal() {
        assert_eq!(applied("ABCDEFGHIJ", "JIHGFEDCBA"), "JIHGFEDCBA");
    }
}
