//! Per-key differences between two orderings.

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeKind {
    Remove,
    Add,
    Move,
}

/// How one distinct key differs between the current and desired order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change<K> {
    pub key: K,
    pub old_index: Option<usize>,
    pub new_index: Option<usize>,
}

impl<K> Change<K> {
    /// `None` when the key sits at the same index in both orders.
    pub fn new(key: K, old_index: Option<usize>, new_index: Option<usize>) -> Option<Self> {
        if old_index == new_index {
            return None;
        }
        Some(Self {
            key,
            old_index,
            new_index,
        })
    }

    pub fn kind(&self) -> ChangeKind {
        match (self.old_index, self.new_index) {
            (Some(_), None) => ChangeKind::Remove,
            (None, Some(_)) => ChangeKind::Add,
            _ => ChangeKind::Move,
        }
    }

    /// Removes by old index, then adds by new index, then moves by new index.
    pub fn structural_cmp(&self, other: &Self) -> Ordering {
        let rank = |c: &Self| match c.kind() {
            ChangeKind::Remove => (ChangeKind::Remove, c.old_index),
            kind => (kind, c.new_index),
        };
        rank(self).cmp(&rank(other))
    }
}
