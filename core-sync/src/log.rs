//! # Edit Log
//!
//! Ordered undo/redo journal of committed edits that have not been pushed yet.
//!
//! ## Layout
//!
//! Entries run from the oldest unpushed edit (the front) to the newest. The
//! first `applied` entries are applied; the rest form the redo tail. A new
//! commit discards the redo tail.
//!
//! ## Dirty counting
//!
//! Per target, the log counts how far the in-memory contents have walked away
//! from what the store last flushed. The count is relative to the store's
//! flush epoch and restarts at zero after every flush. Each entry remembers
//! the epoch of its last apply or revert: a step that reverses something done
//! in the current epoch walks back (count down), any other step walks away
//! (count up). The target is marked dirty when the count leaves zero and
//! unmarked when it returns to zero.

use bridge_traits::remote::PushReceipt;
use core_library::models::ResourceId;
use core_library::ResourceStore;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::edit::{Edit, RemoteOp};

struct LogEntry {
    edit: Box<dyn Edit>,
    /// Flush epoch of the last apply or revert
    stamp: u64,
    seq: u64,
}

/// A push handed out by [`EditLog::next_push`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPush {
    pub seq: u64,
    pub op: RemoteOp,
    pub description: String,
}

#[derive(Default)]
pub struct EditLog {
    entries: VecDeque<LogEntry>,
    applied: usize,
    counts: HashMap<ResourceId, (u64, usize)>,
    next_seq: u64,
}

fn count_for(counts: &mut HashMap<ResourceId, (u64, usize)>, target: ResourceId, epoch: u64) -> &mut usize {
    let slot = counts.entry(target).or_insert((epoch, 0));
    if slot.0 != epoch {
        *slot = (epoch, 0);
    }
    &mut slot.1
}

impl EditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `edit` and append it after the undo cursor.
    pub fn commit(&mut self, mut edit: Box<dyn Edit>, store: &mut ResourceStore) {
        self.discard_redo();

        edit.commit();
        let epoch = store.flush_epoch();
        let count = count_for(&mut self.counts, edit.target(), epoch);
        *count += 1;
        if *count == 1 {
            edit.mark(store);
        }

        debug!(edit = %edit, "Committed edit");
        self.entries.push_back(LogEntry {
            edit,
            stamp: epoch,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        self.applied += 1;
    }

    /// Revert the edit at the undo cursor. Returns it, or `None` if there is
    /// nothing to undo.
    pub fn undo(&mut self, store: &mut ResourceStore) -> Option<&dyn Edit> {
        let index = self.applied.checked_sub(1)?;
        let entry = &mut self.entries[index];
        entry.edit.revert();
        Self::step(&mut self.counts, entry, store);
        self.applied = index;

        debug!(edit = %self.entries[index].edit, "Undid edit");
        Some(self.entries[index].edit.as_ref())
    }

    /// Re-apply the edit after the undo cursor.
    pub fn redo(&mut self, store: &mut ResourceStore) -> Option<&dyn Edit> {
        let index = self.applied;
        let entry = self.entries.get_mut(index)?;
        entry.edit.commit();
        Self::step(&mut self.counts, entry, store);
        self.applied = index + 1;

        debug!(edit = %self.entries[index].edit, "Redid edit");
        Some(self.entries[index].edit.as_ref())
    }

    fn step(counts: &mut HashMap<ResourceId, (u64, usize)>, entry: &mut LogEntry, store: &mut ResourceStore) {
        let epoch = store.flush_epoch();
        let count = count_for(counts, entry.edit.target(), epoch);
        if entry.stamp == epoch && *count > 0 {
            *count -= 1;
            if *count == 0 {
                entry.edit.unmark(store);
            }
        } else {
            *count += 1;
            if *count == 1 {
                entry.edit.mark(store);
            }
        }
        entry.stamp = epoch;
    }

    /// Forget every undone edit.
    pub fn discard_redo(&mut self) {
        let discarded = self.entries.len() - self.applied;
        if discarded > 0 {
            self.entries.truncate(self.applied);
            debug!(discarded, "Discarded redo tail");
        }
    }

    pub fn peek_undo(&self) -> Option<&dyn Edit> {
        let index = self.applied.checked_sub(1)?;
        Some(self.entries[index].edit.as_ref())
    }

    pub fn peek_redo(&self) -> Option<&dyn Edit> {
        self.entries.get(self.applied).map(|e| e.edit.as_ref())
    }

    /// Whether there are applied edits left to push.
    pub fn has_changes(&self) -> bool {
        self.applied > 0
    }

    /// Number of applied edits left to push.
    pub fn pending(&self) -> usize {
        self.applied
    }

    /// Applied edits, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Edit> {
        self.entries
            .iter()
            .take(self.applied)
            .map(|e| e.edit.as_ref())
    }

    /// Drop every edit targeting `target`, applied or not. The undo cursor
    /// moves to the nearest applied edit that survives.
    pub fn abandon_edits_for(&mut self, target: &ResourceId) -> usize {
        let before = self.entries.len();
        let mut applied = 0;
        let mut index = 0;
        self.entries.retain(|entry| {
            let keep = entry.edit.target() != *target;
            if keep && index < self.applied {
                applied += 1;
            }
            index += 1;
            keep
        });
        self.applied = applied;
        self.counts.remove(target);

        let abandoned = before - self.entries.len();
        if abandoned > 0 {
            debug!(%target, abandoned, "Abandoned edits");
        }
        abandoned
    }

    /// The oldest applied edit, ready to push.
    pub fn next_push(&self) -> Option<PendingPush> {
        if self.applied == 0 {
            return None;
        }
        self.entries.front().map(|entry| PendingPush {
            seq: entry.seq,
            op: entry.edit.remote_op(),
            description: entry.edit.to_string(),
        })
    }

    /// Retire the pushed edit `seq` from the front of the log. Returns false,
    /// changing nothing, if it is no longer there to retire.
    pub fn acknowledge_push(&mut self, seq: u64, receipt: &PushReceipt, store: &mut ResourceStore) -> bool {
        let at_front = self.applied > 0 && self.entries.front().map(|e| e.seq) == Some(seq);
        if !at_front {
            debug!(seq, "Pushed edit left the log before it was acknowledged");
            return false;
        }

        if let Some(entry) = self.entries.pop_front() {
            self.applied -= 1;
            entry.edit.on_pushed(receipt, store);
        }
        true
    }
}
