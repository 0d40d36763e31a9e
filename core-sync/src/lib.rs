//! # Edit & Sync Module
//!
//! Records local edits to ordered collections and replays them against the
//! remote service.
//!
//! ## Overview
//!
//! This module manages:
//! - Reversible collection edits and their remote replay ([`edit`], [`edits`])
//! - The undo/redo journal with dirty bookkeeping ([`log`])
//! - Batched pushing with cooldown, partial progress and cancellation ([`session`])
//! - Turning a desired order into a minimal edit script ([`reconcile`])
//!
//! ## Components
//!
//! - **Edits** (`edits`): Insert, remove and move entries of a playlist or saved collection
//! - **Edit Log** (`log`): Commit, undo, redo; marks targets dirty while they differ from storage
//! - **Push Session** (`session`): Replays the log through a [`RemoteClient`](bridge_traits::RemoteClient)
//! - **Reconciler** (`reconcile`): Plans removals, additions and block moves

pub mod edit;
pub mod edits;
pub mod error;
pub mod log;
pub mod reconcile;
pub mod session;

pub use edit::{Edit, EditableCollection, RemoteOp};
pub use edits::{InsertEntries, MoveEntries, RemoveEntries};
pub use error::{Result, SyncError};
pub use log::{EditLog, PendingPush};
pub use reconcile::{ReconcilePlan, Reconciler};
pub use session::{push_all, Workspace};
