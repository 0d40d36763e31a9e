//! # Push Session
//!
//! The store and the edit log share one lock. [`push_all`] replays the log
//! against the remote service, taking the lock only around the in-memory
//! steps of each edit: the network call and the cooldown sleep run unlocked.
//!
//! On failure or cancellation every edit pushed so far stays retired, so the
//! next call resumes from the first edit that was not pushed.

use bridge_traits::remote::{ProgressSink, RemoteClient};
use core_library::ResourceStore;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::log::EditLog;

/// The single-writer boundary: the store and the log that edits it.
pub struct Workspace {
    pub store: ResourceStore,
    pub edits: EditLog,
}

impl Workspace {
    pub fn new(store: ResourceStore) -> Self {
        Self {
            store,
            edits: EditLog::new(),
        }
    }
}

/// Push every applied edit, oldest first, sleeping `cooldown` between calls.
/// Returns the number of edits pushed.
///
/// `item_progress` is handed to the client for each call; `edit_progress`
/// receives the count of edits done out of the edits pending at the start.
///
/// # Errors
///
/// - [`SyncError::Communication`] when a call fails
/// - [`SyncError::Interrupted`] when `cancel` fires between calls
///
/// Both carry the number of edits pushed before stopping.
#[instrument(skip_all, fields(cooldown_ms = cooldown.as_millis() as u64))]
pub async fn push_all(
    workspace: &Mutex<Workspace>,
    client: &dyn RemoteClient,
    cooldown: Duration,
    cancel: &CancellationToken,
    item_progress: &dyn ProgressSink,
    edit_progress: &dyn ProgressSink,
) -> Result<usize> {
    let total = workspace.lock().await.edits.pending();
    let mut pushed = 0;

    loop {
        if cancel.is_cancelled() {
            info!(pushed, "Push interrupted");
            return Err(SyncError::Interrupted { pushed });
        }

        if pushed > 0 && !cooldown.is_zero() {
            if !workspace.lock().await.edits.has_changes() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(pushed, "Push interrupted during cooldown");
                    return Err(SyncError::Interrupted { pushed });
                }
                _ = tokio::time::sleep(cooldown) => {}
            }
        }

        let next = workspace.lock().await.edits.next_push();
        let Some(push) = next else {
            break;
        };

        debug!(seq = push.seq, edit = %push.description, "Pushing edit");
        let receipt = match push.op.send(client, item_progress).await {
            Ok(receipt) => receipt,
            Err(source) => {
                warn!(error = %source, edit = %push.description, pushed, "Push failed");
                return Err(SyncError::Communication { pushed, source });
            }
        };

        let retired = {
            let mut guard = workspace.lock().await;
            let Workspace { store, edits } = &mut *guard;
            edits.acknowledge_push(push.seq, &receipt, store)
        };
        if !retired {
            warn!(seq = push.seq, edit = %push.description, "Pushed edit was undone meanwhile");
            continue;
        }

        pushed += 1;
        edit_progress.report(pushed, total.max(pushed));
    }

    if pushed > 0 {
        info!(pushed, "Pushed edits");
    }
    Ok(pushed)
}
