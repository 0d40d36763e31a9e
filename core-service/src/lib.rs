//! Core service façade and bootstrap helpers.
//!
//! This crate wires a [`CoreConfig`] into one [`LibraryService`]: a resource
//! store and the edit log that changes it, guarded by a single async mutex.
//! Hosts (desktop app, CLI) hold the service and call it from any task; the
//! only long-running call is [`LibraryService::push`], which releases the
//! lock around every network round trip.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::remote::{ProgressSink, RemoteClient};
use bridge_traits::time::{Clock, SystemClock};
use core_library::{Cleanup, Handle, ResourceStore, Stored};
use core_runtime::config::CoreConfig;
use core_runtime::logging::init_logging;
use core_sync::{push_all, EditableCollection, Reconciler, Workspace};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct LibraryService {
    workspace: Arc<Mutex<Workspace>>,
    config: Arc<CoreConfig>,
    clock: Arc<dyn Clock>,
    reconciler: Reconciler,
}

impl LibraryService {
    /// Open the store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(config: CoreConfig) -> Result<Self> {
        let store = ResourceStore::from_config(&config).await?;
        Ok(Self::with_store(config, store, Arc::new(SystemClock)))
    }

    /// Build a service around an already opened store.
    pub fn with_store(config: CoreConfig, store: ResourceStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            workspace: Arc::new(Mutex::new(Workspace::new(store))),
            reconciler: Reconciler::from_config(&config),
            config: Arc::new(config),
            clock,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// The store and edit log, for callers that need several steps under one
    /// lock.
    pub fn workspace(&self) -> Arc<Mutex<Workspace>> {
        Arc::clone(&self.workspace)
    }

    // ---- Reconciliation -----------------------------------------------------

    /// Reorder a playlist to `desired` track keys. Returns the number of
    /// edits committed.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure or a rejected duplicate.
    #[instrument(skip(self, desired), fields(desired = desired.len()))]
    pub async fn reconcile_playlist(&self, playlist_id: &str, desired: &[String]) -> Result<usize> {
        let mut guard = self.workspace.lock().await;
        let playlist = guard.store.playlist(playlist_id).await?;
        self.reconcile(&mut guard, &playlist, desired).await
    }

    /// Bring liked songs in line with `desired` track keys. Liked songs keep
    /// no user-defined order, so only saves and unsaves are committed.
    pub async fn reconcile_liked_songs(&self, desired: &[String]) -> Result<usize> {
        let mut guard = self.workspace.lock().await;
        let liked = guard.store.liked_songs().await?;
        self.reconcile(&mut guard, &liked, desired).await
    }

    /// Bring saved albums in line with `desired` album keys, saving and
    /// unsaving only.
    pub async fn reconcile_saved_albums(&self, desired: &[String]) -> Result<usize> {
        let mut guard = self.workspace.lock().await;
        let saved = guard.store.saved_albums().await?;
        self.reconcile(&mut guard, &saved, desired).await
    }

    async fn reconcile<C>(
        &self,
        workspace: &mut Workspace,
        collection: &Handle<C>,
        desired: &[String],
    ) -> Result<usize>
    where
        C: EditableCollection,
        C::Item: Stored,
    {
        let mut items = Vec::with_capacity(desired.len());
        for key in desired {
            items.push(workspace.store.get_or_create::<C::Item>(key).await?);
        }

        let Workspace { store, edits } = workspace;
        let committed = self
            .reconciler
            .reconcile(collection, &items, store, edits, self.clock.as_ref())?;
        Ok(committed)
    }

    // ---- Edit log -----------------------------------------------------------

    /// Undo the latest edit. Returns its description.
    pub async fn undo(&self) -> Option<String> {
        let mut guard = self.workspace.lock().await;
        let Workspace { store, edits } = &mut *guard;
        edits.undo(store).map(|edit| edit.to_string())
    }

    /// Redo the latest undone edit. Returns its description.
    pub async fn redo(&self) -> Option<String> {
        let mut guard = self.workspace.lock().await;
        let Workspace { store, edits } = &mut *guard;
        edits.redo(store).map(|edit| edit.to_string())
    }

    /// Descriptions of the next undo and redo, for menu state.
    pub async fn undo_redo_labels(&self) -> (Option<String>, Option<String>) {
        let guard = self.workspace.lock().await;
        (
            guard.edits.peek_undo().map(|e| e.to_string()),
            guard.edits.peek_redo().map(|e| e.to_string()),
        )
    }

    pub async fn has_changes(&self) -> bool {
        self.workspace.lock().await.edits.has_changes()
    }

    /// Descriptions of the edits waiting to be pushed, oldest first.
    pub async fn pending_edits(&self) -> Vec<String> {
        let guard = self.workspace.lock().await;
        guard.edits.iter().map(|e| e.to_string()).collect()
    }

    /// Push every pending edit, pausing the configured cooldown between
    /// calls. Returns the number pushed.
    ///
    /// # Errors
    ///
    /// Returns a communication failure or an interruption, either carrying
    /// the number of edits pushed before stopping.
    pub async fn push(
        &self,
        client: &dyn RemoteClient,
        cancel: &CancellationToken,
        item_progress: &dyn ProgressSink,
        edit_progress: &dyn ProgressSink,
    ) -> Result<usize> {
        let pushed = push_all(
            &self.workspace,
            client,
            self.config.push_cooldown,
            cancel,
            item_progress,
            edit_progress,
        )
        .await?;
        Ok(pushed)
    }

    // ---- Store --------------------------------------------------------------

    /// Write every modified resource.
    pub async fn flush(&self) -> Result<()> {
        self.workspace.lock().await.store.flush_all().await?;
        Ok(())
    }

    /// Remove a playlist locally, dropping its unpushed edits.
    #[instrument(skip(self))]
    pub async fn delete_playlist(&self, playlist_id: &str) -> Result<()> {
        let mut guard = self.workspace.lock().await;
        let Workspace { store, edits } = &mut *guard;
        let playlist = store.playlist(playlist_id).await?;
        let abandoned = edits.abandon_edits_for(&playlist.id());
        store.delete_playlist(&playlist).await?;
        info!(abandoned, "Removed playlist");
        Ok(())
    }

    /// Find resources no root collection reaches. Spare any of them with
    /// [`Cleanup::keep`] before passing the result to [`clean`](Self::clean).
    pub async fn cleanup(&self) -> Result<Cleanup> {
        let mut guard = self.workspace.lock().await;
        Ok(Cleanup::new(&mut guard.store).await?)
    }

    /// Delete what `cleanup` still holds. Returns the number deleted.
    pub async fn clean(&self, cleanup: Cleanup) -> Result<usize> {
        let mut guard = self.workspace.lock().await;
        Ok(cleanup.clean(&mut guard.store).await?)
    }

    /// Look up a resource by key without creating it.
    pub async fn resource<T: Stored>(&self, key: &str) -> Result<Option<Handle<T>>> {
        Ok(self.workspace.lock().await.store.get::<T>(key).await?)
    }

    /// Flush and close the store.
    pub async fn close(&self) -> Result<()> {
        self.workspace.lock().await.store.close().await?;
        Ok(())
    }
}

/// Initialize logging from `config`, then open the service.
///
/// ```no_run
/// # async fn example() -> core_service::Result<()> {
/// use core_runtime::config::CoreConfig;
///
/// let config = CoreConfig::builder().database_path("library.db").build()?;
/// let service = core_service::bootstrap(config).await?;
/// service.flush().await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns [`CoreError::Config`] if logging is already initialized.
pub async fn bootstrap(config: CoreConfig) -> Result<LibraryService> {
    init_logging(config.logging.clone())?;
    LibraryService::open(config).await
}
