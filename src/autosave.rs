//! Debounced draft autosave.
//!
//! Each storyteller editing a story gets one controller. Edits land in a
//! latest-content slot and poke a background task; the task waits out a quiet
//! period (every further edit restarts it) and then writes a single snapshot.
//! Blank drafts are never written. The controller exposes a watch channel so
//! a UI can show idle / saving / saved / error, with "saved" reverting to
//! idle after a short display window.
//!
//! The timer is owned by the task and dies with it: `shutdown` cancels any
//! pending save, `flush` forces one through immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config::AutosaveConfig;
use crate::db::SareDb;
use crate::error::SareError;

/// One editor snapshot. What the storyteller currently has typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftContent {
    pub story_one: Option<String>,
    pub story_two: Option<String>,
    pub story_three: Option<String>,
    pub notes: Option<String>,
}

impl DraftContent {
    /// True when there is nothing worth persisting.
    pub fn is_blank(&self) -> bool {
        fn blank(field: &Option<String>) -> bool {
            field.as_deref().map_or(true, |s| s.trim().is_empty())
        }
        blank(&self.story_one)
            && blank(&self.story_two)
            && blank(&self.story_three)
            && blank(&self.notes)
    }
}

/// Where a save currently stands, for status indicators.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SaveStatus {
    Idle,
    Saving,
    Saved,
    Error { message: String },
}

/// Destination for draft snapshots.
#[async_trait]
pub trait DraftSaver: Send + Sync {
    async fn save(&self, storyteller_id: &str, content: &DraftContent) -> Result<(), SareError>;
}

/// Saves drafts into the SQLite store, opening a short-lived connection per
/// write so the saver itself stays `Send + Sync`.
pub struct SqliteDraftSaver {
    db_path: std::path::PathBuf,
}

impl SqliteDraftSaver {
    pub fn new(db_path: impl Into<std::path::PathBuf>) -> Self {
        SqliteDraftSaver {
            db_path: db_path.into(),
        }
    }
}

#[async_trait]
impl DraftSaver for SqliteDraftSaver {
    async fn save(&self, storyteller_id: &str, content: &DraftContent) -> Result<(), SareError> {
        let db = SareDb::open_at(self.db_path.clone())?;
        db.upsert_draft(
            storyteller_id,
            content.story_one.as_deref(),
            content.story_two.as_deref(),
            content.story_three.as_deref(),
            content.notes.as_deref(),
        )?;
        Ok(())
    }
}

enum Signal {
    Edit,
    Flush(oneshot::Sender<Result<(), SareError>>),
    Shutdown,
}

/// Debounced autosave for one storyteller's draft.
pub struct AutosaveController {
    storyteller_id: String,
    latest: Arc<Mutex<Option<DraftContent>>>,
    signal_tx: mpsc::Sender<Signal>,
    status_rx: watch::Receiver<SaveStatus>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AutosaveController {
    /// Start the background save task for one storyteller.
    pub fn spawn(
        saver: Arc<dyn DraftSaver>,
        storyteller_id: impl Into<String>,
        config: &AutosaveConfig,
    ) -> Arc<Self> {
        let storyteller_id = storyteller_id.into();
        let latest: Arc<Mutex<Option<DraftContent>>> = Arc::new(Mutex::new(None));
        let (signal_tx, signal_rx) = mpsc::channel::<Signal>(64);
        let (status_tx, status_rx) = watch::channel(SaveStatus::Idle);

        let task = tokio::spawn(run_loop(
            saver,
            storyteller_id.clone(),
            Arc::clone(&latest),
            signal_rx,
            status_tx,
            config.debounce_ms,
            config.status_display_ms,
        ));

        Arc::new(AutosaveController {
            storyteller_id,
            latest,
            signal_tx,
            status_rx,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn storyteller_id(&self) -> &str {
        &self.storyteller_id
    }

    /// Record the current editor content and restart the quiet period.
    pub fn on_change(&self, content: DraftContent) {
        *self.latest.lock() = Some(content);
        // A full buffer means a signal is already queued; dropping this one
        // is fine.
        let _ = self.signal_tx.try_send(Signal::Edit);
    }

    /// Save whatever is pending right now, skipping the quiet period.
    /// Returns once the write has finished. No pending content is a no-op.
    pub async fn flush(&self) -> Result<(), SareError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.signal_tx.send(Signal::Flush(ack_tx)).await.is_err() {
            // Task already gone; nothing pending can exist
            return Ok(());
        }
        ack_rx.await.unwrap_or(Ok(()))
    }

    /// Stop the task, discarding any pending unsaved edit.
    pub async fn shutdown(&self) {
        let _ = self.signal_tx.send(Signal::Shutdown).await;
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Subscribe to save status changes.
    pub fn status(&self) -> watch::Receiver<SaveStatus> {
        self.status_rx.clone()
    }

    /// The status as of right now.
    pub fn current_status(&self) -> SaveStatus {
        self.status_rx.borrow().clone()
    }
}

async fn run_loop(
    saver: Arc<dyn DraftSaver>,
    storyteller_id: String,
    latest: Arc<Mutex<Option<DraftContent>>>,
    mut signal_rx: mpsc::Receiver<Signal>,
    status_tx: watch::Sender<SaveStatus>,
    debounce_ms: u64,
    status_display_ms: u64,
) {
    // Status writes go through a generation counter so the delayed
    // saved -> idle revert never clobbers a newer state.
    let status_gen: Arc<Mutex<u64>> = Arc::new(Mutex::new(0));
    let set_status = |status: SaveStatus| -> u64 {
        let mut gen = status_gen.lock();
        *gen += 1;
        let _ = status_tx.send(status);
        *gen
    };

    'outer: loop {
        // Wait for the first edit
        match signal_rx.recv().await {
            None | Some(Signal::Shutdown) => break,
            Some(Signal::Flush(ack)) => {
                let result = save_pending(
                    saver.as_ref(),
                    &storyteller_id,
                    &latest,
                    &set_status,
                    &status_gen,
                    &status_tx,
                    status_display_ms,
                )
                .await;
                let _ = ack.send(result);
                continue;
            }
            Some(Signal::Edit) => {}
        }

        // Quiet period: every further edit restarts the window
        loop {
            tokio::select! {
                _ = sleep(Duration::from_millis(debounce_ms)) => {
                    let _ = save_pending(
                        saver.as_ref(),
                        &storyteller_id,
                        &latest,
                        &set_status,
                        &status_gen,
                        &status_tx,
                        status_display_ms,
                    )
                    .await;
                    break;
                }
                msg = signal_rx.recv() => match msg {
                    None | Some(Signal::Shutdown) => break 'outer,
                    Some(Signal::Flush(ack)) => {
                        let result = save_pending(
                            saver.as_ref(),
                            &storyteller_id,
                            &latest,
                            &set_status,
                            &status_gen,
                            &status_tx,
                            status_display_ms,
                        )
                        .await;
                        let _ = ack.send(result);
                        break;
                    }
                    Some(Signal::Edit) => {}
                },
            }
        }
    }

    log::debug!("Autosave: controller for {storyteller_id} stopped");
}

async fn save_pending(
    saver: &dyn DraftSaver,
    storyteller_id: &str,
    latest: &Arc<Mutex<Option<DraftContent>>>,
    set_status: &impl Fn(SaveStatus) -> u64,
    status_gen: &Arc<Mutex<u64>>,
    status_tx: &watch::Sender<SaveStatus>,
    status_display_ms: u64,
) -> Result<(), SareError> {
    let content = match latest.lock().take() {
        Some(content) => content,
        None => return Ok(()),
    };
    if content.is_blank() {
        log::debug!("Autosave: skipping blank draft for {storyteller_id}");
        return Ok(());
    }

    set_status(SaveStatus::Saving);
    match saver.save(storyteller_id, &content).await {
        Ok(()) => {
            let gen = set_status(SaveStatus::Saved);
            log::debug!("Autosave: saved draft for {storyteller_id}");

            // Revert to idle after the display window unless something newer
            // has been shown since.
            let status_gen = Arc::clone(status_gen);
            let status_tx = status_tx.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(status_display_ms)).await;
                let current = status_gen.lock();
                if *current == gen {
                    let _ = status_tx.send(SaveStatus::Idle);
                }
            });
            Ok(())
        }
        Err(e) => {
            log::warn!("Autosave: save failed for {storyteller_id}: {e}");
            set_status(SaveStatus::Error {
                message: e.to_string(),
            });
            Err(e)
        }
    }
}

/// All live autosave controllers, one per storyteller being edited.
#[derive(Default)]
pub struct AutosaveRegistry {
    controllers: DashMap<String, Arc<AutosaveController>>,
}

impl AutosaveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the controller for a storyteller, spawning one if needed.
    pub fn controller(
        &self,
        saver: Arc<dyn DraftSaver>,
        storyteller_id: &str,
        config: &AutosaveConfig,
    ) -> Arc<AutosaveController> {
        self.controllers
            .entry(storyteller_id.to_string())
            .or_insert_with(|| AutosaveController::spawn(saver, storyteller_id, config))
            .clone()
    }

    /// Stop and drop the controller for one storyteller, if any.
    pub async fn remove(&self, storyteller_id: &str) {
        if let Some((_, controller)) = self.controllers.remove(storyteller_id) {
            controller.shutdown().await;
        }
    }

    /// Stop every controller. Used on application shutdown.
    pub async fn shutdown_all(&self) {
        let ids: Vec<String> = self
            .controllers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for id in ids {
            self.remove(&id).await;
        }
    }
}
