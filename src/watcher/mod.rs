//! File Watcher & Change Detection
//!
//! This module turns raw filesystem notifications into normalized
//! [`FileChangeEvent`]s and hands them to the [`PendingChangeSet`].
//!
//! # Architecture
//!
//! The watcher uses a 2-phase model:
//! 1. **File System Events** → notify-rs detects changes on its own thread and
//!    forwards them over a channel
//! 2. **Translation task** → an async task filters, normalizes and enqueues them
//!
//! The notify callback never touches the pending set directly, so a slow
//! enqueue can never stall the OS event source.

pub mod events;
pub mod filtering;
pub mod types;

use notify::Watcher;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::clock::Clock;
use crate::error::{Result, SentinelError};
use crate::scheduler::PendingChangeSet;

pub use filtering::WatchFilter;
pub use types::{ChangeKind, FileChangeEvent};

const EVENT_TASK_DRAIN: Duration = Duration::from_secs(1);

/// Back-to-back backend errors after which the watcher counts as dead
pub const MAX_CONSECUTIVE_WATCH_ERRORS: u32 = 10;

/// Watches a directory tree and feeds changes into the pending set
pub struct ChangeDetector {
    watcher: Option<notify::RecommendedWatcher>,
    event_task: Option<JoinHandle<()>>,
    pending: Arc<PendingChangeSet>,
    filter: Arc<WatchFilter>,
    clock: Arc<dyn Clock>,
    root: PathBuf,
}

impl ChangeDetector {
    pub fn new(
        root: PathBuf,
        filter: Arc<WatchFilter>,
        pending: Arc<PendingChangeSet>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            watcher: None,
            event_task: None,
            pending,
            filter,
            clock,
            root,
        }
    }

    /// Start watching the tree for file changes
    ///
    /// Failing to set up the OS watcher is fatal: the caller must not keep
    /// running half-initialized. A watcher that keeps failing afterwards
    /// raises `shutdown` instead.
    pub fn start(&mut self, shutdown: Arc<watch::Sender<bool>>) -> Result<()> {
        info!("Starting file watcher for: {}", self.root.display());

        let (tx, rx) = mpsc::unbounded_channel::<notify::Result<notify::Event>>();

        let mut watcher = notify::recommended_watcher(move |res| {
            if let Err(e) = tx.send(res) {
                error!("Failed to send file event: {}", e);
            }
        })
        .map_err(|source| SentinelError::Watcher {
            path: self.root.clone(),
            source,
        })?;

        watcher
            .watch(&self.root, notify::RecursiveMode::Recursive)
            .map_err(|source| SentinelError::Watcher {
                path: self.root.clone(),
                source,
            })?;

        self.watcher = Some(watcher);

        self.event_task = Some(tokio::spawn(forward_events(
            rx,
            self.filter.clone(),
            self.pending.clone(),
            self.clock.clone(),
            shutdown,
        )));

        info!("File watcher started successfully");
        Ok(())
    }

    /// Enqueue every supported file under the root as modified
    pub fn initial_scan(&self) -> usize {
        scan_tree(&self.root, &self.filter, &self.pending, self.clock.system_time())
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// Stop the file watcher
    ///
    /// Dropping the watcher closes the channel, which ends the event task.
    /// Backends that release their handler lazily get the task aborted.
    pub async fn stop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            drop(watcher);
            info!("File watcher stopped");
        }
        if let Some(mut task) = self.event_task.take() {
            match tokio::time::timeout(EVENT_TASK_DRAIN, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("File event task ended abnormally: {}", e),
                Err(_) => {
                    debug!("File event task still draining, aborting");
                    task.abort();
                }
            }
        }
    }
}

/// Translate backend events into pending changes until the channel closes.
///
/// Isolated errors are logged and skipped. After
/// [`MAX_CONSECUTIVE_WATCH_ERRORS`] in a row the watcher is treated as
/// failed and `shutdown` is raised.
pub(crate) async fn forward_events(
    mut rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    filter: Arc<WatchFilter>,
    pending: Arc<PendingChangeSet>,
    clock: Arc<dyn Clock>,
    shutdown: Arc<watch::Sender<bool>>,
) {
    info!("File system event detector started");
    let mut consecutive_errors = 0u32;

    while let Some(event_result) = rx.recv().await {
        match event_result {
            Ok(event) => {
                consecutive_errors = 0;
                let queued = events::process_file_system_event(
                    &filter,
                    &pending,
                    event,
                    clock.system_time(),
                );
                if queued > 0 {
                    debug!("Queued {} change(s), {} pending", queued, pending.len());
                }
            }
            Err(e) => {
                consecutive_errors += 1;
                warn!(consecutive_errors, "File watcher error: {}", e);
                if consecutive_errors >= MAX_CONSECUTIVE_WATCH_ERRORS {
                    error!(
                        consecutive_errors,
                        "File watcher keeps failing, requesting shutdown"
                    );
                    shutdown.send_replace(true);
                    return;
                }
            }
        }
    }
    debug!("File system event detector stopped");
}

/// Walk the tree once and enqueue every supported file as modified
pub fn scan_tree(
    root: &Path,
    filter: &WatchFilter,
    pending: &PendingChangeSet,
    now: SystemTime,
) -> usize {
    let mut queued = 0;

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !filter.is_ignored(e.path()))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry during scan: {}", e);
                continue;
            }
        };

        if entry.file_type().is_file() && filter.accepts(entry.path(), false) {
            pending.enqueue(FileChangeEvent::new(entry.path(), ChangeKind::Modified, now));
            queued += 1;
        }
    }

    info!("Initial scan of {} queued {} file(s)", root.display(), queued);
    queued
}
