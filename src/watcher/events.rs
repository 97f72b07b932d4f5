//! File system event processing pipeline
//!
//! This module handles the conversion of notify::Event instances into
//! FileChangeEvent entries handed to the pending change set.

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::debug;

use crate::scheduler::PendingChangeSet;
use crate::watcher::filtering::WatchFilter;
use crate::watcher::types::{ChangeKind, FileChangeEvent};

/// Normalize a raw notify event into zero or more change events
pub fn translate_event(event: Event, filter: &WatchFilter, now: SystemTime) -> Vec<FileChangeEvent> {
    let changes: Vec<(PathBuf, ChangeKind)> = match event.kind {
        EventKind::Create(_) => tag(event.paths, ChangeKind::Added),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            let mut changes = Vec::with_capacity(2);
            if let Some(from) = paths.next() {
                changes.push((from, ChangeKind::Removed));
            }
            if let Some(to) = paths.next() {
                changes.push((to, ChangeKind::Added));
            }
            changes
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            tag(event.paths, ChangeKind::Removed)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => tag(event.paths, ChangeKind::Added),
        EventKind::Modify(ModifyKind::Metadata(_)) => {
            debug!("Ignoring metadata-only change: {:?}", event.paths);
            Vec::new()
        }
        EventKind::Modify(_) => tag(event.paths, ChangeKind::Modified),
        EventKind::Remove(_) => tag(event.paths, ChangeKind::Removed),
        _ => {
            debug!("Ignoring event kind: {:?}", event.kind);
            Vec::new()
        }
    };

    changes
        .into_iter()
        .filter(|(path, kind)| filter.accepts(path, *kind != ChangeKind::Removed))
        .map(|(path, kind)| FileChangeEvent::new(path, kind, now))
        .collect()
}

fn tag(paths: Vec<PathBuf>, kind: ChangeKind) -> Vec<(PathBuf, ChangeKind)> {
    paths.into_iter().map(|path| (path, kind)).collect()
}

/// Translate a notify event and enqueue every relevant change
pub fn process_file_system_event(
    filter: &WatchFilter,
    pending: &PendingChangeSet,
    event: Event,
    now: SystemTime,
) -> usize {
    debug!("Processing file system event: {:?}", event);

    let changes = translate_event(event, filter, now);
    let queued = changes.len();
    for change in changes {
        debug!("Queueing file change: {:?}", change);
        pending.enqueue(change);
    }
    queued
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatchConfig;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};
    use std::fs;
    use tempfile::TempDir;

    fn filter() -> WatchFilter {
        WatchFilter::from_config(&WatchConfig::default()).unwrap()
    }

    #[test]
    fn test_create_and_modify_require_existing_files() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("app.ts");
        fs::write(&file, "let x = 1;").unwrap();

        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(file.clone());
        let changes = translate_event(created, &filter(), SystemTime::now());
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Added);

        let modified = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(file.clone());
        let changes = translate_event(modified, &filter(), SystemTime::now());
        assert_eq!(changes[0].kind, ChangeKind::Modified);

        let vanished = Event::new(EventKind::Create(CreateKind::File))
            .add_path(temp_dir.path().join("vanished.ts"));
        assert!(translate_event(vanished, &filter(), SystemTime::now()).is_empty());
    }

    #[test]
    fn test_removal_does_not_require_file() {
        let removed = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/repo/src/deleted.rs"));
        let changes = translate_event(removed, &filter(), SystemTime::now());
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Removed);
    }

    #[test]
    fn test_rename_splits_into_remove_and_add() {
        let temp_dir = TempDir::new().unwrap();
        let to = temp_dir.path().join("new_name.py");
        fs::write(&to, "print('hi')").unwrap();

        let rename = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(temp_dir.path().join("old_name.py"))
            .add_path(to.clone());
        let changes = translate_event(rename, &filter(), SystemTime::now());

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].kind, ChangeKind::Removed);
        assert_eq!(changes[1].kind, ChangeKind::Added);
        assert_eq!(changes[1].path, to);
    }

    #[test]
    fn test_metadata_and_access_events_are_ignored() {
        let metadata = Event::new(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)))
            .add_path(PathBuf::from("/repo/src/lib.rs"));
        assert!(translate_event(metadata, &filter(), SystemTime::now()).is_empty());

        let other = Event::new(EventKind::Other).add_path(PathBuf::from("/repo/src/lib.rs"));
        assert!(translate_event(other, &filter(), SystemTime::now()).is_empty());
    }
}
