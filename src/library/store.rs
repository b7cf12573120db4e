use std::sync::{Arc, Mutex, MutexGuard};

use crate::library::track::Track;

/// Append-only track collection shared by the requests of one sync.
///
/// Clones share the same underlying list. Appends are atomic with respect to each
/// other; readers get a consistent snapshot that may be partial mid-sync.
#[derive(Debug, Clone, Default)]
pub struct LibraryStore {
    tracks: Arc<Mutex<Vec<Track>>>,
}

impl LibraryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Track>> {
        // A panic while holding the lock cannot leave a half-pushed track behind.
        self.tracks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[allow(dead_code)] // Pages are stored through `extend`
    pub fn append(&self, track: Track) {
        self.lock().push(track);
    }

    /// Appends a whole batch under one lock, so it stays contiguous.
    pub fn extend(&self, tracks: impl IntoIterator<Item = Track>) {
        self.lock().extend(tracks);
    }

    /// Drops every track, e.g. before a new sync starts.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn snapshot(&self) -> Vec<Track> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
