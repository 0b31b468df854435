//! Append-only snapshot history with undo/redo.

use crate::analysis::track::PitchTrack;
use crate::notes::Note;
use std::sync::Arc;

/// One committed editing state. Immutable once committed; readers share it.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub pitch: PitchTrack,
    pub notes: Vec<Note>,
}

/// Linear history of snapshots with a movable index. Capped: when the cap is
/// exceeded the oldest snapshot is evicted and the index shifts with it, so
/// it never points past either end.
#[derive(Debug)]
pub struct HistoryStore {
    snapshots: Vec<Arc<Snapshot>>,
    index: usize,
    cap: usize,
}

pub const DEFAULT_HISTORY_CAP: usize = 200;

impl Default for HistoryStore {
    fn default() -> Self {
        Self::with_cap(DEFAULT_HISTORY_CAP)
    }
}

impl HistoryStore {
    pub fn with_cap(cap: usize) -> Self {
        Self {
            snapshots: vec![Arc::new(Snapshot::default())],
            index: 0,
            cap: cap.max(1),
        }
    }

    /// The currently visible state.
    pub fn current(&self) -> &Arc<Snapshot> {
        &self.snapshots[self.index]
    }

    /// Drop everything after the current index and append a new state.
    pub fn commit(&mut self, snapshot: Snapshot) {
        self.snapshots.truncate(self.index + 1);
        self.snapshots.push(Arc::new(snapshot));
        self.index += 1;

        if self.snapshots.len() > self.cap {
            self.snapshots.remove(0);
            self.index -= 1;
        }
    }

    /// Discard all history and start over from `snapshot`.
    pub fn reset(&mut self, snapshot: Snapshot) {
        self.snapshots = vec![Arc::new(snapshot)];
        self.index = 0;
    }

    pub fn undo(&mut self) -> bool {
        if self.can_undo() {
            self.index -= 1;
            true
        } else {
            false
        }
    }

    pub fn redo(&mut self) -> bool {
        if self.can_redo() {
            self.index += 1;
            true
        } else {
            false
        }
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.snapshots.len()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}
