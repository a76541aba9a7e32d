//! Staff layout — groups presses into chord columns for the score view.
//!
//! Presses within 100 ms of the previous press stack into the same column
//! (a chord); a longer gap opens a new column. The window is bounded: once
//! the column cap is passed, the oldest column is evicted. Column indices
//! are absolute and stable across eviction, matching the fixed horizontal
//! offsets the UI renders at.

use std::collections::VecDeque;

use crate::keys::Key;
use crate::recorder::NoteEvent;

/// Max gap between presses still considered simultaneous.
pub const CHORD_THRESHOLD_MS: u64 = 100;
/// Columns kept on screen before the oldest is evicted.
pub const MAX_COLUMNS: usize = 30;

/// One chord column: its absolute index and the stacked keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub index: usize,
    pub keys: Vec<Key>,
}

/// Live, bounded chord-column layout.
#[derive(Debug)]
pub struct StaffLayout {
    columns: VecDeque<Column>,
    last_press_ms: Option<u64>,
    next_index: usize,
    max_columns: usize,
}

impl Default for StaffLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl StaffLayout {
    pub fn new() -> Self {
        StaffLayout {
            columns: VecDeque::new(),
            last_press_ms: None,
            next_index: 0,
            max_columns: MAX_COLUMNS,
        }
    }

    /// Record a press and return the absolute column index it landed in.
    pub fn press(&mut self, key: Key, now_ms: u64) -> usize {
        let new_column = self
            .last_press_ms
            .is_none_or(|last| now_ms.saturating_sub(last) > CHORD_THRESHOLD_MS);
        self.last_press_ms = Some(now_ms);

        if !new_column && let Some(column) = self.columns.back_mut() {
            column.keys.push(key);
            return column.index;
        }

        let index = self.next_index;
        self.next_index += 1;
        self.columns.push_back(Column {
            index,
            keys: vec![key],
        });
        if self.columns.len() > self.max_columns {
            self.columns.pop_front();
        }
        index
    }

    /// Columns currently on screen, oldest first.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Drop everything and restart column numbering.
    pub fn clear(&mut self) {
        self.columns.clear();
        self.last_press_ms = None;
        self.next_index = 0;
    }
}

/// Group an already-recorded sequence into chord columns, for the preview
/// shown when a shared recording is restored.
pub fn group_into_columns(notes: &[NoteEvent]) -> Vec<Vec<Key>> {
    let mut columns: Vec<Vec<Key>> = Vec::new();
    let mut last_offset: Option<u64> = None;
    for note in notes {
        let new_column =
            last_offset.is_none_or(|last| note.offset_ms.saturating_sub(last) > CHORD_THRESHOLD_MS);
        if !new_column && let Some(column) = columns.last_mut() {
            column.push(note.key);
        } else {
            columns.push(vec![note.key]);
        }
        last_offset = Some(note.offset_ms);
    }
    columns
}
