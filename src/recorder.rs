//! Note event capture — timestamps key presses against a recording start.

use serde::{Deserialize, Serialize};

use crate::keys::Key;

/// One note trigger at a millisecond offset from its recording's start.
///
/// Offsets are always relative, which is what makes a recorded phrase
/// replayable at any later instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub key: Key,
    #[serde(rename = "offsetMillis")]
    pub offset_ms: u64,
}

/// An in-progress recording: a start instant and a growing event list.
///
/// Used for both the flat recording and loop capture. Insertion order is
/// capture order; the host clock is monotonic so offsets are too.
#[derive(Debug, Clone)]
pub struct PhraseRecorder {
    start_ms: u64,
    notes: Vec<NoteEvent>,
}

impl PhraseRecorder {
    /// Open a recording at `now_ms`.
    pub fn start(now_ms: u64) -> Self {
        PhraseRecorder {
            start_ms: now_ms,
            notes: Vec::new(),
        }
    }

    /// Append a press at its offset from the recording start.
    pub fn capture(&mut self, key: Key, now_ms: u64) {
        self.notes.push(NoteEvent {
            key,
            offset_ms: now_ms.saturating_sub(self.start_ms),
        });
    }

    /// Close the recording, yielding the captured sequence.
    pub fn stop(self) -> Vec<NoteEvent> {
        self.notes
    }

    /// Number of captured events so far.
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_relative_to_start() {
        let mut rec = PhraseRecorder::start(5_000);
        rec.capture(Key::Q, 5_000);
        rec.capture(Key::W, 5_120);
        rec.capture(Key::E, 5_340);

        let notes = rec.stop();
        let offsets: Vec<u64> = notes.iter().map(|n| n.offset_ms).collect();
        assert_eq!(offsets, vec![0, 120, 340]);
    }

    #[test]
    fn keeps_capture_order_and_duplicates() {
        let mut rec = PhraseRecorder::start(0);
        rec.capture(Key::Q, 10);
        rec.capture(Key::W, 10);
        rec.capture(Key::Q, 10);

        let notes = rec.stop();
        assert_eq!(notes.len(), 3, "same-offset presses must all be kept");
        assert_eq!(notes[0].key, Key::Q);
        assert_eq!(notes[1].key, Key::W);
        assert_eq!(notes[2].key, Key::Q);
    }

    #[test]
    fn clock_regression_clamps_to_zero() {
        let mut rec = PhraseRecorder::start(100);
        rec.capture(Key::Q, 40);
        assert_eq!(rec.stop()[0].offset_ms, 0);
    }

    #[test]
    fn note_event_wire_form() {
        let event = NoteEvent {
            key: Key::Q,
            offset_ms: 120,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"key":"q","offsetMillis":120}"#);
    }
}
