//! The eight playable keys and their note tables.
//!
//! Keys map the home-row layout `q w e r a s d f` onto one octave from C5
//! to C6. Frequencies, note names, staff positions and display colors are
//! the fixed tables the rest of the crate (and the UI adapter) read from.

use serde::{Deserialize, Serialize};

/// A playable key. Serialized as its lowercase letter (`"q"`, `"w"`, ...),
/// which is also the wire form inside share payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Key {
    Q,
    W,
    E,
    R,
    A,
    S,
    D,
    F,
}

impl Key {
    /// All keys in keyboard order (low C5 to high C6).
    pub const ALL: [Key; 8] = [
        Key::Q,
        Key::W,
        Key::E,
        Key::R,
        Key::A,
        Key::S,
        Key::D,
        Key::F,
    ];

    /// Parse a key from its keyboard character. Case-insensitive.
    pub fn from_char(ch: char) -> Option<Key> {
        match ch.to_ascii_lowercase() {
            'q' => Some(Key::Q),
            'w' => Some(Key::W),
            'e' => Some(Key::E),
            'r' => Some(Key::R),
            'a' => Some(Key::A),
            's' => Some(Key::S),
            'd' => Some(Key::D),
            'f' => Some(Key::F),
            _ => None,
        }
    }

    /// The keyboard character for this key.
    pub fn as_char(self) -> char {
        match self {
            Key::Q => 'q',
            Key::W => 'w',
            Key::E => 'e',
            Key::R => 'r',
            Key::A => 'a',
            Key::S => 's',
            Key::D => 'd',
            Key::F => 'f',
        }
    }

    /// Fundamental frequency in Hz (equal temperament, C5..C6).
    pub fn frequency(self) -> f64 {
        match self {
            Key::Q => 523.25,  // C5
            Key::W => 587.33,  // D5
            Key::E => 659.25,  // E5
            Key::R => 698.46,  // F5
            Key::A => 783.99,  // G5
            Key::S => 880.00,  // A5
            Key::D => 987.77,  // B5
            Key::F => 1046.50, // C6
        }
    }

    /// Display note name.
    pub fn note_name(self) -> &'static str {
        match self {
            Key::Q | Key::F => "C",
            Key::W => "D",
            Key::E => "E",
            Key::R => "F",
            Key::A => "G",
            Key::S => "A",
            Key::D => "B",
        }
    }

    /// Vertical staff position in pixels from the top of the staff area.
    pub fn staff_position(self) -> u32 {
        match self {
            Key::Q => 145,
            Key::W => 130,
            Key::E => 115,
            Key::R => 100,
            Key::A => 85,
            Key::S => 70,
            Key::D => 55,
            Key::F => 40,
        }
    }

    /// Display color for note dots and key-press pulses.
    pub fn color(self) -> &'static str {
        match self {
            Key::Q => "#ff6b6b",
            Key::W => "#feca57",
            Key::E => "#48dbfb",
            Key::R => "#ff9ff3",
            Key::A => "#54a0ff",
            Key::S => "#00d2d3",
            Key::D => "#ff6348",
            Key::F => "#1dd1a1",
        }
    }
}
