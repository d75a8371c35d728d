// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Note names and sample keys.
//!
//! Every note is stored in a single canonical spelling: naturals for the white
//! keys and flats for the black keys. This is the spelling the sample-font
//! mirror uses for its file names, and it guarantees that enharmonic requests
//! (`C#4`, `Db4`) resolve to the same cache entry.

use std::fmt;
use std::str::FromStr;

/// Canonical names for each pitch class, starting at C.
const PITCH_CLASS_NAMES: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

/// Highest octave accepted in a note name.
const MAX_OCTAVE: i32 = 9;

/// The lowest and highest MIDI notes on an 88 key piano (A0 and C8).
const PIANO_LOWEST_MIDI: u8 = 21;
const PIANO_HIGHEST_MIDI: u8 = 108;

/// Errors produced while parsing notes and sample keys.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("invalid note name '{0}'")]
    InvalidNote(String),

    #[error("note '{0}' is outside of the supported octave range")]
    OutOfRange(String),

    #[error("invalid instrument id '{0}'")]
    InvalidInstrument(String),
}

/// A note in canonical form: a pitch class and an octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Note {
    octave: u8,
    pitch_class: u8,
}

impl Note {
    /// Parses and canonicalizes a note name such as `C#4`, `Db4` or `a0`.
    ///
    /// Black keys are spelled with flats (`G#4` becomes `Ab4`). Spellings that
    /// cross a letter boundary fold onto the natural with the same pitch, so
    /// `E#4` becomes `F4` and `Cb4` becomes `B3`.
    pub fn parse(name: &str) -> Result<Note, KeyError> {
        let invalid = || KeyError::InvalidNote(name.to_string());

        let mut chars = name.chars();
        let letter = chars.next().ok_or_else(invalid)?;
        let natural: i32 = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(invalid()),
        };

        let rest = chars.as_str();
        let (accidental, octave) = match rest.chars().next() {
            Some('#') => (1, &rest[1..]),
            Some('b') => (-1, &rest[1..]),
            _ => (0, rest),
        };

        if octave.is_empty() || !octave.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        // Anything past two digits is far outside the playable range.
        if octave.len() > 2 {
            return Err(KeyError::OutOfRange(name.to_string()));
        }
        let octave: i32 = octave.parse().map_err(|_| invalid())?;

        let absolute = octave * 12 + natural + accidental;
        let octave = absolute.div_euclid(12);
        if !(0..=MAX_OCTAVE).contains(&octave) {
            return Err(KeyError::OutOfRange(name.to_string()));
        }

        Ok(Note {
            octave: octave as u8,
            pitch_class: absolute.rem_euclid(12) as u8,
        })
    }

    /// Creates a note from a MIDI note number. MIDI note 60 is C4.
    pub fn from_midi(midi: u8) -> Result<Note, KeyError> {
        let octave = (midi / 12) as i32 - 1;
        if !(0..=MAX_OCTAVE).contains(&octave) {
            return Err(KeyError::OutOfRange(format!("midi {}", midi)));
        }
        Ok(Note {
            octave: octave as u8,
            pitch_class: midi % 12,
        })
    }

    /// Returns the MIDI note number for this note.
    pub fn midi(&self) -> u8 {
        12 * (self.octave + 1) + self.pitch_class
    }

    /// Returns the octave of this note.
    pub fn octave(&self) -> u8 {
        self.octave
    }

    /// Returns the canonical name of the pitch, without the octave.
    pub fn pitch_name(&self) -> &'static str {
        PITCH_CLASS_NAMES[self.pitch_class as usize]
    }

    /// All 88 keys of a piano, A0 through C8. These are the notes the
    /// sample-font mirror provides for each instrument.
    pub fn piano_range() -> impl Iterator<Item = Note> {
        (PIANO_LOWEST_MIDI..=PIANO_HIGHEST_MIDI).filter_map(|midi| Note::from_midi(midi).ok())
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch_name(), self.octave)
    }
}

impl FromStr for Note {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Note::parse(s)
    }
}

/// Identifies one sample: an instrument and a canonical note.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleKey {
    instrument: String,
    note: Note,
}

impl SampleKey {
    /// Creates a sample key, canonicalizing the note name.
    pub fn new(instrument: &str, note: &str) -> Result<SampleKey, KeyError> {
        SampleKey::from_note(instrument, Note::parse(note)?)
    }

    /// Creates a sample key from an already parsed note.
    pub fn from_note(instrument: &str, note: Note) -> Result<SampleKey, KeyError> {
        let valid = !instrument.is_empty()
            && instrument
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(KeyError::InvalidInstrument(instrument.to_string()));
        }

        Ok(SampleKey {
            instrument: instrument.to_string(),
            note,
        })
    }

    /// Gets the instrument id.
    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// Gets the canonical note.
    pub fn note(&self) -> Note {
        self.note
    }
}

impl fmt::Display for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.instrument, self.note)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(name: &str) -> String {
        Note::parse(name).unwrap().to_string()
    }

    #[test]
    fn test_sharps_become_next_letter_flats() {
        assert_eq!(canonical("C#4"), "Db4");
        assert_eq!(canonical("D#4"), "Eb4");
        assert_eq!(canonical("F#2"), "Gb2");
        assert_eq!(canonical("A#0"), "Bb0");
    }

    #[test]
    fn test_g_sharp_becomes_a_flat() {
        assert_eq!(canonical("G#4"), "Ab4");
        assert_eq!(canonical("G#7"), "Ab7");
    }

    #[test]
    fn test_naturals_and_flats_unchanged() {
        for name in ["C4", "A3", "Db4", "Eb5", "Gb1", "Ab4", "Bb3", "B7"] {
            assert_eq!(canonical(name), name);
        }
        assert_eq!(canonical("c4"), "C4");
        assert_eq!(canonical("bb3"), "Bb3");
    }

    #[test]
    fn test_letter_boundary_spellings_fold_by_pitch() {
        assert_eq!(canonical("E#4"), "F4");
        assert_eq!(canonical("B#3"), "C4");
        assert_eq!(canonical("Fb4"), "E4");
        assert_eq!(canonical("Cb4"), "B3");
    }

    #[test]
    fn test_enharmonic_keys_are_equal() {
        let sharp = SampleKey::new("acoustic_grand_piano", "C#4").unwrap();
        let flat = SampleKey::new("acoustic_grand_piano", "Db4").unwrap();
        assert_eq!(sharp, flat);
        assert_eq!(sharp.to_string(), "acoustic_grand_piano-Db4");
    }

    #[test]
    fn test_invalid_notes() {
        for name in ["", "H4", "C", "C#", "C##4", "4C", "C4x", "Cb0", "C10"] {
            assert!(Note::parse(name).is_err(), "{} should not parse", name);
        }
        assert_eq!(
            Note::parse("Cb0"),
            Err(KeyError::OutOfRange("Cb0".to_string()))
        );
    }

    #[test]
    fn test_huge_octaves_are_out_of_range() {
        for name in ["C999999999", "C357913942", "G#500000000", "A99", "Bb100"] {
            assert_eq!(
                Note::parse(name),
                Err(KeyError::OutOfRange(name.to_string())),
                "{} should be out of range",
                name
            );
        }
        assert!(SampleKey::new("acoustic_grand_piano", "G#500000000").is_err());
    }

    #[test]
    fn test_invalid_instrument() {
        assert!(SampleKey::new("", "C4").is_err());
        assert!(SampleKey::new("../etc", "C4").is_err());
        assert!(SampleKey::new("grand piano", "C4").is_err());
        assert!(SampleKey::new("electric_piano_1", "C4").is_ok());
    }

    #[test]
    fn test_midi_conversion() {
        assert_eq!(Note::parse("C4").unwrap().midi(), 60);
        assert_eq!(Note::parse("A0").unwrap().midi(), 21);
        assert_eq!(Note::from_midi(61).unwrap().to_string(), "Db4");
        assert!(Note::from_midi(0).is_err());
    }

    #[test]
    fn test_piano_range() {
        let notes: Vec<Note> = Note::piano_range().collect();
        assert_eq!(notes.len(), 88);
        assert_eq!(notes[0].to_string(), "A0");
        assert_eq!(notes[87].to_string(), "C8");
    }
}
