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
use std::fmt;

use crate::note::SampleKey;

use super::PlaybackError;

/// The lifecycle of one note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NoteState {
    /// Nothing is loaded.
    #[default]
    Idle,
    /// The sample is being fetched or decoded.
    Loading,
    /// The sample is decoded and no voice is sounding.
    Ready,
    /// At least one voice of the note is sounding.
    Playing,
}

impl fmt::Display for NoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            NoteState::Idle => "idle",
            NoteState::Loading => "loading",
            NoteState::Ready => "ready",
            NoteState::Playing => "playing",
        };
        f.write_str(state)
    }
}

/// Events published to every subscriber of the controller.
#[derive(Debug, Clone)]
pub enum NoteEvent {
    /// A note moved to a new state.
    StateChanged { key: SampleKey, state: NoteState },
    /// A note failed to load and went back to idle.
    LoadFailed { key: SampleKey, error: PlaybackError },
    /// Every requested note of an instrument loaded.
    InstrumentLoaded { instrument: String, notes: usize },
}
