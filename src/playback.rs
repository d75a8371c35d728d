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

//! Note playback.
//!
//! The controller turns (instrument, note) requests into sounding voices. Each
//! note moves through Idle, Loading, Ready and Playing; loads are shared between
//! concurrent callers, and voices started while a note is still loading are queued
//! and sounded (or cancelled) in order once it finishes.

mod controller;
mod error;
mod state;
mod voice;

pub use controller::{PlaybackController, Settings};
pub use error::PlaybackError;
pub use state::{NoteEvent, NoteState};
pub use voice::PlaybackHandle;
