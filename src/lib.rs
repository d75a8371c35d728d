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

//! Sample delivery and playback for note-based instruments.
//!
//! Samples are identified by an instrument and a note name, resolved from a local
//! cache or a remote sample-font mirror, decoded into memory and played as
//! independent voices.

pub mod audio;
pub mod config;
pub mod decode;
pub mod fetch;
pub mod note;
pub mod playback;
pub mod store;
#[cfg(test)]
mod testutil;

pub use fetch::{FetchError, SampleFetcher};
pub use note::{KeyError, Note, SampleKey};
pub use playback::{NoteEvent, NoteState, PlaybackController, PlaybackError, PlaybackHandle};
pub use store::{SampleBlob, SampleStore, StoreError};
