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
use crate::audio::OutputError;
use crate::decode::DecodeError;
use crate::fetch::FetchError;
use crate::note::{KeyError, SampleKey};

/// Errors returned by the playback controller. Cloneable because every waiter of
/// a shared load receives the same result.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlaybackError {
    #[error(transparent)]
    InvalidKey(#[from] KeyError),

    #[error("{0} is not loaded")]
    NotLoaded(SampleKey),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("unable to decode sample: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("load was aborted: {0}")]
    Aborted(String),
}
