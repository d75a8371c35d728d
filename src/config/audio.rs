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
use serde::Deserialize;

const DEFAULT_DEVICE: &str = "default";
const DEFAULT_MAX_VOICES: u32 = 64;

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Audio {
    /// The audio device. "default" picks the host's default output, names starting
    /// with "mock" pick a mock device.
    device: Option<String>,

    /// The maximum number of simultaneous voices. Starting a voice past the limit
    /// steals the oldest one.
    max_voices: Option<u32>,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: Some(device.to_string()),
            max_voices: None,
        }
    }

    /// Sets the voice limit.
    pub fn with_max_voices(mut self, max_voices: u32) -> Audio {
        self.max_voices = Some(max_voices);
        self
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    /// Returns the voice limit (default: 64, never less than 1).
    pub fn max_voices(&self) -> u32 {
        self.max_voices.unwrap_or(DEFAULT_MAX_VOICES).max(1)
    }
}
