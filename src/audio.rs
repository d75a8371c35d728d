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
use std::any::Any;
use std::{fmt, sync::Arc, time::Duration};

use crate::config;
use crate::decode::DecodedBuffer;

pub mod cpal;
pub mod mixer;
pub mod mock;

/// Identifies one sounding voice on a device.
pub type VoiceId = u64;

/// Errors from opening or driving an audio device.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OutputError {
    #[error("no audio device found with name {0}")]
    NoDevice(String),

    #[error("audio device error: {0}")]
    Device(String),

    #[error("unsupported sample format {0}")]
    UnsupportedFormat(String),

    #[error("audio device is closed")]
    Closed,
}

/// An audio output that voices can be played through.
pub trait Device: Any + fmt::Display + Send + Sync {
    /// Starts playing the buffer from the beginning as the given voice.
    fn play(&self, voice: VoiceId, buffer: Arc<DecodedBuffer>) -> Result<(), OutputError>;

    /// Stops the given voice. With a fade-out the voice ramps down linearly before it
    /// is removed. Unknown voices are ignored.
    fn stop(&self, voice: VoiceId, fade_out: Option<Duration>);

    /// Returns the voices that have finished since the last call, either because
    /// they played to the end or because they were stopped.
    fn finished(&self) -> Vec<VoiceId>;

    /// Stops every voice and releases the device.
    fn close(&self);

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Device>, OutputError>;
}

/// Opens the device named in the audio configuration. Names beginning with "mock"
/// open a mock device that renders nothing.
pub fn open(config: &config::Audio) -> Result<Arc<dyn Device>, OutputError> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(device)));
    }

    Ok(Arc::new(cpal::Device::open(device)?))
}

/// Lists the names of the available output devices.
pub fn list_devices() -> Result<Vec<String>, OutputError> {
    cpal::Device::list()
}
