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
use std::{fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::audio::mixer::{Command, Mixer};
use crate::audio::{OutputError, VoiceId};
use crate::decode::DecodedBuffer;

const NUM_CHANNELS: u16 = 2;
const SAMPLE_RATE: u32 = 44100;

struct State {
    mixer: Mixer,
    played: Vec<VoiceId>,
    stops: Vec<(VoiceId, Option<Duration>)>,
    closed: bool,
}

/// A mock device. Voices are mixed, but only when `render` is called, and nothing
/// reaches a sound card.
#[derive(Clone)]
pub struct Device {
    name: String,
    state: Arc<Mutex<State>>,
    finished_rx: crossbeam_channel::Receiver<VoiceId>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        let (finished_tx, finished_rx) = crossbeam_channel::unbounded();
        Device {
            name: name.to_string(),
            state: Arc::new(Mutex::new(State {
                mixer: Mixer::new(NUM_CHANNELS, SAMPLE_RATE, finished_tx),
                played: Vec::new(),
                stops: Vec::new(),
                closed: false,
            })),
            finished_rx,
        }
    }

    /// Mixes the given number of frames, advancing every voice.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut output = vec![0.0; frames * NUM_CHANNELS as usize];
        self.state.lock().mixer.process_into_output(&mut output);
        output
    }

    /// Returns the voices currently sounding.
    pub fn playing(&self) -> Vec<VoiceId> {
        self.state.lock().mixer.active_voices()
    }

    /// Returns every voice ever started on this device, in order.
    pub fn played(&self) -> Vec<VoiceId> {
        self.state.lock().played.clone()
    }

    /// Returns every stop request along with its fade-out.
    pub fn stops(&self) -> Vec<(VoiceId, Option<Duration>)> {
        self.state.lock().stops.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl crate::audio::Device for Device {
    fn play(&self, voice: VoiceId, buffer: Arc<DecodedBuffer>) -> Result<(), OutputError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(OutputError::Closed);
        }
        debug!(device = self.name, voice, buffer = ?buffer, "Playing voice (mock)");
        state.played.push(voice);
        state.mixer.apply(Command::Play { voice, buffer });
        Ok(())
    }

    fn stop(&self, voice: VoiceId, fade_out: Option<Duration>) {
        let mut state = self.state.lock();
        state.stops.push((voice, fade_out));
        let fade_frames = fade_out
            .map(|fade| (fade.as_secs_f64() * SAMPLE_RATE as f64).round() as usize)
            .unwrap_or(0);
        state.mixer.apply(Command::Stop { voice, fade_frames });
    }

    fn finished(&self) -> Vec<VoiceId> {
        self.finished_rx.try_iter().collect()
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.mixer.apply(Command::StopAll);
        state.closed = true;
        info!(device = self.name, "Closed mock device");
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Device>, OutputError> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
