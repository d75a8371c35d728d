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
// Voice mixing shared by the cpal and mock devices.
use std::sync::Arc;

use crate::audio::VoiceId;
use crate::decode::DecodedBuffer;

/// Instructions sent to the mixer from outside the audio callback.
pub enum Command {
    /// Start a voice from the beginning of the buffer.
    Play {
        voice: VoiceId,
        buffer: Arc<DecodedBuffer>,
    },
    /// Stop a voice, ramping it down over the given number of output frames.
    Stop { voice: VoiceId, fade_frames: usize },
    /// Drop every voice immediately.
    StopAll,
}

/// A voice currently being rendered.
struct ActiveVoice {
    id: VoiceId,
    buffer: Arc<DecodedBuffer>,
    /// Read position in source frames. Fractional when the buffer rate differs
    /// from the output rate.
    position: f64,
    /// Source frames advanced per output frame.
    step: f64,
    fade: Option<Fade>,
}

#[derive(Clone, Copy)]
struct Fade {
    remaining: usize,
    total: usize,
}

impl ActiveVoice {
    /// Reads one sample of the voice at the current position, linearly interpolated
    /// between neighbouring source frames.
    #[inline]
    fn sample(&self, output_channel: usize) -> Option<f32> {
        let index = self.position.floor() as usize;
        let current = self.buffer.frame(index)?;
        let source_channel = output_channel % current.len();
        let s0 = current[source_channel];
        let s1 = self
            .buffer
            .frame(index + 1)
            .map(|next| next[source_channel])
            .unwrap_or(s0);
        let frac = (self.position - index as f64) as f32;
        Some(s0 + (s1 - s0) * frac)
    }

    #[inline]
    fn gain(&self) -> f32 {
        match self.fade {
            Some(fade) if fade.total > 0 => fade.remaining as f32 / fade.total as f32,
            Some(_) => 0.0,
            None => 1.0,
        }
    }
}

/// Mixes any number of voices into an interleaved output buffer.
pub struct Mixer {
    voices: Vec<ActiveVoice>,
    num_channels: u16,
    sample_rate: u32,
    finished_tx: crossbeam_channel::Sender<VoiceId>,
}

impl Mixer {
    /// Creates a new mixer. The ID of every voice that leaves the mixer is sent to
    /// `finished_tx`.
    pub fn new(
        num_channels: u16,
        sample_rate: u32,
        finished_tx: crossbeam_channel::Sender<VoiceId>,
    ) -> Mixer {
        Mixer {
            voices: Vec::new(),
            num_channels: num_channels.max(1),
            sample_rate,
            finished_tx,
        }
    }

    /// Applies a single command.
    pub fn apply(&mut self, command: Command) {
        match command {
            Command::Play { voice, buffer } => {
                let step = if self.sample_rate == 0 {
                    1.0
                } else {
                    buffer.sample_rate() as f64 / self.sample_rate as f64
                };
                self.voices.push(ActiveVoice {
                    id: voice,
                    buffer,
                    position: 0.0,
                    step,
                    fade: None,
                });
            }
            Command::Stop { voice, fade_frames } => {
                if fade_frames == 0 {
                    self.remove(|v| v.id == voice);
                } else if let Some(active) = self.voices.iter_mut().find(|v| v.id == voice) {
                    // A second stop never lengthens a fade already in progress.
                    let remaining = active
                        .fade
                        .map(|fade| fade.remaining.min(fade_frames))
                        .unwrap_or(fade_frames);
                    active.fade = Some(Fade {
                        remaining,
                        total: active.fade.map(|fade| fade.total).unwrap_or(fade_frames),
                    });
                }
            }
            Command::StopAll => self.remove(|_| true),
        }
    }

    fn remove<F: Fn(&ActiveVoice) -> bool>(&mut self, predicate: F) {
        let finished_tx = &self.finished_tx;
        self.voices.retain(|voice| {
            if predicate(voice) {
                let _ = finished_tx.send(voice.id);
                false
            } else {
                true
            }
        });
    }

    /// Renders into the interleaved output buffer, overwriting its contents.
    pub fn process_into_output(&mut self, output: &mut [f32]) {
        output.fill(0.0);
        let num_channels = self.num_channels as usize;
        let finished_tx = &self.finished_tx;

        self.voices.retain_mut(|voice| {
            for frame in output.chunks_exact_mut(num_channels) {
                let gain = voice.gain();
                for (channel, out) in frame.iter_mut().enumerate() {
                    match voice.sample(channel) {
                        Some(sample) => *out += sample * gain,
                        None => {
                            let _ = finished_tx.send(voice.id);
                            return false;
                        }
                    }
                }

                voice.position += voice.step;
                if let Some(fade) = voice.fade.as_mut() {
                    fade.remaining = fade.remaining.saturating_sub(1);
                    if fade.remaining == 0 {
                        let _ = finished_tx.send(voice.id);
                        return false;
                    }
                }
            }
            true
        });
    }

    /// Returns the IDs of the voices still being rendered.
    pub fn active_voices(&self) -> Vec<VoiceId> {
        self.voices.iter().map(|voice| voice.id).collect()
    }

    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixer(num_channels: u16, sample_rate: u32) -> (Mixer, crossbeam_channel::Receiver<VoiceId>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Mixer::new(num_channels, sample_rate, tx), rx)
    }

    fn constant(value: f32, frames: usize, channels: u16, sample_rate: u32) -> Arc<DecodedBuffer> {
        Arc::new(DecodedBuffer::new(
            vec![value; frames * channels as usize],
            channels,
            sample_rate,
        ))
    }

    #[test]
    fn test_mono_voice_fills_every_output_channel() {
        let (mut mixer, _rx) = mixer(2, 44100);
        mixer.apply(Command::Play {
            voice: 1,
            buffer: constant(0.5, 10, 1, 44100),
        });

        let mut output = vec![0.0; 8];
        mixer.process_into_output(&mut output);
        assert!(output.iter().all(|s| (*s - 0.5).abs() < f32::EPSILON));
    }

    #[test]
    fn test_overlapping_voices_sum() {
        let (mut mixer, _rx) = mixer(1, 44100);
        for voice in [1, 2] {
            mixer.apply(Command::Play {
                voice,
                buffer: constant(0.25, 10, 1, 44100),
            });
        }

        let mut output = vec![0.0; 4];
        mixer.process_into_output(&mut output);
        assert!(output.iter().all(|s| (*s - 0.5).abs() < f32::EPSILON));
        assert_eq!(mixer.active_voices(), vec![1, 2]);
    }

    #[test]
    fn test_voice_finishes_at_end_of_buffer() {
        let (mut mixer, rx) = mixer(1, 44100);
        mixer.apply(Command::Play {
            voice: 7,
            buffer: constant(1.0, 3, 1, 44100),
        });

        let mut output = vec![0.0; 5];
        mixer.process_into_output(&mut output);

        assert_eq!(output, vec![1.0, 1.0, 1.0, 0.0, 0.0]);
        assert!(mixer.active_voices().is_empty());
        assert_eq!(rx.try_recv(), Ok(7));
    }

    #[test]
    fn test_immediate_stop() {
        let (mut mixer, rx) = mixer(1, 44100);
        mixer.apply(Command::Play {
            voice: 1,
            buffer: constant(1.0, 100, 1, 44100),
        });
        mixer.apply(Command::Stop {
            voice: 1,
            fade_frames: 0,
        });

        let mut output = vec![0.0; 4];
        mixer.process_into_output(&mut output);
        assert_eq!(output, vec![0.0; 4]);
        assert_eq!(rx.try_recv(), Ok(1));

        // Unknown voices are ignored.
        mixer.apply(Command::Stop {
            voice: 99,
            fade_frames: 0,
        });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_linear_fade_out() {
        let (mut mixer, rx) = mixer(1, 44100);
        mixer.apply(Command::Play {
            voice: 1,
            buffer: constant(1.0, 100, 1, 44100),
        });
        mixer.apply(Command::Stop {
            voice: 1,
            fade_frames: 4,
        });

        let mut output = vec![0.0; 6];
        mixer.process_into_output(&mut output);

        assert_eq!(output, vec![1.0, 0.75, 0.5, 0.25, 0.0, 0.0]);
        assert_eq!(rx.try_recv(), Ok(1));
    }

    #[test]
    fn test_rate_conversion_interpolates() {
        // A 22050Hz ramp played at 44100Hz lands halfway between source frames.
        let (mut mixer, _rx) = mixer(1, 44100);
        mixer.apply(Command::Play {
            voice: 1,
            buffer: Arc::new(DecodedBuffer::new(vec![0.0, 1.0, 0.0], 1, 22050)),
        });

        let mut output = vec![0.0; 4];
        mixer.process_into_output(&mut output);
        assert_eq!(output, vec![0.0, 0.5, 1.0, 0.5]);
    }

    #[test]
    fn test_stop_all() {
        let (mut mixer, rx) = mixer(2, 48000);
        for voice in 1..=3 {
            mixer.apply(Command::Play {
                voice,
                buffer: constant(0.1, 10, 2, 48000),
            });
        }
        mixer.apply(Command::StopAll);

        assert!(mixer.active_voices().is_empty());
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
