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

//! Decoding of encoded samples into PCM.
//!
//! Samples are decoded entirely into memory so that starting a voice never has to
//! touch the decoder.

use std::fmt;
use std::io::Cursor;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

/// Errors produced while decoding a sample.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecodeError {
    #[error("unrecognized audio format: {0}")]
    Probe(String),

    #[error("no audio track found")]
    NoTrack,

    #[error("unsupported or malformed audio: {0}")]
    Codec(String),

    #[error("sample contains no audio")]
    Empty,
}

/// Decoded PCM audio, interleaved, ready for playback.
pub struct DecodedBuffer {
    samples: Vec<f32>,
    channel_count: u16,
    sample_rate: u32,
}

impl DecodedBuffer {
    /// Creates a buffer from interleaved samples.
    pub fn new(samples: Vec<f32>, channel_count: u16, sample_rate: u32) -> DecodedBuffer {
        DecodedBuffer {
            samples,
            channel_count: channel_count.max(1),
            sample_rate,
        }
    }

    /// Returns the interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Returns the samples for one frame, or None past the end.
    #[inline]
    pub fn frame(&self, index: usize) -> Option<&[f32]> {
        let channels = self.channel_count as usize;
        let start = index * channels;
        self.samples.get(start..start + channels)
    }

    /// Returns the number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channel_count as usize
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the playback length of the buffer.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f32>()
    }
}

impl fmt::Debug for DecodedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedBuffer")
            .field("channels", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .field("frames", &self.frames())
            .finish()
    }
}

/// Decodes a complete encoded sample (MP3, WAV, OGG, FLAC...) into memory.
pub fn decode(bytes: &[u8]) -> Result<DecodedBuffer, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let probed = get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Probe(e.to_string()))?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;
    let track_id = track.id;
    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Codec(e.to_string()))?;

    let mut samples = Vec::new();
    let mut channel_count = track.codec_params.channels.map(|c| c.count() as u16);
    let mut sample_rate = track.codec_params.sample_rate;
    let mut sample_buffer: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            // Some readers report the end of the stream as a decode error.
            Err(SymphoniaError::DecodeError(_)) => break,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(DecodeError::Codec(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A corrupt frame is skipped, the rest of the sample is still usable.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(DecodeError::Codec(e.to_string())),
        };

        let spec = *decoded.spec();
        channel_count.get_or_insert(spec.channels.count() as u16);
        sample_rate.get_or_insert(spec.rate);

        let needs_buffer = sample_buffer
            .as_ref()
            .map(|buf| buf.capacity() < decoded.capacity() * spec.channels.count())
            .unwrap_or(true);
        if needs_buffer {
            sample_buffer = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }
        if let Some(buf) = sample_buffer.as_mut() {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    let (Some(channel_count), Some(sample_rate)) = (channel_count, sample_rate) else {
        return Err(DecodeError::Empty);
    };
    if samples.is_empty() || channel_count == 0 {
        return Err(DecodeError::Empty);
    }

    Ok(DecodedBuffer::new(samples, channel_count, sample_rate))
}
