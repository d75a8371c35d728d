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
use std::{fmt, sync::Arc, thread, time::Duration};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{error, info, span, Level};

use crate::audio::mixer::{Command, Mixer};
use crate::audio::{Device as AudioDevice, OutputError, VoiceId};
use crate::decode::DecodedBuffer;

/// A wrapper around a cpal output stream. The stream lives on its own thread and
/// the audio callback owns the mixer; voices are handed to it over a channel.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The host the device belongs to.
    host_id: cpal::HostId,
    /// The number of output channels of the stream.
    num_channels: u16,
    /// The output sample rate of the stream.
    sample_rate: u32,
    /// Commands for the mixer inside the audio callback.
    command_tx: crossbeam_channel::Sender<Command>,
    /// Voices the mixer has finished with.
    finished_rx: crossbeam_channel::Receiver<VoiceId>,
    /// Dropping this wakes the output thread so it can tear the stream down.
    shutdown_tx: Mutex<Option<crossbeam_channel::Sender<()>>>,
    /// Handle to the thread that keeps the stream alive.
    output_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}, SampleRate={}) ({})",
            self.name,
            self.num_channels,
            self.sample_rate,
            self.host_id.name()
        )
    }
}

/// Builds the audio callback for the given output sample type.
fn create_callback<T>(
    mut mixer: Mixer,
    command_rx: crossbeam_channel::Receiver<Command>,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        while let Ok(command) = command_rx.try_recv() {
            mixer.apply(command);
        }

        // Only allocates when the host asks for a larger buffer than before.
        scratch.resize(data.len(), 0.0);
        mixer.process_into_output(&mut scratch);

        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

fn stream_error(err: cpal::StreamError) {
    error!(err = %err, "Output stream error");
}

/// Creates the output stream in the device's native sample format.
fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    mixer: Mixer,
    command_rx: crossbeam_channel::Receiver<Command>,
) -> Result<cpal::Stream, OutputError> {
    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_output_stream(
            config,
            create_callback::<f32>(mixer, command_rx),
            stream_error,
            None,
        ),
        cpal::SampleFormat::F64 => device.build_output_stream(
            config,
            create_callback::<f64>(mixer, command_rx),
            stream_error,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_output_stream(
            config,
            create_callback::<i16>(mixer, command_rx),
            stream_error,
            None,
        ),
        cpal::SampleFormat::I32 => device.build_output_stream(
            config,
            create_callback::<i32>(mixer, command_rx),
            stream_error,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_output_stream(
            config,
            create_callback::<u16>(mixer, command_rx),
            stream_error,
            None,
        ),
        other => return Err(OutputError::UnsupportedFormat(format!("{:?}", other))),
    };

    stream.map_err(|e| OutputError::Device(e.to_string()))
}

impl Device {
    /// Lists the names of every output device on every available host.
    pub fn list() -> Result<Vec<String>, OutputError> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout().map_err(|e| OutputError::Device(e.to_string()))?;
        let _shh_stderr = shh::stderr().map_err(|e| OutputError::Device(e.to_string()))?;

        let mut names = Vec::new();
        for host_id in cpal::available_hosts() {
            let host = match cpal::host_from_id(host_id) {
                Ok(host) => host,
                Err(e) => {
                    error!(err = %e, host = host_id.name(), "Unable to open host");
                    continue;
                }
            };
            let devices = match host.output_devices() {
                Ok(devices) => devices,
                Err(e) => {
                    error!(err = %e, host = host_id.name(), "Unable to list devices for host");
                    continue;
                }
            };

            names.extend(devices.filter_map(|device| device.name().ok()));
        }

        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Finds an output device on the default host. "default" selects the host's
    /// default output device.
    fn find(name: &str) -> Result<(cpal::Device, cpal::HostId), OutputError> {
        let host = cpal::default_host();
        if name == "default" {
            return host
                .default_output_device()
                .map(|device| (device, host.id()))
                .ok_or_else(|| OutputError::NoDevice(name.to_string()));
        }

        let _shh_stdout = shh::stdout().map_err(|e| OutputError::Device(e.to_string()))?;
        let _shh_stderr = shh::stderr().map_err(|e| OutputError::Device(e.to_string()))?;
        host.output_devices()
            .map_err(|e| OutputError::Device(e.to_string()))?
            .find(|device| {
                device
                    .name()
                    .map(|device_name| device_name.trim() == name)
                    .unwrap_or(false)
            })
            .map(|device| (device, host.id()))
            .ok_or_else(|| OutputError::NoDevice(name.to_string()))
    }

    /// Opens the named device and starts its output stream.
    pub fn open(name: &str) -> Result<Device, OutputError> {
        let span = span!(Level::INFO, "open device (cpal)");
        let _enter = span.enter();

        let (device, host_id) = Device::find(name)?;
        let device_name = device.name().unwrap_or_else(|_| name.to_string());
        let supported = device
            .default_output_config()
            .map_err(|e| OutputError::Device(e.to_string()))?;
        let sample_format = supported.sample_format();
        let stream_config: cpal::StreamConfig = supported.config();
        let num_channels = stream_config.channels;
        let sample_rate = stream_config.sample_rate.0;

        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (finished_tx, finished_rx) = crossbeam_channel::unbounded();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let mixer = Mixer::new(num_channels, sample_rate, finished_tx);

        // The stream is created inside the thread as it can't cross threads on
        // every platform.
        let output_thread = thread::spawn(move || {
            let stream = match build_stream(
                &device,
                &stream_config,
                sample_format,
                mixer,
                command_rx,
            ) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(OutputError::Device(e.to_string())));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Returns once the sender is dropped.
            let _ = shutdown_rx.recv();
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = output_thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = output_thread.join();
                return Err(OutputError::Device(
                    "output thread exited before the stream started".to_string(),
                ));
            }
        }

        info!(
            device = device_name,
            channels = num_channels,
            sample_rate,
            format = ?sample_format,
            "Output stream started"
        );

        Ok(Device {
            name: device_name,
            host_id,
            num_channels,
            sample_rate,
            command_tx,
            finished_rx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            output_thread: Mutex::new(Some(output_thread)),
        })
    }

    fn fade_frames(&self, fade_out: Option<Duration>) -> usize {
        fade_out
            .map(|fade| (fade.as_secs_f64() * self.sample_rate as f64).round() as usize)
            .unwrap_or(0)
    }
}

impl AudioDevice for Device {
    fn play(&self, voice: VoiceId, buffer: Arc<DecodedBuffer>) -> Result<(), OutputError> {
        self.command_tx
            .send(Command::Play { voice, buffer })
            .map_err(|_| OutputError::Closed)
    }

    fn stop(&self, voice: VoiceId, fade_out: Option<Duration>) {
        let fade_frames = self.fade_frames(fade_out);
        let _ = self.command_tx.send(Command::Stop { voice, fade_frames });
    }

    fn finished(&self) -> Vec<VoiceId> {
        self.finished_rx.try_iter().collect()
    }

    fn close(&self) {
        let _ = self.command_tx.send(Command::StopAll);
        if self.shutdown_tx.lock().take().is_none() {
            return;
        }
        if let Some(output_thread) = self.output_thread.lock().take() {
            if output_thread.join().is_err() {
                error!(device = self.name, "Output thread panicked");
            }
        }
        info!(device = self.name, "Output stream closed");
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<super::mock::Device>, OutputError> {
        Err(OutputError::Device("not a mock".to_string()))
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.close();
    }
}
