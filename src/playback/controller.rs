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
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures_util::future::{self, join_all, BoxFuture, Shared};
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, span, warn, Level};

use crate::audio::{self, Device};
use crate::config;
use crate::decode::{self, DecodedBuffer};
use crate::fetch::SampleFetcher;
use crate::note::SampleKey;

use super::state::{NoteEvent, NoteState};
use super::voice::{PlaybackHandle, Voice, VoiceManager};
use super::PlaybackError;

const EVENT_CAPACITY: usize = 256;
const REAP_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_DELAY_PRESS_OUT: Duration = Duration::from_millis(700);

type LoadResult = Result<Arc<DecodedBuffer>, PlaybackError>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

/// Playback behaviour of the controller.
#[derive(Debug, Clone)]
pub struct Settings {
    delay_press_out: Duration,
    fade_out: Option<Duration>,
    audio: config::Audio,
}

impl Settings {
    /// Reads the playback settings from the engine configuration.
    pub fn from_config(config: &config::Engine) -> Result<Settings, config::ConfigError> {
        Ok(Settings {
            delay_press_out: config.delay_press_out()?,
            fade_out: config.fade_out()?,
            audio: config.audio(),
        })
    }

    /// Sets the audio device and voice limit.
    pub fn with_audio(mut self, audio: config::Audio) -> Settings {
        self.audio = audio;
        self
    }

    /// Sets the fade applied by `stop`. None stops voices immediately.
    pub fn with_fade_out(mut self, fade_out: Option<Duration>) -> Settings {
        self.fade_out = fade_out;
        self
    }

    /// Sets how long `press_out` keeps a voice sounding.
    pub fn with_delay_press_out(mut self, delay_press_out: Duration) -> Settings {
        self.delay_press_out = delay_press_out;
        self
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            delay_press_out: DEFAULT_DELAY_PRESS_OUT,
            fade_out: None,
            audio: config::Audio::default(),
        }
    }
}

/// Where a note is in its lifecycle. Playing is derived from the voices.
enum Phase {
    Idle,
    Loading { generation: u64, load: SharedLoad },
    Ready { buffer: Arc<DecodedBuffer> },
}

struct Slot {
    phase: Phase,
    state_tx: watch::Sender<NoteState>,
}

impl Slot {
    fn new() -> Slot {
        let (state_tx, _) = watch::channel(NoteState::Idle);
        Slot {
            phase: Phase::Idle,
            state_tx,
        }
    }
}

struct State {
    notes: HashMap<SampleKey, Slot>,
    voices: VoiceManager,
    /// Opened on the first voice and closed by shutdown.
    device: Option<Arc<dyn Device>>,
    /// Identifies a load so that a result arriving after a release is discarded.
    next_generation: u64,
}

impl State {
    fn slot(&mut self, key: &SampleKey) -> &mut Slot {
        self.notes.entry(key.clone()).or_insert_with(Slot::new)
    }
}

/// How press-out waits before stopping a voice.
enum Hold {
    /// The voice is sounding and must keep sounding for this long.
    Sounding(Duration),
    /// The voice is queued; wait for the note to change state.
    Queued(Option<watch::Receiver<NoteState>>),
}

struct Inner {
    me: Weak<Inner>,
    fetcher: Arc<SampleFetcher>,
    settings: Settings,
    state: Mutex<State>,
    /// Serializes device opening, which happens outside the state lock.
    opening: Mutex<()>,
    events: broadcast::Sender<NoteEvent>,
}

/// Fetches and decodes one sample.
async fn fetch_and_decode(fetcher: &SampleFetcher, key: &SampleKey) -> LoadResult {
    let started = Instant::now();
    let blob = fetcher.resolve_key(key).await?;
    let buffer = tokio::task::spawn_blocking(move || decode::decode(&blob))
        .await
        .map_err(|e| PlaybackError::Aborted(e.to_string()))??;

    info!(
        key = %key,
        channels = buffer.channel_count(),
        sample_rate = buffer.sample_rate(),
        frames = buffer.frames(),
        elapsed = ?started.elapsed(),
        "Sample loaded"
    );
    Ok(Arc::new(buffer))
}

impl Inner {
    fn emit(&self, event: NoteEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Recomputes the state of a note and publishes it if it changed.
    fn refresh(&self, state: &mut State, key: &SampleKey) {
        let sounding = state.voices.is_sounding(key);
        let Some(slot) = state.notes.get_mut(key) else {
            return;
        };
        let current = match slot.phase {
            Phase::Idle => NoteState::Idle,
            Phase::Loading { .. } => NoteState::Loading,
            Phase::Ready { .. } if sounding => NoteState::Playing,
            Phase::Ready { .. } => NoteState::Ready,
        };

        let changed = slot.state_tx.send_if_modified(|previous| {
            if *previous == current {
                return false;
            }
            *previous = current;
            true
        });
        if changed {
            debug!(key = %key, state = %current, "Note state changed");
            self.emit(NoteEvent::StateChanged {
                key: key.clone(),
                state: current,
            });
        }
    }

    /// Forgets voices the device has finished with.
    fn reap(&self, state: &mut State) {
        let Some(device) = state.device.clone() else {
            return;
        };
        for id in device.finished() {
            if let Some(voice) = state.voices.remove(id) {
                debug!(key = %voice.key(), voice = id, "Voice finished");
                self.refresh(state, voice.key());
            }
        }
    }

    /// Opens the output device if it isn't open yet. Opening can block while the
    /// device starts, so the state lock is not held meanwhile and other notes keep
    /// working.
    fn open_device(&self) -> Result<Arc<dyn Device>, PlaybackError> {
        if let Some(device) = self.state.lock().device.clone() {
            return Ok(device);
        }

        let _opening = self.opening.lock();
        if let Some(device) = self.state.lock().device.clone() {
            return Ok(device);
        }

        let device = audio::open(&self.settings.audio)?;
        info!(device = %device, "Opened audio device");
        self.state.lock().device = Some(device.clone());
        self.spawn_reaper(&device);
        Ok(device)
    }

    /// Returns the output device. Callers open it with `open_device` before taking
    /// the state lock; this only opens it when a shutdown raced in between.
    fn device(&self, state: &mut State) -> Result<Arc<dyn Device>, PlaybackError> {
        if let Some(device) = &state.device {
            return Ok(device.clone());
        }

        let device = audio::open(&self.settings.audio)?;
        info!(device = %device, "Opened audio device");
        state.device = Some(device.clone());
        self.spawn_reaper(&device);
        Ok(device)
    }

    /// Whether the note has voices waiting on its load.
    fn has_queued(&self, key: &SampleKey) -> bool {
        !self.state.lock().voices.queued_for(key).is_empty()
    }

    fn is_ready(&self, key: &SampleKey) -> bool {
        matches!(
            self.state.lock().notes.get(key).map(|slot| &slot.phase),
            Some(Phase::Ready { .. })
        )
    }

    /// Periodically reaps finished voices so that observers see Playing go back to
    /// Ready without the caller touching the controller. Ends with the device.
    fn spawn_reaper(&self, device: &Arc<dyn Device>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime, finished voices are reaped on demand");
            return;
        };

        let inner = self.me.clone();
        let device = Arc::downgrade(device);
        runtime.spawn(async move {
            let mut interval = tokio::time::interval(REAP_INTERVAL);
            loop {
                interval.tick().await;
                let (Some(inner), Some(_device)) = (inner.upgrade(), device.upgrade()) else {
                    break;
                };
                let mut state = inner.state.lock();
                inner.reap(&mut state);
            }
        });
    }

    /// Stops voices removed from the manager and republishes their notes.
    fn silence(&self, state: &mut State, voices: Vec<Voice>, fade_out: Option<Duration>) {
        for voice in voices {
            if voice.is_sounding() {
                if let Some(device) = &state.device {
                    device.stop(voice.id(), fade_out);
                }
            }
            self.refresh(state, voice.key());
        }
    }

    /// Returns the load for a note, starting one if the note is idle.
    fn begin_load(&self, state: &mut State, key: &SampleKey) -> SharedLoad {
        match &state.slot(key).phase {
            Phase::Ready { buffer } => return future::ready(Ok(buffer.clone())).boxed().shared(),
            Phase::Loading { load, .. } => {
                debug!(key = %key, "Joining in-flight load");
                return load.clone();
            }
            Phase::Idle => {}
        }

        state.next_generation += 1;
        let generation = state.next_generation;
        let load = self.spawn_load(key.clone(), generation);
        state.slot(key).phase = Phase::Loading {
            generation,
            load: load.clone(),
        };
        self.refresh(state, key);
        load
    }

    /// Runs the load as its own task so that it finishes, and applies queued
    /// voices, even if every caller stops waiting for it.
    fn spawn_load(&self, key: SampleKey, generation: u64) -> SharedLoad {
        let inner = self.me.clone();
        let fetcher = self.fetcher.clone();
        let task = tokio::spawn(async move {
            let result = fetch_and_decode(&fetcher, &key).await;
            if let Some(inner) = inner.upgrade() {
                inner.finish_load(&key, generation, &result);
            }
            result
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(PlaybackError::Aborted(e.to_string())))
        }
        .boxed()
        .shared()
    }

    /// Installs the result of a load and sounds or drops the voices queued on it.
    fn finish_load(&self, key: &SampleKey, generation: u64, result: &LoadResult) {
        let opened = match result {
            Ok(_) if self.has_queued(key) => Some(self.open_device()),
            _ => None,
        };

        let mut state = self.state.lock();
        let current = matches!(
            state.notes.get(key).map(|slot| &slot.phase),
            Some(Phase::Loading { generation: g, .. }) if *g == generation
        );
        if !current {
            debug!(key = %key, "Note released while loading, discarding result");
            return;
        }

        match result {
            Ok(buffer) => {
                state.slot(key).phase = Phase::Ready {
                    buffer: buffer.clone(),
                };

                let queued = state.voices.queued_for(key);
                if !queued.is_empty() {
                    let device = match opened {
                        Some(Err(e)) => Err(e),
                        _ => self.device(&mut state),
                    };
                    match device {
                        Ok(device) => {
                            for id in queued {
                                match device.play(id, buffer.clone()) {
                                    Ok(()) => {
                                        state.voices.mark_sounding(id);
                                        debug!(key = %key, voice = id, "Queued voice started");
                                    }
                                    Err(e) => {
                                        state.voices.remove(id);
                                        warn!(key = %key, voice = id, err = %e, "Unable to start queued voice");
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            let dropped = state.voices.remove_for(key, |v| !v.is_sounding());
                            warn!(
                                key = %key,
                                voices = dropped.len(),
                                err = %e,
                                "Unable to open audio device, dropping queued voices"
                            );
                        }
                    }
                }
            }
            Err(e) => {
                state.slot(key).phase = Phase::Idle;
                let dropped = state.voices.remove_for(key, |v| !v.is_sounding());
                error!(key = %key, err = %e, queued = dropped.len(), "Unable to load sample");
                self.emit(NoteEvent::LoadFailed {
                    key: key.clone(),
                    error: e.clone(),
                });
            }
        }
        self.refresh(&mut state, key);
    }

    /// Starts a voice, or queues it if the note is still loading.
    fn start_voice(
        &self,
        state: &mut State,
        key: &SampleKey,
    ) -> Result<PlaybackHandle, PlaybackError> {
        let buffer = match state.notes.get(key).map(|slot| &slot.phase) {
            None | Some(Phase::Idle) => return Err(PlaybackError::NotLoaded(key.clone())),
            Some(Phase::Loading { .. }) => None,
            Some(Phase::Ready { buffer }) => Some(buffer.clone()),
        };
        let device = match buffer {
            Some(_) => Some(self.device(state)?),
            None => None,
        };

        let voice = Voice::new(key.clone());
        let handle = voice.handle();
        let stolen = state.voices.add(voice);
        self.silence(state, stolen, None);

        match (buffer, device) {
            (Some(buffer), Some(device)) => {
                if let Err(e) = device.play(handle.voice(), buffer) {
                    state.voices.remove(handle.voice());
                    return Err(e.into());
                }
                state.voices.mark_sounding(handle.voice());
                debug!(key = %key, voice = handle.voice(), "Voice started");
            }
            _ => debug!(key = %key, voice = handle.voice(), "Note still loading, voice queued"),
        }

        self.refresh(state, key);
        Ok(handle)
    }
}

/// Loads, starts and stops note samples. Cloning the controller is cheap and every
/// clone drives the same voices.
#[derive(Clone)]
pub struct PlaybackController {
    inner: Arc<Inner>,
}

impl PlaybackController {
    /// Creates a new controller. The audio device isn't opened until the first voice
    /// needs it.
    pub fn new(fetcher: Arc<SampleFetcher>, settings: Settings) -> PlaybackController {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let max_voices = settings.audio.max_voices();
        let inner = Arc::new_cyclic(|me| Inner {
            me: me.clone(),
            fetcher,
            settings,
            state: Mutex::new(State {
                notes: HashMap::new(),
                voices: VoiceManager::new(max_voices),
                device: None,
                next_generation: 0,
            }),
            opening: Mutex::new(()),
            events,
        });
        PlaybackController { inner }
    }

    /// Returns the fetcher used to resolve samples.
    pub fn fetcher(&self) -> &Arc<SampleFetcher> {
        &self.inner.fetcher
    }

    /// Fetches and decodes a note. Concurrent loads of the same note, under any
    /// enharmonic spelling, share one fetch and one decoded buffer.
    pub async fn load(&self, instrument: &str, note: &str) -> LoadResult {
        let key = SampleKey::new(instrument, note)?;
        self.load_key(&key).await
    }

    /// Like `load`, for an already parsed key.
    pub async fn load_key(&self, key: &SampleKey) -> LoadResult {
        let load = {
            let mut state = self.inner.state.lock();
            self.inner.reap(&mut state);
            self.inner.begin_load(&mut state, key)
        };
        load.await
    }

    /// Loads every given note of an instrument concurrently. Results are in the
    /// order of the notes.
    pub async fn load_instrument<S: AsRef<str>>(
        &self,
        instrument: &str,
        notes: &[S],
    ) -> Vec<LoadResult> {
        if notes.is_empty() {
            warn!(instrument, "No notes given, nothing to load");
            return Vec::new();
        }

        let results = join_all(
            notes
                .iter()
                .map(|note| self.load(instrument, note.as_ref())),
        )
        .await;

        let loaded = results.iter().filter(|result| result.is_ok()).count();
        if loaded == results.len() {
            info!(instrument, notes = loaded, "Instrument loaded");
            self.inner.emit(NoteEvent::InstrumentLoaded {
                instrument: instrument.to_string(),
                notes: loaded,
            });
        } else {
            warn!(
                instrument,
                loaded,
                failed = results.len() - loaded,
                "Instrument partially loaded"
            );
        }
        results
    }

    /// Starts a new voice of a note. The note must be loaded or loading; a voice
    /// started while loading sounds once the load completes.
    pub fn start(&self, instrument: &str, note: &str) -> Result<PlaybackHandle, PlaybackError> {
        let key = SampleKey::new(instrument, note)?;
        self.start_key(&key)
    }

    /// Like `start`, for an already parsed key.
    pub fn start_key(&self, key: &SampleKey) -> Result<PlaybackHandle, PlaybackError> {
        if self.inner.is_ready(key) {
            self.inner.open_device()?;
        }

        let mut state = self.inner.state.lock();
        self.inner.reap(&mut state);
        self.inner.start_voice(&mut state, key)
    }

    /// Loads a note if needed, then starts it.
    pub async fn play(&self, instrument: &str, note: &str) -> Result<PlaybackHandle, PlaybackError> {
        let key = SampleKey::new(instrument, note)?;
        self.load_key(&key).await?;
        self.start_key(&key)
    }

    /// Stops one voice. A queued voice is cancelled and never sounds. Stopping a
    /// voice that already ended does nothing.
    pub fn stop(&self, handle: &PlaybackHandle) {
        let mut state = self.inner.state.lock();
        self.inner.reap(&mut state);

        let Some(voice) = state.voices.remove(handle.voice()) else {
            warn!(voice = %handle, "Stop requested for a voice that is not playing");
            return;
        };

        let fade_out = self.inner.settings.fade_out;
        if voice.is_sounding() {
            debug!(voice = %handle, fade_out = ?fade_out, "Stopping voice");
        } else {
            debug!(voice = %handle, "Cancelling queued voice");
        }
        self.inner.silence(&mut state, vec![voice], fade_out);
    }

    /// Stops a voice once it has sounded for at least the press-out delay. Meant
    /// for key-up, so a quick tap still produces an audible note.
    pub async fn press_out(&self, handle: &PlaybackHandle) {
        let delay = self.inner.settings.delay_press_out;
        loop {
            let hold = {
                let mut state = self.inner.state.lock();
                self.inner.reap(&mut state);
                let Some(voice) = state.voices.get(handle.voice()) else {
                    debug!(voice = %handle, "Voice already ended");
                    return;
                };
                match voice.sounding_since() {
                    Some(since) => Hold::Sounding(delay.saturating_sub(since.elapsed())),
                    None => Hold::Queued(
                        state
                            .notes
                            .get(handle.key())
                            .map(|slot| slot.state_tx.subscribe()),
                    ),
                }
            };

            match hold {
                Hold::Sounding(remaining) if remaining.is_zero() => break,
                Hold::Sounding(remaining) => tokio::time::sleep(remaining).await,
                Hold::Queued(Some(mut state_rx)) => {
                    if state_rx.changed().await.is_err() {
                        break;
                    }
                }
                Hold::Queued(None) => break,
            }
        }
        self.stop(handle);
    }

    /// Stops every voice of a note, including queued ones, and drops its decoded
    /// buffer. The next load decodes again.
    pub fn release(&self, instrument: &str, note: &str) -> Result<(), PlaybackError> {
        let key = SampleKey::new(instrument, note)?;
        self.release_key(&key);
        Ok(())
    }

    /// Like `release`, for an already parsed key.
    pub fn release_key(&self, key: &SampleKey) {
        let mut state = self.inner.state.lock();
        self.inner.reap(&mut state);

        if let Some(slot) = state.notes.get_mut(key) {
            slot.phase = Phase::Idle;
        }
        let voices = state.voices.remove_for(key, |_| true);
        let stopped = voices.len();
        self.inner.silence(&mut state, voices, None);
        self.inner.refresh(&mut state, key);
        info!(key = %key, voices = stopped, "Note released");
    }

    /// Returns the state of a note.
    pub fn state(&self, instrument: &str, note: &str) -> Result<NoteState, PlaybackError> {
        let key = SampleKey::new(instrument, note)?;
        Ok(self.state_of(&key))
    }

    /// Like `state`, for an already parsed key.
    pub fn state_of(&self, key: &SampleKey) -> NoteState {
        let mut state = self.inner.state.lock();
        self.inner.reap(&mut state);
        state
            .notes
            .get(key)
            .map(|slot| *slot.state_tx.borrow())
            .unwrap_or_default()
    }

    /// Returns the number of voices currently sounding.
    pub fn active_voices(&self) -> usize {
        let mut state = self.inner.state.lock();
        self.inner.reap(&mut state);
        state.voices.sounding_count()
    }

    /// Observes the state of one note.
    pub fn watch(
        &self,
        instrument: &str,
        note: &str,
    ) -> Result<watch::Receiver<NoteState>, PlaybackError> {
        let key = SampleKey::new(instrument, note)?;
        let mut state = self.inner.state.lock();
        Ok(state.slot(&key).state_tx.subscribe())
    }

    /// Observes every state change and load failure.
    pub fn subscribe(&self) -> broadcast::Receiver<NoteEvent> {
        self.inner.events.subscribe()
    }

    /// Stops every voice, drops every decoded buffer and closes the audio device.
    /// The controller stays usable; the device is opened again on the next voice.
    pub fn shutdown(&self) {
        let span = span!(Level::INFO, "shutdown");
        let _enter = span.enter();

        let mut state = self.inner.state.lock();
        let voices = state.voices.clear();
        if let Some(device) = state.device.take() {
            device.close();
            info!(device = %device, voices = voices.len(), "Audio device closed");
        }

        let keys: Vec<SampleKey> = state.notes.keys().cloned().collect();
        for key in keys {
            state.slot(&key).phase = Phase::Idle;
            self.inner.refresh(&mut state, &key);
        }
    }

    #[cfg(test)]
    fn mock_device(&self) -> Option<Arc<audio::mock::Device>> {
        self.inner
            .state
            .lock()
            .device
            .as_ref()
            .and_then(|device| device.to_mock().ok())
    }
}

impl fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("PlaybackController")
            .field("notes", &state.notes.len())
            .field("voices", &state.voices)
            .field("device_open", &state.device.is_some())
            .finish()
    }
}
