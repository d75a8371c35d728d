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

//! Voice bookkeeping for the playback controller.
//!
//! A voice is either queued (its note is still loading) or sounding on the output
//! device. The manager enforces the global voice limit by stealing the oldest.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::warn;

use crate::audio::VoiceId;
use crate::note::SampleKey;

/// Global voice ID counter.
static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

/// A reference to one voice started by the controller. Dead once the voice is
/// stopped, finishes, or its note is released.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaybackHandle {
    voice: VoiceId,
    key: SampleKey,
}

impl PlaybackHandle {
    pub fn voice(&self) -> VoiceId {
        self.voice
    }

    /// Returns the note this voice plays.
    pub fn key(&self) -> &SampleKey {
        &self.key
    }
}

impl fmt::Display for PlaybackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.key, self.voice)
    }
}

/// A voice owned by the controller.
pub(super) struct Voice {
    id: VoiceId,
    key: SampleKey,
    /// When the voice was requested. Used to pick the oldest when stealing.
    created: Instant,
    /// When the voice reached the device. None while queued.
    sounding_since: Option<Instant>,
}

impl Voice {
    pub(super) fn new(key: SampleKey) -> Voice {
        Voice {
            id: NEXT_VOICE_ID.fetch_add(1, Ordering::SeqCst),
            key,
            created: Instant::now(),
            sounding_since: None,
        }
    }

    pub(super) fn id(&self) -> VoiceId {
        self.id
    }

    pub(super) fn key(&self) -> &SampleKey {
        &self.key
    }

    pub(super) fn is_sounding(&self) -> bool {
        self.sounding_since.is_some()
    }

    pub(super) fn sounding_since(&self) -> Option<Instant> {
        self.sounding_since
    }

    pub(super) fn handle(&self) -> PlaybackHandle {
        PlaybackHandle {
            voice: self.id,
            key: self.key.clone(),
        }
    }
}

/// Tracks every queued and sounding voice.
pub(super) struct VoiceManager {
    voices: Vec<Voice>,
    max_voices: u32,
}

impl VoiceManager {
    pub(super) fn new(max_voices: u32) -> VoiceManager {
        VoiceManager {
            voices: Vec::new(),
            max_voices: max_voices.max(1),
        }
    }

    /// Adds a voice, stealing the oldest voices while the limit is exceeded.
    /// Returns the stolen voices so the caller can silence them.
    pub(super) fn add(&mut self, voice: Voice) -> Vec<Voice> {
        let mut stolen = Vec::new();
        while self.voices.len() >= self.max_voices as usize {
            let Some(oldest) = self
                .voices
                .iter()
                .enumerate()
                .min_by_key(|(_, v)| v.created)
                .map(|(idx, _)| idx)
            else {
                break;
            };
            let victim = self.voices.remove(oldest);
            warn!(
                max_voices = self.max_voices,
                key = %victim.key,
                voice = victim.id,
                "Voice limit reached, stealing oldest"
            );
            stolen.push(victim);
        }

        self.voices.push(voice);
        stolen
    }

    pub(super) fn get(&self, id: VoiceId) -> Option<&Voice> {
        self.voices.iter().find(|v| v.id == id)
    }

    pub(super) fn remove(&mut self, id: VoiceId) -> Option<Voice> {
        let idx = self.voices.iter().position(|v| v.id == id)?;
        Some(self.voices.remove(idx))
    }

    /// Marks a queued voice as sounding.
    pub(super) fn mark_sounding(&mut self, id: VoiceId) {
        if let Some(voice) = self.voices.iter_mut().find(|v| v.id == id) {
            voice.sounding_since = Some(Instant::now());
        }
    }

    /// Returns the queued voices of a note in the order they were started.
    pub(super) fn queued_for(&self, key: &SampleKey) -> Vec<VoiceId> {
        self.voices
            .iter()
            .filter(|v| &v.key == key && !v.is_sounding())
            .map(|v| v.id)
            .collect()
    }

    /// Removes every voice of a note matching the predicate.
    pub(super) fn remove_for<F: Fn(&Voice) -> bool>(
        &mut self,
        key: &SampleKey,
        predicate: F,
    ) -> Vec<Voice> {
        let (removed, kept) = std::mem::take(&mut self.voices)
            .into_iter()
            .partition(|v| &v.key == key && predicate(v));
        self.voices = kept;
        removed
    }

    /// Returns true if any voice of the note is sounding.
    pub(super) fn is_sounding(&self, key: &SampleKey) -> bool {
        self.voices.iter().any(|v| &v.key == key && v.is_sounding())
    }

    /// Returns the number of sounding voices.
    pub(super) fn sounding_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_sounding()).count()
    }

    /// Clears all voices, returning them.
    pub(super) fn clear(&mut self) -> Vec<Voice> {
        std::mem::take(&mut self.voices)
    }
}

impl fmt::Debug for VoiceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceManager")
            .field("voices", &self.voices.len())
            .field("sounding", &self.sounding_count())
            .field("max_voices", &self.max_voices)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(note: &str) -> SampleKey {
        SampleKey::new("marimba", note).unwrap()
    }

    #[test]
    fn test_voice_ids_are_unique() {
        let a = Voice::new(key("C4"));
        let b = Voice::new(key("C4"));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.handle().key(), b.handle().key());
        assert_ne!(a.handle(), b.handle());
    }

    #[test]
    fn test_queued_then_sounding() {
        let mut manager = VoiceManager::new(8);
        let voice = Voice::new(key("C4"));
        let id = voice.id();
        manager.add(voice);

        assert_eq!(manager.queued_for(&key("C4")), vec![id]);
        assert!(!manager.is_sounding(&key("C4")));
        assert_eq!(manager.sounding_count(), 0);

        manager.mark_sounding(id);
        assert!(manager.queued_for(&key("C4")).is_empty());
        assert!(manager.is_sounding(&key("C4")));
        assert!(manager.get(id).and_then(|v| v.sounding_since()).is_some());
    }

    #[test]
    fn test_global_limit_steals_oldest() {
        let mut manager = VoiceManager::new(2);
        let first = Voice::new(key("C4"));
        let first_id = first.id();

        assert!(manager.add(first).is_empty());
        assert!(manager.add(Voice::new(key("D4"))).is_empty());

        let stolen = manager.add(Voice::new(key("E4")));
        assert_eq!(stolen.len(), 1);
        assert_eq!(stolen[0].id(), first_id);
        assert!(manager.get(first_id).is_none());
    }

    #[test]
    fn test_remove_for_key() {
        let mut manager = VoiceManager::new(8);
        let queued = Voice::new(key("C4"));
        let sounding = Voice::new(key("C4"));
        let sounding_id = sounding.id();
        manager.add(queued);
        manager.add(sounding);
        manager.add(Voice::new(key("Db4")));
        manager.mark_sounding(sounding_id);

        let removed = manager.remove_for(&key("C4"), |v| !v.is_sounding());
        assert_eq!(removed.len(), 1);

        let removed = manager.remove_for(&key("C4"), |_| true);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id(), sounding_id);

        assert_eq!(manager.clear().len(), 1);
    }
}
