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
use std::path::{Path, PathBuf};
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::audio::Audio;
use super::error::ConfigError;
use crate::fetch::DEFAULT_BASE_URL;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);
const DEFAULT_DELAY_PRESS_OUT: Duration = Duration::from_millis(700);
const DEFAULT_FADE_OUT_DURATION: Duration = Duration::from_millis(700);

/// The configuration for the sample engine.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Engine {
    /// The root of the sample-font mirror.
    base_url: Option<String>,

    /// Where fetched samples are cached. Without one, samples are cached in memory
    /// for the life of the process.
    cache_dir: Option<PathBuf>,

    /// How long a single sample download may take.
    request_timeout: Option<String>,

    /// The minimum time a voice sounds before a press-out stops it.
    delay_press_out: Option<String>,

    /// Whether stopped voices fade out instead of cutting off.
    fade_out: Option<bool>,

    /// The length of the fade-out.
    fade_out_duration: Option<String>,

    /// The audio configuration.
    audio: Option<Audio>,
}

fn parse_duration(
    field: &'static str,
    value: Option<&String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => DurationString::from_string(value.clone())
            .map(Duration::from)
            .map_err(|e| ConfigError::Duration {
                field,
                value: value.clone(),
                reason: e.to_string(),
            }),
        None => Ok(default),
    }
}

impl Engine {
    /// Sets the cache directory.
    pub fn with_cache_dir(mut self, cache_dir: &Path) -> Engine {
        self.cache_dir = Some(cache_dir.to_path_buf());
        self
    }

    /// Sets the audio configuration.
    pub fn with_audio(mut self, audio: Audio) -> Engine {
        self.audio = Some(audio);
        self
    }

    /// Returns the base URL of the sample-font mirror.
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// Returns the request timeout (default: 8s).
    pub fn request_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration(
            "request_timeout",
            self.request_timeout.as_ref(),
            DEFAULT_REQUEST_TIMEOUT,
        )
    }

    /// Returns the minimum hold before a press-out (default: 700ms).
    pub fn delay_press_out(&self) -> Result<Duration, ConfigError> {
        parse_duration(
            "delay_press_out",
            self.delay_press_out.as_ref(),
            DEFAULT_DELAY_PRESS_OUT,
        )
    }

    /// Returns the fade-out applied when stopping a voice, or None when fading is
    /// disabled (the default). The duration defaults to 700ms.
    pub fn fade_out(&self) -> Result<Option<Duration>, ConfigError> {
        if !self.fade_out.unwrap_or(false) {
            return Ok(None);
        }
        parse_duration(
            "fade_out_duration",
            self.fade_out_duration.as_ref(),
            DEFAULT_FADE_OUT_DURATION,
        )
        .map(Some)
    }

    /// Returns the audio configuration.
    pub fn audio(&self) -> Audio {
        self.audio.clone().unwrap_or_default()
    }
}
