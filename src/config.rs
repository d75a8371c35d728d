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
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use config::{Config, Environment, File};
use tracing::info;

use crate::fetch::{HttpRemote, SampleFetcher};
use crate::playback::{PlaybackController, Settings};
use crate::store;

mod audio;
mod engine;
mod error;

pub use self::audio::Audio;
pub use self::engine::Engine;
pub use self::error::ConfigError;

/// Environment variables with this prefix override the config file, e.g.
/// NOTEFONT_BASE_URL or NOTEFONT_AUDIO__DEVICE.
pub const ENV_PREFIX: &str = "NOTEFONT";

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn build(path: Option<&Path>, environment: Environment) -> Result<Engine, ConfigError> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path));
    }

    Ok(builder
        .add_source(environment)
        .build()?
        .try_deserialize::<Engine>()?)
}

/// Loads the engine configuration from an optional YAML file, overlaid with
/// NOTEFONT_ environment variables.
pub fn load(path: Option<&Path>) -> Result<Engine, ConfigError> {
    build(path, environment())
}

/// Creates the fetcher described by the configuration.
pub fn init_fetcher(config: &Engine) -> Result<Arc<SampleFetcher>, Box<dyn Error>> {
    let store = store::open(config.cache_dir())?;
    let remote = HttpRemote::new(config.request_timeout()?)?;
    info!(
        base_url = config.base_url(),
        cache_dir = ?config.cache_dir(),
        "Sample fetcher ready"
    );

    Ok(Arc::new(SampleFetcher::new(
        store,
        Arc::new(remote),
        config.base_url(),
    )))
}

/// Creates the playback controller described by the configuration.
pub fn init_controller(config: &Engine) -> Result<PlaybackController, Box<dyn Error>> {
    let fetcher = init_fetcher(config)?;
    Ok(PlaybackController::new(
        fetcher,
        Settings::from_config(config)?,
    ))
}
