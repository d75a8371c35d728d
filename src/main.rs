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
use std::path::PathBuf;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use futures_util::future::join_all;
use tracing_subscriber::EnvFilter;

use notefont::{audio, config, store, Note};

const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Fetches, caches and plays sampled instrument notes."
)]
struct Cli {
    /// The path to the engine config. NOTEFONT_* environment variables override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetches samples into the cache.
    Fetch {
        /// The instrument, e.g. acoustic_grand_piano.
        instrument: String,
        /// The notes to fetch, e.g. C4 Db4 A0.
        notes: Vec<String>,
        /// Fetch all 88 piano keys.
        #[arg(long, conflicts_with = "notes")]
        all: bool,
    },
    /// Plays notes together as a chord.
    Play {
        /// The instrument, e.g. acoustic_grand_piano.
        instrument: String,
        /// The notes to play.
        #[arg(required = true)]
        notes: Vec<String>,
        /// How long to hold the notes before releasing them.
        #[arg(long, default_value = "1s")]
        hold: String,
    },
    /// Prints the canonical spelling and MIDI number of notes.
    Canonical {
        /// The notes to canonicalize.
        #[arg(required = true)]
        notes: Vec<String>,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the samples in the configured cache directory.
    Cache {},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Fetch {
            instrument,
            notes,
            all,
        } => {
            let notes: Vec<String> = if all {
                Note::piano_range().map(|note| note.to_string()).collect()
            } else {
                notes
            };
            if notes.is_empty() {
                return Err("no notes given, list some notes or pass --all".into());
            }

            let fetcher = config::init_fetcher(&config)?;
            let results = join_all(notes.iter().map(|note| fetcher.resolve(&instrument, note))).await;

            let mut failed = 0;
            for (note, result) in notes.iter().zip(results) {
                match result {
                    Ok(blob) => println!("- {} ({} bytes)", note, blob.len()),
                    Err(e) => {
                        failed += 1;
                        println!("- {}: {}", note, e);
                    }
                }
            }

            if failed > 0 {
                return Err(format!("{} of {} samples failed", failed, notes.len()).into());
            }
        }
        Commands::Play {
            instrument,
            notes,
            hold,
        } => {
            let hold: Duration = DurationString::from_string(hold)?.into();
            let controller = config::init_controller(&config)?;

            let results = controller.load_instrument(&instrument, &notes).await;
            for (note, result) in notes.iter().zip(results) {
                if let Err(e) = result {
                    return Err(format!("unable to load {}: {}", note, e).into());
                }
            }

            let handles = notes
                .iter()
                .map(|note| controller.start(&instrument, note))
                .collect::<Result<Vec<_>, _>>()?;
            for handle in handles.iter() {
                println!("Playing {}", handle.key());
            }

            tokio::time::sleep(hold).await;
            join_all(handles.iter().map(|handle| controller.press_out(handle))).await;

            // Let fades finish before the device goes away.
            if let Some(fade_out) = config.fade_out()? {
                tokio::time::sleep(fade_out).await;
            }
            controller.shutdown();
        }
        Commands::Canonical { notes } => {
            for name in notes.iter() {
                let note = Note::parse(name)?;
                println!("{} -> {} (MIDI {})", name, note, note.midi());
            }
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Cache {} => {
            let Some(cache_dir) = config.cache_dir() else {
                println!("No cache_dir configured, samples are only cached in memory.");
                return Ok(());
            };

            let mut keys = store::open(Some(cache_dir))?.keys();
            if keys.is_empty() {
                println!("No samples cached in {}.", cache_dir.display());
                return Ok(());
            }

            keys.sort();
            println!("Samples (count: {}):", keys.len());
            for key in keys {
                println!("- {}", key);
            }
        }
    }

    Ok(())
}
