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
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{crate_version, Parser, Subcommand};
use deckhand::analysis::AnalysisJobs;
use deckhand::clock::MasterClock;
use deckhand::config::{self, Settings};
use deckhand::deck::{Deck, WavSource};
use deckhand::dsp::{DspResult, MetadataStage};
use deckhand::midi::{
    self, MappingKey, MappingStore, MessageType, MidiAction, MidiRouter, YamlMappingStore,
};
use deckhand::samples::{
    DirectorySoundRepository, ManualTime, MemorySoundRepository, MonotonicTime, Sampler,
    SoundRepository, TimeSource,
};
use deckhand::session::Session;
use deckhand::ticker::{configure_thread_priority, rt_enabled, tick_thread_priority, Ticker};
use deckhand::transport::{DeckId, TransportController};
use deckhand::util::{deck_time, filename_display};
use duration_string::DurationString;
use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "The control core of a DJ deck."
)]
struct Cli {
    /// The path to the deckhand config. Defaults are used when not given.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs a headless session, routing MIDI from the configured input.
    Run {
        /// The track to load on deck A.
        #[arg(long)]
        deck_a: Option<PathBuf>,
        /// The track to load on deck B.
        #[arg(long)]
        deck_b: Option<PathBuf>,
        /// Start playing the loaded decks right away.
        #[arg(long)]
        play: bool,
        /// Stop after this long, e.g. 90s. Runs until killed otherwise.
        #[arg(short, long)]
        duration: Option<String>,
    },
    /// Lists the available MIDI input ports.
    MidiDevices {},
    /// Lists or deletes stored MIDI mappings.
    Mappings {
        #[clap(subcommand)]
        command: Option<MappingsCommand>,
    },
    /// Binds the next control moved on the MIDI input to an action.
    Learn {
        /// The action to bind, e.g. crossfader, play_deck_a or sampler_pad.
        action: MidiAction,
        /// The action target. For sampler_pad this is the pad number.
        target: Option<String>,
        /// How long to wait for a control, e.g. 30s.
        #[arg(short, long, default_value = "30s")]
        timeout: String,
    },
    /// Analyzes a WAV file in the background and caches the result.
    Analyze {
        /// The id the analysis is cached under.
        track_id: String,
        /// The WAV file to analyze.
        path: PathBuf,
    },
    /// Renders sampler pads offline to a WAV file.
    Simulate {
        /// The WAV file to write.
        output: PathBuf,
        /// The length of the render in seconds.
        #[arg(short, long, default_value_t = 4.0)]
        seconds: f64,
        /// A pad trigger in the form <PAD>@<SECONDS>, e.g. 0@1.5. May be repeated.
        #[arg(short, long)]
        trigger: Vec<String>,
    },
}

#[derive(Subcommand)]
enum MappingsCommand {
    /// Lists all mappings.
    List {},
    /// Deletes the mapping for a control.
    Delete {
        /// note_on or control_change.
        message_type: MessageType,
        /// The zero-based MIDI channel.
        channel: u8,
        /// The note or controller number.
        control: u8,
    },
}

/// Prints transport calls instead of acting on them.
struct PrintController;

impl TransportController for PrintController {
    fn toggle_play_pause(&self, deck: DeckId) {
        println!("toggle play/pause on deck {}", deck);
    }

    fn set_tempo(&self, deck: DeckId, value: f64) {
        println!("tempo on deck {}: {:.3}", deck, value);
    }

    fn set_pitch(&self, deck: DeckId, value: f64) {
        println!("pitch on deck {}: {:.3}", deck, value);
    }

    fn set_crossfader(&self, value: f64) {
        println!("crossfader: {:.3}", value);
    }

    fn trigger_sampler(&self, pad: u32, velocity: u8) {
        println!("sampler pad {} (velocity {})", pad, velocity);
    }
}

fn parse_duration(value: &str) -> Result<Duration, Box<dyn Error>> {
    Ok(DurationString::from_string(value.to_string())?.into())
}

fn sound_repository(settings: &Settings) -> Result<Arc<dyn SoundRepository>, Box<dyn Error>> {
    match settings.sounds() {
        Some(path) => Ok(Arc::new(DirectorySoundRepository::open(path)?)),
        None => {
            if !settings.pad_assignments()?.is_empty() {
                warn!("Pads are assigned but no sounds directory is configured");
            }
            Ok(Arc::new(MemorySoundRepository::new()))
        }
    }
}

fn build_session(settings: &Settings, time: Arc<dyn TimeSource>) -> Result<Session, Box<dyn Error>> {
    let clock = MasterClock::new(settings.sample_rate(), settings.buffer_size()).shared();
    let dsp = Arc::new(MetadataStage);
    let mut sampler = Sampler::new(sound_repository(settings)?, time, settings.sampler_settings());

    let session_settings = settings.session_settings()?;
    for sound_id in session_settings.pads.values() {
        sampler.preload(*sound_id)?;
    }

    Ok(Session::new(
        clock.clone(),
        Deck::new("A", clock.clone(), dsp.clone()),
        Deck::new("B", clock, dsp),
        sampler,
        session_settings,
    ))
}

fn open_store(settings: &Settings) -> Result<Arc<YamlMappingStore>, Box<dyn Error>> {
    Ok(Arc::new(YamlMappingStore::open(&settings.mapping_store())?))
}

fn run(
    settings: &Settings,
    deck_a: Option<PathBuf>,
    deck_b: Option<PathBuf>,
    play: bool,
    duration: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let mut session = build_session(settings, Arc::new(MonotonicTime::new()))?;
    let handle = session.handle();
    for (deck, path) in [(DeckId::A, deck_a), (DeckId::B, deck_b)] {
        if let Some(path) = path {
            session.load(deck, &WavSource::new(&path))?;
            if play {
                handle.toggle_play_pause(deck);
            }
        }
    }

    let router = MidiRouter::new(Arc::new(handle), open_store(settings)?, None)
        .with_stop_timeout(settings.router_stop_timeout()?);
    let _input = match settings.midi_input() {
        Some(name) => Some(midi::connect_input(name, router.sender())?),
        None => {
            warn!("No MIDI input configured, controls will not respond");
            None
        }
    };
    router.start()?;

    let deadline = duration
        .as_deref()
        .map(parse_duration)
        .transpose()?
        .map(|duration| Instant::now() + duration);
    let ticker = Ticker::for_buffer(
        f64::from(settings.buffer_size()) / f64::from(settings.sample_rate()),
    );
    info!(period = ?ticker.period(), "Starting session");

    let tick_thread = thread::Builder::new()
        .name("deckhand-tick".into())
        .spawn(move || {
            if let Some(priority) = tick_thread_priority() {
                configure_thread_priority(priority, rt_enabled());
            }
            let mut last_report = Instant::now();
            ticker.run(&mut session, |output| {
                if last_report.elapsed() >= Duration::from_secs(1) {
                    last_report = Instant::now();
                    info!(
                        frame = output.frame,
                        deck_a = output.deck_a.as_ref().map(DspResult::describe),
                        deck_b = output.deck_b.as_ref().map(DspResult::describe),
                        "Tick"
                    );
                }
                deadline.map_or(true, |deadline| Instant::now() < deadline)
            });
            session
        })?;

    let session = tick_thread
        .join()
        .map_err(|_| "tick thread panicked")?;
    router.stop()?;

    for deck in [DeckId::A, DeckId::B] {
        let state = session.deck(deck).transport_state();
        println!(
            "Deck {}: {} {} / {} (tempo {:.3}, pitch {:+.2})",
            deck,
            if state.playing { "playing" } else { "stopped" },
            deck_time(state.position_seconds),
            deck_time(state.duration_seconds),
            state.tempo_ratio,
            state.pitch_semitones,
        );
    }
    Ok(())
}

fn learn(
    settings: &Settings,
    action: MidiAction,
    target: Option<String>,
    timeout: &str,
) -> Result<(), Box<dyn Error>> {
    let timeout = parse_duration(timeout)?;
    let Some(input) = settings.midi_input() else {
        return Err("a MIDI input must be configured to learn mappings".into());
    };

    let store = open_store(settings)?;
    let router = MidiRouter::new(Arc::new(PrintController), store.clone(), None)
        .with_stop_timeout(settings.router_stop_timeout()?);
    let learner = router.learner();
    let _input = midi::connect_input(input, router.sender())?;

    learner.start_binding(action.clone(), target.clone());
    router.start()?;
    println!("Move a control to bind it to {}.", action);

    let start = Instant::now();
    while learner.is_learning() && start.elapsed() < timeout {
        thread::sleep(Duration::from_millis(10));
    }
    let learned = !learner.is_learning();
    learner.cancel();
    router.stop()?;

    if !learned {
        return Err(format!("no control moved within {:?}", timeout).into());
    }
    for mapping in store
        .load_all()?
        .into_iter()
        .filter(|mapping| mapping.action == action && mapping.target == target)
    {
        println!("{}", mapping);
    }
    Ok(())
}

fn mappings(settings: &Settings, command: Option<MappingsCommand>) -> Result<(), Box<dyn Error>> {
    let store = open_store(settings)?;
    match command.unwrap_or(MappingsCommand::List {}) {
        MappingsCommand::List {} => {
            let mappings = store.load_all()?;
            if mappings.is_empty() {
                println!("No mappings in {}.", store.path().display());
                return Ok(());
            }
            println!("Mappings (count: {}):", mappings.len());
            for mapping in mappings {
                println!("- {}", mapping);
            }
        }
        MappingsCommand::Delete {
            message_type,
            channel,
            control,
        } => {
            let key = MappingKey::new(message_type, channel, control);
            if store.delete_mapping(&key)? {
                println!("Deleted mapping for {}.", key);
            } else {
                println!("No mapping for {}.", key);
            }
        }
    }
    Ok(())
}

async fn analyze(settings: &Settings, track_id: &str, path: &Path) -> Result<(), Box<dyn Error>> {
    let jobs = AnalysisJobs::new(&settings.analysis_cache(), settings.analysis_workers())?;
    let handle = jobs.request(track_id, path)?;
    if handle.is_ready() {
        println!("Using cached analysis for {}.", track_id);
    }
    let result = handle.wait().await.map_err(|e| e.to_string())?;

    let summary = &result.summary;
    let peak = summary.peaks.iter().fold(0.0f32, |max, peak| max.max(*peak));
    println!("Track {} ({}):", result.track_id, filename_display(&result.source));
    println!("  Duration: {}", deck_time(summary.duration_seconds()));
    println!("  Sample rate: {}", summary.sample_rate);
    println!("  Channels: {}", summary.channels);
    println!(
        "  Windows: {} of {} frames",
        summary.peaks.len(),
        summary.window_frames
    );
    println!("  Peak: {:.3}", peak);
    match result.beatgrid {
        Some(grid) => println!(
            "  Tempo: {:.2} BPM, first beat at {}",
            grid.bpm,
            deck_time(grid.first_beat)
        ),
        None => println!("  Tempo: no steady beat found"),
    }
    Ok(())
}

fn parse_trigger(trigger: &str) -> Result<(u32, f64), Box<dyn Error>> {
    let (pad, seconds) = trigger
        .split_once('@')
        .ok_or_else(|| format!("trigger {} should be in the form <PAD>@<SECONDS>", trigger))?;
    Ok((pad.trim().parse()?, seconds.trim().parse()?))
}

fn simulate(
    settings: &Settings,
    output: &Path,
    seconds: f64,
    triggers: &[String],
) -> Result<(), Box<dyn Error>> {
    let time = Arc::new(ManualTime::new(0.0));
    let mut session = build_session(settings, time.clone())?;

    for trigger in triggers {
        let (pad, start) = parse_trigger(trigger)?;
        let Some(&sound_id) = session.settings().pads.get(&pad) else {
            return Err(format!("no sound assigned to pad {}", pad).into());
        };
        session.sampler_mut().schedule(sound_id, start)?;
    }

    let buffer_seconds = f64::from(settings.buffer_size()) / f64::from(settings.sample_rate());
    let mut writer = WavWriter::create(
        output,
        WavSpec {
            channels: 1,
            sample_rate: settings.sample_rate(),
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    )?;

    let mut rendered = 0.0;
    let mut peak_voices = 0;
    while rendered < seconds {
        time.set(rendered);
        let tick = session.tick();
        peak_voices = peak_voices.max(session.sampler().allocator().active_count());
        for sample in tick.sampler {
            writer.write_sample(sample)?;
        }
        rendered += buffer_seconds;
    }
    writer.finalize()?;

    println!(
        "Rendered {} to {} (peak voices: {}).",
        deck_time(rendered),
        output.display(),
        peak_voices
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            deck_a,
            deck_b,
            play,
            duration,
        } => run(&settings, deck_a, deck_b, play, duration)?,
        Commands::MidiDevices {} => {
            let ports = midi::list_ports()?;
            if ports.is_empty() {
                println!("No MIDI inputs found.");
                return Ok(());
            }
            println!("MIDI inputs:");
            for port in ports {
                println!("- {}", port);
            }
        }
        Commands::Mappings { command } => mappings(&settings, command)?,
        Commands::Learn {
            action,
            target,
            timeout,
        } => learn(&settings, action, target, &timeout)?,
        Commands::Analyze { track_id, path } => analyze(&settings, &track_id, &path).await?,
        Commands::Simulate {
            output,
            seconds,
            trigger,
        } => simulate(&settings, &output, seconds, &trigger)?,
    }

    Ok(())
}
