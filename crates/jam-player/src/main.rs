//! JustJam practice player - headless multitrack stem playback
//!
//! Loads a directory of instrument stems, keeps them in lockstep through
//! the transport, and phase-locks the metronome to the playback clock. It:
//! 1. Starts the CPAL output stream owning the mixing engine
//! 2. Spawns a ~60Hz ticker that feeds the transport and metronome
//! 3. Drives everything from a line-oriented command prompt

mod config;

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use jam_core::audio::{
    load_stem_file, AudioSystem, EngineClickSink, EngineCommand, EngineTrackHandle,
};
use jam_core::export::{MixdownRequest, MixdownService, WavMixRenderer};
use jam_core::keys::{action_for_key, Key, KeyAction};
use jam_core::metronome::Metronome;
use jam_core::session::{Bookmarks, TapTempo};
use jam_core::transport::Transport;
use jam_core::Stem;

/// Extensions probed for each stem, in preference order
const STEM_EXTENSIONS: [&str; 3] = ["wav", "flac", "mp3"];

/// Ticker cadence driving metronome scheduling and loop enforcement
const TICK_INTERVAL: Duration = Duration::from_millis(16);

fn main() {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("jam-player starting up");

    println!("╔══════════════════════════════════════════════╗");
    println!("║              JustJam Player                  ║");
    println!("║        multitrack practice playback          ║");
    println!("╚══════════════════════════════════════════════╝");
    println!();

    if let Err(e) = run() {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config_path = config::default_config_path();
    let config = config::load_config(&config_path);

    let stems_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.stems_dir.clone());

    let stem_files = scan_stem_files(&stems_dir);
    if stem_files.is_empty() {
        bail!(
            "No stem files found in {:?} (expected vocals/bass/drums/guitar/piano/other .wav/.flac/.mp3)",
            stems_dir
        );
    }

    let mut audio = AudioSystem::start().context("Failed to start audio output")?;
    let sender = audio.sender();
    let atomics = audio.atomics();
    let sample_rate = audio.sample_rate();

    // Decode every stem up front and hand the buffers to the engine
    let transport = Arc::new(Mutex::new(Transport::<EngineTrackHandle>::new()));
    let mut loaded: Vec<(Stem, PathBuf)> = Vec::new();
    {
        let mut t = transport.lock().unwrap();
        for (stem, path) in &stem_files {
            t.add_track(*stem, path.to_string_lossy().to_string());
        }
        for (stem, path) in &stem_files {
            match load_stem_file(path, *stem, sample_rate) {
                Ok(buffer) => {
                    let duration = buffer.len() as f64 / sample_rate as f64;
                    log::info!("Loaded {:?}: {:.1}s from {:?}", stem, duration, path);
                    sender.send(EngineCommand::LoadStem {
                        stem: *stem,
                        buffer: Box::new(buffer),
                    });
                    t.track_ready(*stem, EngineTrackHandle::new(*stem, duration, sender.clone()));
                    loaded.push((*stem, path.clone()));
                }
                Err(e) => {
                    log::error!("Skipping {:?}: {}", stem, e);
                    t.track_failed(*stem);
                }
            }
        }
        if !t.all_ready() {
            log::warn!("Some stems failed to load; continuing with the rest");
        }
    }
    if loaded.is_empty() {
        bail!("No stems could be decoded");
    }

    // Metronome phase-locked to the engine's playback clock
    let metronome = Arc::new(Mutex::new(Metronome::new(Box::new(EngineClickSink::new(
        sender.clone(),
    )))));
    {
        let mut m = metronome.lock().unwrap();
        m.set_bpm(config.metronome.bpm);
        m.set_volume(config.metronome.volume);
        m.set_enabled(config.metronome.enabled);
        m.set_start_offset(config.metronome.start_offset);

        let clock = atomics.clone();
        m.set_time_source(Box::new(move || {
            if clock.duration_seconds(sample_rate) > 0.0 {
                Some(clock.position_seconds(sample_rate))
            } else {
                None
            }
        }));
        m.set_on_beat(Box::new(|position| {
            log::debug!("beat {}", position);
        }));
    }

    // Every transport seek re-derives the metronome's beat counter
    {
        let m = metronome.clone();
        transport.lock().unwrap().add_seek_listener(Box::new(move |_| {
            if let Ok(mut m) = m.lock() {
                m.seek();
            }
        }));
    }

    let running = Arc::new(AtomicBool::new(true));
    let ticker = spawn_ticker(
        transport.clone(),
        metronome.clone(),
        atomics.clone(),
        sample_rate,
        running.clone(),
    );

    print_help();
    repl(
        &mut audio,
        &transport,
        &metronome,
        &loaded,
        sample_rate,
        &running,
    )?;

    running.store(false, Ordering::Relaxed);
    let _ = ticker.join();
    metronome.lock().unwrap().destroy();
    transport.lock().unwrap().destroy();
    Ok(())
}

/// Find `<stem>.<ext>` files for each known stem (a `master.*` file, if
/// present, is not an audible stem and is ignored)
fn scan_stem_files(dir: &Path) -> Vec<(Stem, PathBuf)> {
    let mut found = Vec::new();
    for stem in Stem::ALL {
        for ext in STEM_EXTENSIONS {
            let path = dir.join(format!("{}.{}", stem.name(), ext));
            if path.is_file() {
                found.push((stem, path));
                break;
            }
        }
    }
    found
}

/// The ~60Hz scheduling loop: polls the engine clock, feeds the transport
/// (loop enforcement, listeners) and ticks the metronome
fn spawn_ticker(
    transport: Arc<Mutex<Transport<EngineTrackHandle>>>,
    metronome: Arc<Mutex<Metronome>>,
    atomics: Arc<jam_core::audio::EngineAtomics>,
    sample_rate: u32,
    running: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while running.load(Ordering::Relaxed) {
            let position = atomics.position_seconds(sample_rate);

            let still_playing = {
                let mut t = transport.lock().unwrap();
                if t.is_playing() {
                    t.handle_time_update(position);
                }
                if atomics.take_finished() {
                    t.handle_finished();
                }
                t.is_playing()
            };

            let mut m = metronome.lock().unwrap();
            if !still_playing && m.is_running() {
                m.stop();
            }
            m.tick();
            drop(m);

            thread::sleep(TICK_INTERVAL);
        }
    })
}

fn print_help() {
    println!("Commands:");
    println!("  space | left | right      toggle play / seek -5s / seek +5s");
    println!("  seek <sec>                jump to a position");
    println!("  vol <stem> <0..1>         set stem volume");
    println!("  mute <stem>  solo <stem>  toggle mute / exclusive solo");
    println!("  rate <r>                  playback rate (0.5..2.0)");
    println!("  bpm <n>  tap  offset <s>  metronome tempo / tap tempo / first beat");
    println!("  click  clickvol <0..1>    toggle metronome / click volume");
    println!("  loop  loopon              mark loop point / toggle loop");
    println!("  mark  unmark <t>  marks   bookmarks");
    println!("  export [path]             render the current mix to WAV");
    println!("  status  quit");
}

fn repl(
    audio: &mut AudioSystem,
    transport: &Arc<Mutex<Transport<EngineTrackHandle>>>,
    metronome: &Arc<Mutex<Metronome>>,
    loaded: &[(Stem, PathBuf)],
    sample_rate: u32,
    running: &Arc<AtomicBool>,
) -> Result<()> {
    let mut tap_tempo = TapTempo::new();
    let mut bookmarks = Bookmarks::new();
    let session_start = Instant::now();
    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line.context("Failed to read input")?;
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            continue;
        };
        let args: Vec<&str> = parts.collect();

        // Bare key names go through the global key bindings
        if let Some(key) = Key::from_name(command) {
            match action_for_key(key, false) {
                Some(KeyAction::TogglePlay) => toggle_play(audio, transport, metronome),
                Some(KeyAction::SeekBy(delta)) => transport.lock().unwrap().seek_by(delta),
                None => {}
            }
            continue;
        }

        match command {
            "help" => print_help(),
            "play" | "pause" => toggle_play(audio, transport, metronome),
            "seek" => match args.first().and_then(|a| a.parse::<f64>().ok()) {
                Some(seconds) => transport.lock().unwrap().seek(seconds),
                None => println!("usage: seek <seconds>"),
            },
            "vol" => match parse_stem_value(&args) {
                Some((stem, value)) => transport.lock().unwrap().set_volume(stem, value),
                None => println!("usage: vol <stem> <0..1>"),
            },
            "mute" => match args.first().and_then(|a| Stem::from_name(a)) {
                Some(stem) => transport.lock().unwrap().toggle_mute(stem),
                None => println!("usage: mute <stem>"),
            },
            "solo" => match args.first().and_then(|a| Stem::from_name(a)) {
                Some(stem) => transport.lock().unwrap().toggle_solo(stem),
                None => println!("usage: solo <stem>"),
            },
            "rate" => match args.first().and_then(|a| a.parse::<f64>().ok()) {
                Some(rate) => transport.lock().unwrap().set_playback_rate(rate),
                None => println!("usage: rate <multiplier>"),
            },
            "bpm" => match args.first().and_then(|a| a.parse::<f64>().ok()) {
                Some(bpm) => {
                    let mut m = metronome.lock().unwrap();
                    m.set_bpm(bpm);
                    println!("bpm: {:.0}", m.bpm());
                }
                None => println!("usage: bpm <30..300>"),
            },
            "tap" => {
                let now_ms = session_start.elapsed().as_secs_f64() * 1000.0;
                match tap_tempo.tap(now_ms) {
                    Some(bpm) => {
                        metronome.lock().unwrap().set_bpm(bpm);
                        println!("tap tempo: {:.0} bpm", bpm);
                    }
                    None => println!("keep tapping..."),
                }
            }
            "offset" => match args.first().and_then(|a| a.parse::<f64>().ok()) {
                Some(seconds) => metronome.lock().unwrap().set_start_offset(seconds),
                None => println!("usage: offset <seconds>"),
            },
            "click" => {
                let playing = transport.lock().unwrap().is_playing();
                let mut m = metronome.lock().unwrap();
                let enabled = !m.is_enabled();
                m.set_enabled(enabled);
                if enabled && playing {
                    m.start();
                }
                println!("metronome {}", if enabled { "on" } else { "off" });
            }
            "clickvol" => match args.first().and_then(|a| a.parse::<f32>().ok()) {
                Some(volume) => metronome.lock().unwrap().set_volume(volume),
                None => println!("usage: clickvol <0..1>"),
            },
            "loop" => {
                let mut t = transport.lock().unwrap();
                t.cycle_loop();
                match (t.loop_region().start(), t.loop_region().end()) {
                    (Some(a), Some(b)) => println!("loop region {:.1}s - {:.1}s", a.min(b), a.max(b)),
                    (Some(a), None) => println!("loop start {:.1}s", a),
                    _ => println!("loop cleared"),
                }
            }
            "loopon" => {
                let mut t = transport.lock().unwrap();
                t.toggle_loop_enabled();
                println!(
                    "loop {}",
                    if t.loop_region().is_enabled() { "enabled" } else { "disabled" }
                );
            }
            "mark" => {
                let time = transport.lock().unwrap().current_time();
                bookmarks.add(time);
                println!("bookmarked {:.1}s", time);
            }
            "unmark" => match args.first().and_then(|a| a.parse::<f64>().ok()) {
                Some(seconds) => bookmarks.remove(seconds),
                None => println!("usage: unmark <seconds>"),
            },
            "marks" => {
                if bookmarks.is_empty() {
                    println!("no bookmarks");
                } else {
                    let list: Vec<String> =
                        bookmarks.as_slice().iter().map(|t| format!("{:.1}", t)).collect();
                    println!("bookmarks: {}", list.join(", "));
                }
            }
            "export" => {
                let path = args.first().copied().unwrap_or("mix.wav");
                export_mix(transport, metronome, loaded, sample_rate, path);
            }
            "status" => {
                let t = transport.lock().unwrap();
                let m = metronome.lock().unwrap();
                println!(
                    "{:.1}s / {:.1}s  {}  rate {:.2}  bpm {:.0}  click {}",
                    t.current_time(),
                    t.duration(),
                    if t.is_playing() { "playing" } else { "paused" },
                    t.playback_rate(),
                    m.bpm(),
                    if m.is_enabled() { "on" } else { "off" },
                );
            }
            "quit" | "exit" => {
                running.store(false, Ordering::Relaxed);
                break;
            }
            other => println!("unknown command: {} (try 'help')", other),
        }
    }

    Ok(())
}

fn parse_stem_value(args: &[&str]) -> Option<(Stem, f32)> {
    let stem = Stem::from_name(args.first()?)?;
    let value = args.get(1)?.parse::<f32>().ok()?;
    Some((stem, value))
}

fn toggle_play(
    audio: &mut AudioSystem,
    transport: &Arc<Mutex<Transport<EngineTrackHandle>>>,
    metronome: &Arc<Mutex<Metronome>>,
) {
    let playing = {
        let mut t = transport.lock().unwrap();
        t.toggle_play(audio);
        t.is_playing()
    };
    let mut m = metronome.lock().unwrap();
    if playing {
        m.start();
    } else {
        m.stop();
    }
}

/// Render the current mix state to a WAV file, re-decoding the stems so the
/// engine's buffers stay untouched
fn export_mix(
    transport: &Arc<Mutex<Transport<EngineTrackHandle>>>,
    metronome: &Arc<Mutex<Metronome>>,
    loaded: &[(Stem, PathBuf)],
    sample_rate: u32,
    output_path: &str,
) {
    let request = {
        let t = transport.lock().unwrap();
        let m = metronome.lock().unwrap();
        MixdownRequest::from_state(
            &t.track_statuses(),
            m.bpm(),
            m.is_enabled(),
            m.volume(),
            m.start_offset(),
        )
    };

    let mut renderer = WavMixRenderer::new(sample_rate, output_path);
    for (stem, path) in loaded {
        match load_stem_file(path, *stem, sample_rate) {
            Ok(buffer) => renderer.add_stem(*stem, buffer),
            Err(e) => {
                log::error!("Export failed reading {:?}: {}", stem, e);
                return;
            }
        }
    }

    let service = MixdownService::new();
    let progress = service.start(renderer, request);
    for message in progress {
        println!("{}", message.description());
        if message.is_terminal() {
            break;
        }
    }
}
