use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use serde::Serialize;
use std::time::{Duration, Instant};

use scrubline::cli::Args;
use scrubline::config::{self, CONFIG_FILE, EngineConfig, PathConfig};
use scrubline::core::engine_events::*;
use scrubline::entities::time::{format_timecode, frame_label};
use scrubline::{BoxedEvent, DurationMs, Engine, FrameRate, InteractionState, TimeMs, downcast_event};

/// Upper bound for waiting on a committed seek
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);
/// Host loop period (one UI tick)
const TICK: Duration = Duration::from_millis(16);

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }
    init_logging(&args, &path_config)?;
    debug!("Command-line args: {:?}", args);

    let config_path = config::config_file(CONFIG_FILE, &path_config);
    info!("Config path: {}", config_path.display());
    let mut engine_config = EngineConfig::load(&config_path);
    if let Some(rate) = args.rate {
        engine_config.playback_rate = rate;
    }
    let engine_config = engine_config.sanitized();

    if args.write_config {
        engine_config
            .save(&config_path)
            .with_context(|| format!("failed to write {}", config_path.display()))?;
        println!("{}", config_path.display());
        return Ok(());
    }

    let printer = Printer { json: args.json };
    let mut engine = Engine::with_default_backend(engine_config);
    engine
        .open(&args.file_path)
        .with_context(|| format!("failed to open {}", args.file_path.display()))?;
    settle(&mut engine, &printer);

    if args.autoplay {
        engine.play()?;
        run_for(&mut engine, &printer, Duration::from_millis(args.play_ms));
        engine.pause()?;
        pump(&mut engine, &printer);
    }

    if let Some(ms) = args.seek {
        engine.seek(ms)?;
        settle(&mut engine, &printer);
    }

    if let Some(delta) = args.step {
        engine.step_frame(delta)?;
        settle(&mut engine, &printer);
    }

    if let Some(&[from, to, steps]) = args.scrub.as_deref() {
        drag(&mut engine, &printer, from, to, steps.max(1))?;
    }

    printer.summary(&engine);
    engine.close();
    pump(&mut engine, &printer);
    Ok(())
}

fn init_logging(args: &Args, paths: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| config::data_file("scrubline.log", paths));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("failed to create log file {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

/// One host tick: drain decode threads, print notifications
fn pump(engine: &mut Engine, printer: &Printer) {
    engine.update();
    let rate = engine.frame_rate();
    for event in engine.events().poll() {
        printer.print(&event, rate);
    }
}

fn settle(engine: &mut Engine, printer: &Printer) {
    let deadline = Instant::now() + SETTLE_TIMEOUT;
    loop {
        pump(engine, printer);
        if engine.state() == InteractionState::Idle {
            return;
        }
        if Instant::now() >= deadline {
            warn!("Seek still pending after {:?} ({:?})", SETTLE_TIMEOUT, engine.state());
            return;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

fn run_for(engine: &mut Engine, printer: &Printer, length: Duration) {
    let deadline = Instant::now() + length;
    while Instant::now() < deadline {
        pump(engine, printer);
        if !engine.is_playing() {
            break;
        }
        std::thread::sleep(TICK);
    }
}

/// Simulated position drag, one move per UI tick
fn drag(engine: &mut Engine, printer: &Printer, from: TimeMs, to: TimeMs, steps: i64) -> Result<()> {
    info!("Drag {} -> {} ms in {} moves", from, to, steps);
    engine.drag_start()?;
    for i in 0..=steps {
        engine.drag_move(from + (to - from) * i / steps);
        pump(engine, printer);
        std::thread::sleep(TICK);
    }
    engine.drag_end(to)?;
    settle(engine, printer);
    Ok(())
}

/// JSON line shape of the printed events
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Line<'a> {
    MediaOpened(&'a MediaOpenedEvent),
    Position { position_ms: TimeMs, timecode: String },
    Duration(&'a DurationChangedEvent),
    FrameRate(&'a FrameRateChangedEvent),
    PlayState(&'a PlayStateChangedEvent),
    Frame { position_ms: TimeMs, width: usize, height: usize },
    Preview { position_ms: TimeMs, width: usize, height: usize },
    DecodeFault(&'a DecodeFaultEvent),
    MediaEnded(&'a MediaEndedEvent),
}

struct Printer {
    json: bool,
}

impl Printer {
    fn print(&self, event: &BoxedEvent, rate: Option<FrameRate>) {
        let Some(line) = to_line(event) else {
            return;
        };
        if self.json {
            match serde_json::to_string(&line) {
                Ok(s) => println!("{}", s),
                Err(e) => warn!("Failed to serialize event: {}", e),
            }
            return;
        }
        match line {
            Line::MediaOpened(e) => println!("opened     {} ({})", e.path.display(), e.id),
            Line::Position { position_ms, timecode } => {
                println!("position   {}  {}", timecode, frame_label(position_ms, rate))
            }
            Line::Duration(e) => println!("duration   {}", describe_duration(e.duration)),
            Line::FrameRate(e) => match e.frame_rate {
                Some(r) => println!("rate       {}", r),
                None => println!("rate       unknown"),
            },
            Line::PlayState(e) => println!("{}", if e.playing { "playing" } else { "paused" }),
            Line::Frame { position_ms, width, height } => {
                debug!("frame {} ms {}x{}", position_ms, width, height)
            }
            Line::Preview { position_ms, width, height } => {
                println!("preview    {}  {}x{}", format_timecode(position_ms), width, height)
            }
            Line::DecodeFault(e) => println!("FAULT      {}", e.fault),
            Line::MediaEnded(e) => println!("ended      {}", format_timecode(e.position_ms)),
        }
    }

    fn summary(&self, engine: &Engine) {
        if self.json {
            return;
        }
        println!(
            "-- at {} of {} ({})",
            format_timecode(engine.position()),
            describe_duration(engine.duration()),
            engine
                .frame_rate()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "no frame rate".into())
        );
    }
}

fn to_line(event: &BoxedEvent) -> Option<Line<'_>> {
    if let Some(e) = downcast_event::<PositionChangedEvent>(event) {
        return Some(Line::Position {
            position_ms: e.position_ms,
            timecode: format_timecode(e.position_ms),
        });
    }
    if let Some(e) = downcast_event::<FrameReadyEvent>(event) {
        return Some(Line::Frame {
            position_ms: e.position_ms,
            width: e.frame.width(),
            height: e.frame.height(),
        });
    }
    if let Some(e) = downcast_event::<PreviewFrameReadyEvent>(event) {
        return Some(Line::Preview {
            position_ms: e.position_ms,
            width: e.frame.width(),
            height: e.frame.height(),
        });
    }
    if let Some(e) = downcast_event::<DurationChangedEvent>(event) {
        return Some(Line::Duration(e));
    }
    if let Some(e) = downcast_event::<MediaOpenedEvent>(event) {
        return Some(Line::MediaOpened(e));
    }
    if let Some(e) = downcast_event::<FrameRateChangedEvent>(event) {
        return Some(Line::FrameRate(e));
    }
    if let Some(e) = downcast_event::<PlayStateChangedEvent>(event) {
        return Some(Line::PlayState(e));
    }
    if let Some(e) = downcast_event::<DecodeFaultEvent>(event) {
        return Some(Line::DecodeFault(e));
    }
    downcast_event::<MediaEndedEvent>(event).map(Line::MediaEnded)
}

fn describe_duration(d: DurationMs) -> String {
    match d {
        DurationMs::Known(ms) => format_timecode(ms),
        DurationMs::Growing(ms) => format!(">= {} (growing)", format_timecode(ms)),
        DurationMs::Unknown => "unknown".into(),
    }
}
