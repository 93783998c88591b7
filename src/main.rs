use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use signal_cast::broadcast::{BroadcastDescriptor, GoLive, Origin};
use signal_cast::clip_source::{
    ClipLocator, DirClipLocator, NoClips, external_reference_from_url, probe_clip,
};
use signal_cast::error::{StoreError, ValidationError};
use signal_cast::player::RodioBackend;
use signal_cast::radio_fx::{RadioFilter, ReverbIntensity};
use signal_cast::scheduler::{Position, resolve_position};
use signal_cast::session::{SessionConfig, SessionEvent, SystemClock};
use signal_cast::session_runtime::spawn_session_runtime;
use signal_cast::station::Station;
use signal_cast::synth::{RawPcmFile, SpeechSynthesizer, VoiceSettings, render_in_background};
use signal_cast::timeline::{ExternalClip, MoveDirection, format_duration};
use signal_cast::{Error, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use tracing_subscriber::EnvFilter;

const RENDER_POLL: std::time::Duration = std::time::Duration::from_millis(200);

#[derive(Parser)]
#[command(name = "signalcast", about = "Author and tune in to synchronized radio broadcasts")]
struct Cli {
    /// Station file (defaults to the platform data directory)
    #[arg(long, global = true)]
    station: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show station status
    Status,
    /// Edit the draft timeline
    Draft {
        #[command(subcommand)]
        action: DraftCmd,
    },
    /// Take the draft timeline live as a new broadcast
    GoLive {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Loop the timeline forever instead of ending after one pass
        #[arg(long = "loop")]
        looping: bool,
        /// Start at this RFC 3339 time instead of now
        #[arg(long)]
        at: Option<String>,
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },
    /// List broadcasts
    List {
        /// Include ended and stopped broadcasts
        #[arg(long)]
        all: bool,
    },
    /// Show what a broadcast is playing right now
    Where { name: String },
    /// Listen to a broadcast until it ends
    TuneIn { name: String },
    /// Take a broadcast off air
    Stop { name: String },
    /// Render raw 8-bit speech through the radio filter into a WAV file
    Render {
        raw: PathBuf,
        out: PathBuf,
        #[arg(long)]
        reverb: Option<String>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Station configuration
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
}

#[derive(Subcommand)]
enum DraftCmd {
    /// Add an external clip by URL or 11-character reference
    AddClip {
        url: String,
        #[arg(long, default_value = "")]
        title: String,
        /// Trim start in seconds
        #[arg(long, default_value_t = 0.0)]
        start: f64,
        /// Trim end in seconds (defaults to the cached clip's length)
        #[arg(long)]
        end: Option<f64>,
        #[arg(long, default_value_t = 0.0)]
        fade_in: f64,
        #[arg(long, default_value_t = 0.0)]
        fade_out: f64,
    },
    /// Add a speech item from pre-synthesized raw PCM (8-bit, mono, 22050 Hz)
    AddSpeech {
        text: String,
        #[arg(long)]
        raw: PathBuf,
        #[arg(long)]
        reverb: Option<String>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Show the draft timeline
    Show,
    /// Move an item one step up or down (1-based)
    Move { index: usize, direction: Direction },
    /// Move an item to a new position (1-based)
    Reorder { from: usize, to: usize },
    /// Remove an item (1-based)
    Remove { index: usize },
    /// Remove every item
    Clear,
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set { key: String, value: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Direction {
    Up,
    Down,
}

impl From<Direction> for MoveDirection {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Up => MoveDirection::Up,
            Direction::Down => MoveDirection::Down,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut station = match &cli.station {
        Some(path) => Station::load_from(path),
        None => Station::load(),
    };

    if let Err(e) = run(cli.command, &mut station) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands, station: &mut Station) -> Result<()> {
    let now = Utc::now();
    match command {
        Commands::Status => {
            println!("signal_cast v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "Draft: {} item(s), {} | Live: {} | Broadcasts: {}",
                station.draft.len(),
                format_duration(station.draft.total_duration()),
                station.live_broadcasts(now).len(),
                station.broadcasts.len()
            );
            println!("Station file: {}", station.path().display());
        }
        Commands::Draft { action } => {
            run_draft(action, station)?;
            station.save()?;
        }
        Commands::GoLive {
            name,
            description,
            looping,
            at,
            lat,
            lon,
        } => {
            let scheduled_at = at.as_deref().map(parse_timestamp).transpose()?;
            let origin = match (lat, lon) {
                (Some(lat), Some(lon)) => Origin::new(lat, lon)?,
                _ => Origin::default(),
            };
            let options = GoLive {
                name,
                description,
                is_looping: looping,
                scheduled_at,
                origin,
            };
            let descriptor = station.go_live(options, now)?;
            println!(
                "'{}' {} with {} item(s), {}{}",
                descriptor.name,
                if descriptor.anchor() > now {
                    format!("scheduled for {}", descriptor.anchor().to_rfc3339())
                } else {
                    "is live".to_string()
                },
                descriptor.timeline().len(),
                format_duration(descriptor.total_duration()),
                if descriptor.is_looping { ", looping" } else { "" }
            );
            station.save()?;
        }
        Commands::List { all } => {
            let listed: Vec<&BroadcastDescriptor> = if all {
                station.broadcasts.iter().collect()
            } else {
                station.live_broadcasts(now)
            };
            if listed.is_empty() {
                println!("No broadcasts.");
            }
            for b in listed {
                println!(
                    "  {} [{}] {} item(s), {}{} @ ({:.4}, {:.4})",
                    b.name,
                    b.status(now),
                    b.timeline().len(),
                    format_duration(b.total_duration()),
                    if b.is_looping { ", looping" } else { "" },
                    b.origin.latitude,
                    b.origin.longitude
                );
                if !b.description.is_empty() {
                    println!("      {}", b.description);
                }
            }
        }
        Commands::Where { name } => {
            let descriptor = find(station, &name)?;
            match resolve_position(descriptor, now)? {
                Position::NotStarted { starts_in } => {
                    println!("'{}' starts in {}", descriptor.name, format_duration(starts_in));
                }
                Position::Playing {
                    index,
                    item,
                    offset,
                    total,
                } => {
                    println!(
                        "'{}' is playing [{}/{}] {} at {} of {} (loop length {})",
                        descriptor.name,
                        index + 1,
                        descriptor.timeline().len(),
                        item.title(),
                        format_duration(offset),
                        item.duration_display(),
                        format_duration(total)
                    );
                }
                Position::Ended { .. } => println!("'{}' has ended.", descriptor.name),
                Position::OffAir { since } => println!(
                    "'{}' is off air (stopped {}).",
                    descriptor.name,
                    since.to_rfc3339()
                ),
            }
        }
        Commands::TuneIn { name } => {
            let descriptor = find(station, &name)?.clone();
            tune_in(descriptor, station)?;
        }
        Commands::Stop { name } => {
            let stopped = station.stop_broadcast(&name, now)?;
            println!("'{}' is off air.", stopped.name);
            station.save()?;
        }
        Commands::Render {
            raw,
            out,
            reverb,
            seed,
        } => {
            let reverb = reverb_or_default(reverb.as_deref(), station)?;
            let samples = RawPcmFile::new(&raw).synthesize("", &VoiceSettings::default())?;
            let filter = RadioFilter::new();
            let rendered = match seed {
                Some(seed) => filter.render_seeded(&samples, reverb, seed)?,
                None => filter.render(&samples, reverb)?,
            };
            std::fs::write(&out, &rendered.wav).map_err(StoreError::from)?;
            println!(
                "Wrote {} ({:.2}s, {} reverb)",
                out.display(),
                rendered.duration.as_secs_f64(),
                reverb
            );
        }
        Commands::Config { action } => match action {
            ConfigCmd::Show => println!("{}", station.config),
            ConfigCmd::Set { key, value } => {
                station.config.set(&key, &value)?;
                station.save()?;
                println!("{} updated.", key);
            }
        },
    }
    Ok(())
}

fn run_draft(action: DraftCmd, station: &mut Station) -> Result<()> {
    match action {
        DraftCmd::AddClip {
            url,
            title,
            start,
            end,
            fade_in,
            fade_out,
        } => {
            let reference = external_reference_from_url(&url)?;
            let probe = station
                .config
                .clip_dir
                .as_deref()
                .and_then(|dir| DirClipLocator::new(dir).locate(&reference))
                .and_then(|path| match probe_clip(&path) {
                    Ok(probe) => Some(probe),
                    Err(e) => {
                        tracing::warn!(error = %e, "could not probe cached clip");
                        None
                    }
                });
            let source_len = probe.as_ref().map(|p| p.source_len.as_secs_f64());
            let end = end.or(source_len).ok_or(ValidationError::MissingTrimEnd)?;
            let title = if title.trim().is_empty() {
                probe.and_then(|p| p.title).unwrap_or_default()
            } else {
                title
            };
            let clip = ExternalClip::new(&reference, &title, start, end, source_len)?
                .with_fades(fade_in, fade_out)?;
            let label = clip.title.clone();
            station.draft.add_clip(clip)?;
            println!("Added clip '{}' ({} items in draft)", label, station.draft.len());
        }
        DraftCmd::AddSpeech {
            text,
            raw,
            reverb,
            seed,
        } => {
            if text.trim().is_empty() {
                return Err(ValidationError::EmptyText.into());
            }
            let reverb = reverb_or_default(reverb.as_deref(), station)?;
            let samples = RawPcmFile::new(&raw).synthesize(&text, &VoiceSettings::default())?;
            print!("Rendering speech ({} reverb)", reverb);
            let pending = render_in_background(Arc::new(RadioFilter::new()), samples, reverb, seed)?;
            let rendered = loop {
                if let Some(result) = pending.try_take() {
                    println!();
                    break result?;
                }
                print!(".");
                let _ = std::io::stdout().flush();
                std::thread::sleep(RENDER_POLL);
            };
            station.draft.add_speech(&text, reverb, &rendered)?;
            println!(
                "Added speech ({:.2}s, {} items in draft)",
                rendered.duration.as_secs_f64(),
                station.draft.len()
            );
        }
        DraftCmd::Show => {
            if station.draft.is_empty() {
                println!("Draft is empty.");
            }
            for (i, item) in station.draft.items().iter().enumerate() {
                println!(
                    "  {:>3}. [{}] {} ({})",
                    i + 1,
                    item.kind_label(),
                    item.title(),
                    item.duration_display()
                );
            }
            println!("Total: {}", format_duration(station.draft.total_duration()));
        }
        DraftCmd::Move { index, direction } => {
            let moved = station
                .draft
                .move_item(zero_based(index, station.draft.len())?, direction.into())?;
            if !moved {
                println!("Item {} is already at the edge.", index);
            }
        }
        DraftCmd::Reorder { from, to } => {
            let len = station.draft.len();
            station.draft.reorder(zero_based(from, len)?, zero_based(to, len)?)?;
        }
        DraftCmd::Remove { index } => {
            let removed = station.draft.remove(zero_based(index, station.draft.len())?)?;
            println!("Removed '{}'", removed.title());
        }
        DraftCmd::Clear => {
            station.draft.clear();
            println!("Draft cleared.");
        }
    }
    Ok(())
}

/// Play a broadcast on the default output until the session stops.
fn tune_in(descriptor: BroadcastDescriptor, station: &Station) -> Result<()> {
    let clip_dir = station.config.clip_dir.clone();
    let volume = station.config.output_volume;
    let (tx, rx) = mpsc::channel::<SessionEvent>();

    let handle = spawn_session_runtime(
        move || {
            let locator: Box<dyn ClipLocator> = match &clip_dir {
                Some(dir) => Box::new(DirClipLocator::new(dir)),
                None => Box::new(NoClips),
            };
            RodioBackend::new(locator, volume)
        },
        SystemClock,
        SessionConfig::from(&station.config),
        move |event| {
            let _ = tx.send(event);
        },
    )?;

    println!("Tuning in to '{}'...", descriptor.name);
    handle.tune_in(descriptor);

    let mut waiting_shown = false;
    for event in rx {
        match event {
            SessionEvent::Waiting { starts_in } => {
                if !waiting_shown {
                    println!("Starts in {}", format_duration(starts_in));
                    waiting_shown = true;
                }
            }
            SessionEvent::NowPlaying {
                index,
                title,
                offset,
                duration,
            } => {
                println!(
                    "\n>> [{}] {} (from {} of {})",
                    index + 1,
                    title,
                    format_duration(offset),
                    format_duration(duration)
                );
            }
            SessionEvent::Progress {
                elapsed,
                duration,
                fraction,
            } => {
                print!(
                    "\r   {} / {} ({:>3.0}%)",
                    format_duration(elapsed),
                    format_duration(duration),
                    fraction * 100.0
                );
                let _ = std::io::stdout().flush();
            }
            SessionEvent::ItemEnded { .. } => {}
            SessionEvent::PlayError { message, .. } => {
                eprintln!("\nPlayback error: {}", message);
            }
            SessionEvent::Stopped { reason } => {
                println!("\nStopped: {}", reason);
                break;
            }
        }
    }

    handle.shutdown();
    Ok(())
}

fn find<'a>(station: &'a Station, name: &str) -> Result<&'a BroadcastDescriptor> {
    station
        .find_broadcast(name)
        .ok_or_else(|| Error::from(ValidationError::UnknownBroadcast(name.to_string())))
}

fn reverb_or_default(name: Option<&str>, station: &Station) -> Result<ReverbIntensity> {
    match name {
        Some(name) => Ok(ReverbIntensity::from_str_loose(name)?),
        None => Ok(station.config.default_reverb),
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ValidationError::BadTimestamp(s.to_string()))
}

/// CLI positions are 1-based.
fn zero_based(index: usize, len: usize) -> Result<usize, ValidationError> {
    index
        .checked_sub(1)
        .ok_or(ValidationError::IndexOutOfRange { index, len })
}
