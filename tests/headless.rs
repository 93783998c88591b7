//! Headless integration tests for signal_cast.
//!
//! These drive the library end to end (authoring, going live, persisting,
//! resolving and listening) without an audio device.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use signal_cast::broadcast::{BroadcastDescriptor, BroadcastStatus, GoLive};
use signal_cast::clip_source::external_reference_from_url;
use signal_cast::error::{PlaybackError, ValidationError};
use signal_cast::player::{ItemPlayer, PlayerBackend};
use signal_cast::radio_fx::{RadioFilter, ReverbIntensity};
use signal_cast::scheduler::{Position, resolve_position};
use signal_cast::session::{
    ManualClock, PlaybackSession, SessionConfig, SessionEvent, SessionState, StopReason,
};
use signal_cast::station::Station;
use signal_cast::synth::{SpeechSynthesizer, VoiceSettings, synthesize_and_render};
use signal_cast::timeline::{ExternalClip, ItemContent, MoveDirection, SpeechClip};
use signal_cast::wav::decode_wav;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 1, 18, 0, 0).unwrap()
}

/// 0.5 s of a square-ish buzz per call.
struct BuzzSynth;

impl SpeechSynthesizer for BuzzSynth {
    fn synthesize(
        &self,
        _text: &str,
        _voice: &VoiceSettings,
    ) -> Result<Vec<u8>, signal_cast::error::SynthesisError> {
        Ok((0..11025).map(|i| if i % 50 < 25 { 190 } else { 66 }).collect())
    }
}

/// Records which items were started and where.
#[derive(Clone, Default)]
struct RecordingBackend {
    started: Arc<Mutex<Vec<(String, Duration)>>>,
    ended: Arc<Mutex<bool>>,
}

struct RecordingPlayer {
    label: String,
    started: Arc<Mutex<Vec<(String, Duration)>>>,
    ended: Arc<Mutex<bool>>,
}

impl ItemPlayer for RecordingPlayer {
    fn start(&mut self, seek: Duration) -> Result<(), PlaybackError> {
        self.started.lock().unwrap().push((self.label.clone(), seek));
        Ok(())
    }
    fn stop(&mut self) {}
    fn has_ended(&self) -> bool {
        *self.ended.lock().unwrap()
    }
}

impl RecordingBackend {
    fn open(&self, label: String) -> Box<dyn ItemPlayer> {
        *self.ended.lock().unwrap() = false;
        Box::new(RecordingPlayer {
            label,
            started: self.started.clone(),
            ended: self.ended.clone(),
        })
    }
}

impl PlayerBackend for RecordingBackend {
    fn external_clip(&mut self, clip: &ExternalClip) -> Result<Box<dyn ItemPlayer>, PlaybackError> {
        Ok(self.open(clip.reference.clone()))
    }
    fn speech(&mut self, speech: &SpeechClip) -> Result<Box<dyn ItemPlayer>, PlaybackError> {
        decode_wav(&speech.wav).map_err(PlaybackError::Decode)?;
        Ok(self.open(speech.text.clone()))
    }
}

fn author_show(station: &mut Station) {
    let reference = external_reference_from_url("https://youtu.be/dQw4w9WgXcQ?t=10").unwrap();
    let clip = ExternalClip::new(&reference, "Opening theme", 10.0, 20.0, Some(212.0))
        .unwrap()
        .with_fades(2.0, 2.0)
        .unwrap();
    station.draft.add_clip(clip).unwrap();

    let rendered = synthesize_and_render(
        &BuzzSynth,
        &RadioFilter::new(),
        "This is signal cast",
        &VoiceSettings::default(),
        ReverbIntensity::Medium,
        Some(42),
    )
    .unwrap();
    station
        .draft
        .add_speech("This is signal cast", ReverbIntensity::Medium, &rendered)
        .unwrap();
}

// ── Authoring to broadcast ────────────────────────────────────────────────

#[test]
fn author_go_live_and_resolve() {
    let mut station = Station::new();
    author_show(&mut station);
    assert_eq!(station.draft.total_duration(), Duration::from_millis(10_500));

    // Speech first, then the clip.
    assert!(station.draft.move_item(1, MoveDirection::Up).unwrap());
    assert!(!station.draft.move_item(0, MoveDirection::Up).unwrap());

    let descriptor = station
        .go_live(
            GoLive {
                name: "Evening Show".into(),
                is_looping: true,
                ..Default::default()
            },
            t0(),
        )
        .unwrap()
        .clone();
    assert!(station.draft.is_empty());

    match resolve_position(&descriptor, t0() + TimeDelta::milliseconds(3_500)).unwrap() {
        Position::Playing {
            index,
            item,
            offset,
            total,
        } => {
            assert_eq!(index, 1);
            assert!(matches!(item.content, ItemContent::ExternalClip(_)));
            assert_eq!(offset, Duration::from_secs(3));
            assert_eq!(total, Duration::from_millis(10_500));
        }
        other => panic!("expected Playing, got {:?}", other),
    }
}

#[test]
fn editing_draft_after_go_live_does_not_change_broadcast() {
    let mut station = Station::new();
    author_show(&mut station);
    let before = station
        .go_live(
            GoLive {
                name: "Frozen".into(),
                ..Default::default()
            },
            t0(),
        )
        .unwrap()
        .clone();

    author_show(&mut station);
    station.draft.remove(0).unwrap();
    assert_eq!(station.find_broadcast("frozen"), Some(&before));
}

#[test]
fn authoring_errors_are_reported() {
    let mut station = Station::new();
    assert!(matches!(
        ExternalClip::new("dQw4w9WgXcQ", "x", 50.0, 20.0, None),
        Err(ValidationError::TrimRange { .. })
    ));
    assert!(matches!(
        ExternalClip::new("dQw4w9WgXcQ", "x", 0.0, 300.0, Some(212.0)),
        Err(ValidationError::TrimBeyondSource { .. })
    ));
    assert!(external_reference_from_url("https://example.com/").is_err());
    assert!(station.draft.remove(3).is_err());
    assert_eq!(
        station
            .go_live(
                GoLive {
                    name: "Nothing".into(),
                    ..Default::default()
                },
                t0()
            )
            .unwrap_err(),
        ValidationError::EmptyTimeline
    );
}

// ── Persistence ───────────────────────────────────────────────────────────

#[test]
fn broadcast_survives_station_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("station.json");

    let mut station = Station::load_from(&path);
    author_show(&mut station);
    station
        .go_live(
            GoLive {
                name: "Archive".into(),
                is_looping: true,
                ..Default::default()
            },
            t0(),
        )
        .unwrap();
    station.save().unwrap();

    let loaded = Station::load_from(&path);
    let original = station.find_broadcast("Archive").unwrap();
    let reloaded = loaded.find_broadcast("Archive").unwrap();
    assert_eq!(original, reloaded);

    // Two listeners with the same clock agree, whichever copy they hold.
    let now = t0() + TimeDelta::seconds(86_400 * 3 + 7);
    assert_eq!(
        resolve_position(original, now).unwrap(),
        resolve_position(reloaded, now).unwrap()
    );

    // Stored speech audio is still a valid WAV.
    let ItemContent::Speech(speech) = &reloaded.timeline()[1].content else {
        panic!("expected speech item");
    };
    let decoded = decode_wav(&speech.wav).unwrap();
    assert_eq!(decoded.sample_rate, 22050);
    assert_eq!(decoded.frames(), 11025);
}

#[test]
fn stopped_broadcast_disappears_from_listings() {
    let mut station = Station::new();
    author_show(&mut station);
    station
        .go_live(
            GoLive {
                name: "Pop-up".into(),
                is_looping: true,
                ..Default::default()
            },
            t0(),
        )
        .unwrap();
    station.stop_broadcast("pop-up", t0() + TimeDelta::minutes(1)).unwrap();
    let now = t0() + TimeDelta::minutes(2);
    assert!(station.live_broadcasts(now).is_empty());
    assert_eq!(
        station.find_broadcast("Pop-up").unwrap().status(now),
        BroadcastStatus::Stopped
    );
    assert_eq!(station.prune_ended(now), 1);
}

#[test]
fn stopped_broadcast_resolves_off_air() {
    let mut station = Station::new();
    author_show(&mut station);
    station
        .go_live(
            GoLive {
                name: "Night Loop".into(),
                is_looping: true,
                ..Default::default()
            },
            t0(),
        )
        .unwrap();
    let stop_at = t0() + TimeDelta::seconds(25);
    let stopped = station.stop_broadcast("night loop", stop_at).unwrap().clone();

    // A loop would otherwise play forever; after the stop nobody hears it.
    assert!(matches!(
        resolve_position(&stopped, stop_at - TimeDelta::seconds(1)).unwrap(),
        Position::Playing { .. }
    ));
    let pos = resolve_position(&stopped, stop_at + TimeDelta::hours(6)).unwrap();
    assert_eq!(pos, Position::OffAir { since: stop_at });
    assert!(pos.has_ended());
}

// ── Listening ─────────────────────────────────────────────────────────────

fn live_show(looping: bool) -> BroadcastDescriptor {
    let mut station = Station::new();
    author_show(&mut station);
    station
        .go_live(
            GoLive {
                name: "Listen".into(),
                is_looping: looping,
                ..Default::default()
            },
            t0(),
        )
        .unwrap()
        .clone()
}

#[test]
fn listener_follows_full_loop() {
    let backend = RecordingBackend::default();
    let clock = ManualClock::new(t0() + TimeDelta::seconds(4));
    let mut session = PlaybackSession::new(backend.clone(), clock.clone(), SessionConfig::default());

    let events = session.tune_in(live_show(true));
    assert!(matches!(
        &events[0],
        SessionEvent::NowPlaying { index: 0, title, .. } if title == "Opening theme"
    ));

    // Clip runs out at 10 s; speech follows from its start.
    clock.set(t0() + TimeDelta::seconds(10));
    *backend.ended.lock().unwrap() = true;
    session.tick();

    // Speech ends at 10.5 s; the loop restarts with the clip.
    clock.set(t0() + TimeDelta::milliseconds(10_500));
    *backend.ended.lock().unwrap() = true;
    session.tick();

    let started = backend.started.lock().unwrap().clone();
    assert_eq!(
        started,
        vec![
            ("dQw4w9WgXcQ".to_string(), Duration::from_secs(14)),
            ("This is signal cast".to_string(), Duration::ZERO),
            ("dQw4w9WgXcQ".to_string(), Duration::from_secs(10)),
        ]
    );
    assert!(matches!(session.state(), SessionState::Playing { index: 0, .. }));
}

#[test]
fn late_listener_joins_mid_speech() {
    let backend = RecordingBackend::default();
    let clock = ManualClock::new(t0() + TimeDelta::milliseconds(10_250));
    let mut session = PlaybackSession::new(backend.clone(), clock, SessionConfig::default());
    session.tune_in(live_show(false));
    assert_eq!(
        backend.started.lock().unwrap()[0],
        ("This is signal cast".to_string(), Duration::from_millis(250))
    );
}

#[test]
fn listener_stops_when_one_shot_broadcast_ends() {
    let backend = RecordingBackend::default();
    let clock = ManualClock::new(t0() + TimeDelta::seconds(10));
    let mut session = PlaybackSession::new(backend.clone(), clock.clone(), SessionConfig::default());
    session.tune_in(live_show(false));

    clock.set(t0() + TimeDelta::seconds(11));
    *backend.ended.lock().unwrap() = true;
    let events = session.tick();
    assert_eq!(
        events.last(),
        Some(&SessionEvent::Stopped {
            reason: StopReason::BroadcastEnded
        })
    );
}
