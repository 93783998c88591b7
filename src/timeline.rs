use crate::error::ValidationError;
use crate::radio_fx::{RenderedAudio, ReverbIntensity};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stable identifier of an item within one timeline.
pub type ItemId = u64;

/// Characters of speech text shown in listings before truncation.
const TEXT_PREVIEW_CHARS: usize = 50;

/// An externally hosted clip, played through its trim window with optional fades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalClip {
    pub reference: String,
    pub title: String,
    #[serde(with = "duration_serde")]
    pub trim_start: Duration,
    #[serde(with = "duration_serde")]
    pub trim_end: Duration,
    #[serde(with = "duration_serde")]
    pub fade_in: Duration,
    #[serde(with = "duration_serde")]
    pub fade_out: Duration,
}

impl ExternalClip {
    /// Validate a trim window. `source_len` is checked when the source length is known.
    pub fn new(
        reference: &str,
        title: &str,
        trim_start: f64,
        trim_end: f64,
        source_len: Option<f64>,
    ) -> Result<Self, ValidationError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ValidationError::EmptyReference);
        }
        let out_of_range = ValidationError::TrimRange {
            start: trim_start,
            end: trim_end,
        };
        if trim_start >= trim_end {
            return Err(out_of_range);
        }
        // Rejects negative, NaN, infinite and too-large-for-Duration values.
        let (Ok(start), Ok(end)) = (
            Duration::try_from_secs_f64(trim_start),
            Duration::try_from_secs_f64(trim_end),
        ) else {
            return Err(out_of_range);
        };
        if let Some(len) = source_len {
            if trim_end > len {
                return Err(ValidationError::TrimBeyondSource {
                    end: trim_end,
                    source_len: len,
                });
            }
        }
        let title = match title.trim() {
            "" => reference.to_string(),
            t => t.to_string(),
        };
        Ok(ExternalClip {
            reference: reference.to_string(),
            title,
            trim_start: start,
            trim_end: end,
            fade_in: Duration::ZERO,
            fade_out: Duration::ZERO,
        })
    }

    /// Attach fade windows. Each fade must fit inside the trimmed duration.
    pub fn with_fades(mut self, fade_in: f64, fade_out: f64) -> Result<Self, ValidationError> {
        let duration = self.duration().as_secs_f64();
        for (which, fade) in [("in", fade_in), ("out", fade_out)] {
            if !fade.is_finite() || fade < 0.0 || fade > duration {
                return Err(ValidationError::Fade {
                    which,
                    fade,
                    duration,
                });
            }
        }
        self.fade_in = Duration::from_secs_f64(fade_in);
        self.fade_out = Duration::from_secs_f64(fade_out);
        Ok(self)
    }

    pub fn duration(&self) -> Duration {
        self.trim_end.saturating_sub(self.trim_start)
    }
}

/// Synthesized speech, rendered through the radio filter when it was authored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechClip {
    pub text: String,
    pub reverb: ReverbIntensity,
    #[serde(with = "wav_base64")]
    pub wav: Vec<u8>,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl SpeechClip {
    pub fn new(
        text: &str,
        reverb: ReverbIntensity,
        rendered: &RenderedAudio,
    ) -> Result<Self, ValidationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyText);
        }
        Ok(SpeechClip {
            text: text.to_string(),
            reverb,
            wav: rendered.wav.clone(),
            duration: rendered.duration,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemContent {
    ExternalClip(ExternalClip),
    Speech(SpeechClip),
}

impl ItemContent {
    pub fn duration(&self) -> Duration {
        match self {
            ItemContent::ExternalClip(clip) => clip.duration(),
            ItemContent::Speech(speech) => speech.duration,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineItem {
    pub id: ItemId,
    /// Fixed when the item is appended.
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    pub content: ItemContent,
}

impl TimelineItem {
    /// Short label used by listings and now-playing output.
    pub fn title(&self) -> String {
        match &self.content {
            ItemContent::ExternalClip(clip) => clip.title.clone(),
            ItemContent::Speech(speech) => {
                let preview: String = speech.text.chars().take(TEXT_PREVIEW_CHARS).collect();
                if speech.text.chars().count() > TEXT_PREVIEW_CHARS {
                    format!("\"{}...\"", preview)
                } else {
                    format!("\"{}\"", preview)
                }
            }
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self.content {
            ItemContent::ExternalClip(_) => "clip",
            ItemContent::Speech(_) => "speech",
        }
    }

    /// Format duration as M:SS.
    pub fn duration_display(&self) -> String {
        format_duration(self.duration)
    }
}

/// Format a duration as M:SS.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Direction for a one-step move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

/// The authoring timeline. Insertion order is play order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    items: Vec<TimelineItem>,
    #[serde(default)]
    next_id: ItemId,
}

impl Timeline {
    pub fn new() -> Self {
        Timeline {
            items: Vec::new(),
            next_id: 1,
        }
    }

    /// Append an item and return its newly assigned id.
    pub fn append(&mut self, content: ItemContent) -> Result<ItemId, ValidationError> {
        let duration = content.duration();
        if duration.is_zero() {
            return Err(ValidationError::ZeroDuration);
        }
        // Ids start at 1 even for timelines loaded without a counter.
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        self.items.push(TimelineItem {
            id,
            duration,
            content,
        });
        Ok(id)
    }

    pub fn add_clip(&mut self, clip: ExternalClip) -> Result<ItemId, ValidationError> {
        self.append(ItemContent::ExternalClip(clip))
    }

    pub fn add_speech(
        &mut self,
        text: &str,
        reverb: ReverbIntensity,
        rendered: &RenderedAudio,
    ) -> Result<ItemId, ValidationError> {
        let speech = SpeechClip::new(text, reverb, rendered)?;
        self.append(ItemContent::Speech(speech))
    }

    /// Remove an item by index. Returns the removed item.
    pub fn remove(&mut self, index: usize) -> Result<TimelineItem, ValidationError> {
        self.check_index(index)?;
        Ok(self.items.remove(index))
    }

    /// Swap an item with its neighbour. Returns false when already at the edge.
    pub fn move_item(
        &mut self,
        index: usize,
        direction: MoveDirection,
    ) -> Result<bool, ValidationError> {
        self.check_index(index)?;
        let target = match direction {
            MoveDirection::Up if index > 0 => index - 1,
            MoveDirection::Down if index + 1 < self.items.len() => index + 1,
            _ => return Ok(false),
        };
        self.items.swap(index, target);
        Ok(true)
    }

    /// Move an item from one position to another (drag and drop).
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<(), ValidationError> {
        self.check_index(from)?;
        self.check_index(to)?;
        let item = self.items.remove(from);
        self.items.insert(to, item);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn items(&self) -> &[TimelineItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_duration(&self) -> Duration {
        total_duration(&self.items)
    }

    fn check_index(&self, index: usize) -> Result<(), ValidationError> {
        if index >= self.items.len() {
            return Err(ValidationError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        Ok(())
    }
}

pub fn total_duration(items: &[TimelineItem]) -> Duration {
    items
        .iter()
        .fold(Duration::ZERO, |acc, item| acc.saturating_add(item.duration))
}

pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    struct DurationRepr {
        secs: u64,
        nanos: u32,
    }

    pub fn serialize<S: Serializer>(dur: &Duration, s: S) -> Result<S::Ok, S::Error> {
        DurationRepr {
            secs: dur.as_secs(),
            nanos: dur.subsec_nanos(),
        }
        .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let repr = DurationRepr::deserialize(d)?;
        Ok(Duration::new(repr.secs, repr.nanos))
    }
}

mod wav_base64 {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
