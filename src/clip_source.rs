//! External clip references: parsing them out of video URLs and finding
//! locally cached audio for them.

use crate::error::ValidationError;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::tag::Accessor;
use std::path::{Path, PathBuf};
use std::time::Duration;

const REFERENCE_LEN: usize = 11;
const CLIP_EXTENSIONS: [&str; 5] = ["mp3", "m4a", "ogg", "flac", "wav"];

/// Extract the 11-character video reference from a URL, or accept a bare reference.
pub fn external_reference_from_url(url: &str) -> Result<String, ValidationError> {
    let url = url.trim();
    if is_reference(url) {
        return Ok(url.to_string());
    }

    let rest = marker_end(url)
        .map(|end| &url[end..])
        .ok_or_else(|| ValidationError::BadUrl(url.to_string()))?;
    let rest = rest.strip_prefix('?').unwrap_or(rest);
    let rest = rest.strip_prefix('v').unwrap_or(rest);
    let rest = rest.strip_prefix('=').unwrap_or(rest);
    let id: String = rest
        .chars()
        .take_while(|c| !matches!(c, '#' | '&' | '?'))
        .collect();

    if is_reference(&id) {
        Ok(id)
    } else {
        Err(ValidationError::BadUrl(url.to_string()))
    }
}

fn is_reference(s: &str) -> bool {
    s.len() == REFERENCE_LEN
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Byte offset just past the last recognised path marker.
fn marker_end(url: &str) -> Option<usize> {
    let mut best: Option<usize> = None;
    let mut consider = |end: usize| {
        if best.is_none_or(|b| end > b) {
            best = Some(end);
        }
    };

    for marker in ["youtu.be/", "v/", "embed/", "watch?"] {
        if let Some(pos) = url.rfind(marker) {
            consider(pos + marker.len());
        }
    }

    // "/u/<word>/" share links.
    let mut search = 0;
    while let Some(found) = url[search..].find("/u/") {
        let word_start = search + found + 3;
        let word_len = url[word_start..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .count();
        if word_len > 0 && url[word_start + word_len..].starts_with('/') {
            consider(word_start + word_len + 1);
        }
        search = word_start;
    }

    best
}

/// Metadata read from a locally cached clip.
#[derive(Debug, Clone)]
pub struct ClipProbe {
    pub path: PathBuf,
    pub title: Option<String>,
    pub source_len: Duration,
}

/// Read source length and title tag from an audio file.
pub fn probe_clip(path: &Path) -> Result<ClipProbe, String> {
    let tagged_file = lofty::read_from_path(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;

    let source_len = tagged_file.properties().duration();
    let title = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
        .and_then(|t| t.title().map(|s| s.to_string()));

    Ok(ClipProbe {
        path: path.to_path_buf(),
        title,
        source_len,
    })
}

/// Finds playable local audio for an external reference.
pub trait ClipLocator: Send {
    fn locate(&self, reference: &str) -> Option<PathBuf>;
}

/// Looks for `<dir>/<reference>.<ext>` over the common audio extensions.
#[derive(Debug, Clone)]
pub struct DirClipLocator {
    dir: PathBuf,
}

impl DirClipLocator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirClipLocator { dir: dir.into() }
    }
}

impl ClipLocator for DirClipLocator {
    fn locate(&self, reference: &str) -> Option<PathBuf> {
        CLIP_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{}.{}", reference, ext)))
            .find(|p| p.is_file())
    }
}

/// A locator that never finds anything (no clip cache configured).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClips;

impl ClipLocator for NoClips {
    fn locate(&self, _reference: &str) -> Option<PathBuf> {
        None
    }
}
