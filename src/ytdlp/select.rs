//! Picks one audio and one video stream out of a `yt-dlp -F` listing.
//!
//! The listing is matched textually, line by line, and the tool's own
//! ordering is taken as preference order: the first qualifying line wins.

use crate::error::AppError;

const AUDIO_ONLY: &str = "audio only";
const VIDEO_ONLY: &str = "video only";
const PREFERRED_RESOLUTION: &str = "1080p";
const AUDIO_LANGUAGE_TAGS: [&str; 2] = ["[pt]", "[pt-BR]"];

/// Raw format lines for a single source URL, in the order the tool printed them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatListing {
    lines: Vec<String>,
}

impl FormatListing {
    pub fn from_output(stdout: &str) -> Self {
        Self {
            lines: stdout
                .lines()
                .map(str::trim_end)
                .filter(|line| !line.trim().is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSelection {
    pub audio_stream_id: Option<String>,
    pub video_stream_id: Option<String>,
}

impl StreamSelection {
    /// Both ids, or the reason ingestion cannot go ahead. Audio is checked first.
    pub fn require(self) -> Result<(String, String), AppError> {
        let audio = self
            .audio_stream_id
            .ok_or_else(|| AppError::selection("no Portuguese audio track available"))?;
        let video = self
            .video_stream_id
            .ok_or_else(|| AppError::selection("no video-only stream available"))?;
        Ok((audio, video))
    }
}

pub fn select_streams(listing: &FormatListing) -> StreamSelection {
    StreamSelection {
        audio_stream_id: select_audio(listing),
        video_stream_id: select_video(listing),
    }
}

fn select_audio(listing: &FormatListing) -> Option<String> {
    listing
        .lines()
        .filter_map(format_row)
        .find(|(_, line)| {
            line.contains(AUDIO_ONLY) && AUDIO_LANGUAGE_TAGS.iter().any(|tag| line.contains(tag))
        })
        .map(|(id, _)| id.to_owned())
}

fn select_video(listing: &FormatListing) -> Option<String> {
    let mut fallback = None;
    for (id, line) in listing.lines().filter_map(format_row) {
        if !line.contains(VIDEO_ONLY) {
            continue;
        }
        if line.contains(PREFERRED_RESOLUTION) {
            return Some(id.to_owned());
        }
        fallback.get_or_insert(id);
    }
    fallback.map(str::to_owned)
}

/// Splits a table row into its format id and the full line; headers,
/// rules and log lines yield `None`.
fn format_row(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.starts_with('[') {
        return None;
    }

    let id = trimmed.split_whitespace().next()?;
    if id.eq_ignore_ascii_case("id") || id.eq_ignore_ascii_case("format") {
        return None;
    }
    if !id.chars().next().is_some_and(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    Some((id, trimmed))
}
