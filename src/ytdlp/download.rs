use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::process::Command;

use crate::{error::AppError, workspace::ensure_dir};

use super::util::{map_spawn_error, tool_failure};

const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";
const SUBTITLE_LANGS: &str = "pt,pt-BR";
const AFTER_MOVE_REPORT: &str = "after_move:%(.{title,thumbnail,filepath})j";

#[derive(Debug, Clone, Copy)]
pub struct DownloadRequest<'a> {
    pub url: &'a str,
    /// Private to the job; everything the tool writes lands here.
    pub output_dir: &'a Path,
    pub video_stream_id: &'a str,
    pub audio_stream_id: &'a str,
}

impl DownloadRequest<'_> {
    pub fn format_selector(&self) -> String {
        format!("{}+{}", self.video_stream_id, self.audio_stream_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedMedia {
    pub path: PathBuf,
    pub title: String,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AfterMoveReport {
    title: Option<String>,
    thumbnail: Option<String>,
    filepath: String,
}

pub(super) async fn download_merged(
    bin: &str,
    request: &DownloadRequest<'_>,
) -> Result<DownloadedMedia, AppError> {
    let output_dir = request.output_dir;
    ensure_dir(output_dir).await?;

    let format = request.format_selector();
    tracing::debug!(url = request.url, %format, dir = %output_dir.display(), "yt-dlp download starting");

    let output = Command::new(bin)
        .arg("--ignore-config")
        .arg("--no-warnings")
        .arg("--no-progress")
        .arg("--no-playlist")
        .arg("--no-part")
        .arg("--restrict-filenames")
        .arg("-f")
        .arg(&format)
        .arg("--merge-output-format")
        .arg("mp4")
        .arg("--write-subs")
        .arg("--write-auto-subs")
        .arg("--sub-langs")
        .arg(SUBTITLE_LANGS)
        .arg("--embed-subs")
        .arg("--output")
        .arg(output_dir.join(OUTPUT_TEMPLATE))
        .arg("--print")
        .arg(AFTER_MOVE_REPORT)
        .arg(request.url)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| map_spawn_error(err, bin))?;

    if !output.status.success() {
        return Err(tool_failure(bin, output.status, &output.stderr));
    }

    let media = parse_report(&String::from_utf8_lossy(&output.stdout), output_dir)?;
    if !media.path.exists() {
        return Err(AppError::external_tool(format!(
            "{bin} reported output {}, but file is missing",
            media.path.display()
        )));
    }

    tracing::debug!(url = request.url, path = %media.path.display(), "yt-dlp download finished");
    Ok(media)
}

/// Reads the last JSON line printed after the merged file was moved into place.
fn parse_report(stdout: &str, output_dir: &Path) -> Result<DownloadedMedia, AppError> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with('{'))
        .ok_or_else(|| AppError::external_tool("yt-dlp did not report an output file"))?;

    let report: AfterMoveReport = serde_json::from_str(line)
        .map_err(|err| AppError::external_tool(format!("unreadable yt-dlp report: {err}")))?;

    let mut path = PathBuf::from(report.filepath.trim());
    if path.is_relative() {
        path = output_dir.join(path);
    }

    let title = report
        .title
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
        .or_else(|| {
            path.file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| "untitled".to_string());

    Ok(DownloadedMedia {
        path,
        title,
        thumbnail_url: report.thumbnail.filter(|url| !url.is_empty()),
    })
}
