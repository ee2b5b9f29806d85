use tokio::process::Command;

use crate::error::AppError;

use super::{
    select::FormatListing,
    util::{map_spawn_error, tool_failure},
};

pub(super) async fn probe_formats(bin: &str, url: &str) -> Result<FormatListing, AppError> {
    tracing::debug!(url, "probing available formats");

    let output = Command::new(bin)
        .arg("--ignore-config")
        .arg("--no-warnings")
        .arg("--no-playlist")
        .arg("-F")
        .arg(url)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| map_spawn_error(err, bin))?;

    if !output.status.success() {
        return Err(tool_failure(bin, output.status, &output.stderr));
    }

    let listing = FormatListing::from_output(&String::from_utf8_lossy(&output.stdout));
    tracing::debug!(url, lines = listing.len(), "format listing received");

    Ok(listing)
}
