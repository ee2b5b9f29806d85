use crate::error::AppError;

pub(crate) fn map_spawn_error(err: std::io::Error, tool: &str) -> AppError {
    match err.kind() {
        std::io::ErrorKind::NotFound => AppError::external_tool(format!("{tool} not found on PATH")),
        _ => AppError::external_tool(format!("failed to spawn {tool}: {err}")),
    }
}

pub(crate) fn tool_failure(tool: &str, status: std::process::ExitStatus, stderr: &[u8]) -> AppError {
    let stderr = String::from_utf8_lossy(stderr);
    AppError::external_tool(format!(
        "{tool} exited with status {status}: {}",
        stderr.trim()
    ))
}
