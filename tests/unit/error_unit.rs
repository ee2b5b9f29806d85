use crate::error::AppError;
use axum::{http::StatusCode, response::IntoResponse};

#[test]
fn into_response_sets_http_status() {
    let cases = [
        (AppError::not_found("job"), StatusCode::NOT_FOUND),
        (AppError::validation("bad url"), StatusCode::BAD_REQUEST),
        (AppError::busy("downloading"), StatusCode::BAD_REQUEST),
        (AppError::storage_unavailable("refused"), StatusCode::SERVICE_UNAVAILABLE),
        (AppError::external_tool("yt-dlp exited"), StatusCode::BAD_GATEWAY),
        (AppError::selection("no audio"), StatusCode::INTERNAL_SERVER_ERROR),
        (AppError::persistence("fk"), StatusCode::INTERNAL_SERVER_ERROR),
    ];

    for (err, expected) in cases {
        assert_eq!(err.into_response().status(), expected);
    }
}

#[test]
fn helpers_format_messages() {
    assert_eq!(
        AppError::validation("bad value").to_string(),
        "validation failed: bad value"
    );
    assert_eq!(
        AppError::storage_unavailable("connection refused").to_string(),
        "blob storage unavailable: connection refused"
    );
}
