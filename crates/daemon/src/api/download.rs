//! Streaming file responses with single-range support.

use axum::body::Body;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use futures::StreamExt;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio_util::codec::{BytesCodec, FramedRead};

use super::error::ApiError;
use crate::error::PipelineError;

pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Inclusive byte range for a `Range` header, or `None` to serve the whole file.
pub fn parse_range(range_str: &str, file_size: u64) -> Option<(u64, u64)> {
    let range = range_str.strip_prefix("bytes=")?;
    let (start_str, end_str) = range.split_once('-')?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    if file_size == 0 || (start_str.is_empty() && end_str.is_empty()) {
        return None;
    }

    let (start, end) = if start_str.is_empty() {
        // "-500": the last 500 bytes
        let suffix = end_str.parse::<u64>().ok()?;
        (file_size.saturating_sub(suffix), file_size - 1)
    } else {
        let start = start_str.parse::<u64>().ok()?;
        let end = if end_str.is_empty() {
            file_size - 1
        } else {
            end_str.parse::<u64>().ok()?.min(file_size - 1)
        };
        (start, end)
    };

    if start > end || start >= file_size {
        return None;
    }
    Some((start, end))
}

/// Streams `path`, honouring a single `Range` request.
pub async fn serve_file(
    path: &Path,
    headers: &HeaderMap,
    download_name: Option<&str>,
) -> Result<Response, ApiError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => return Err(ApiError::NotFound("file not found".to_string())),
    };
    let file_size = metadata.len();
    let content_type = content_type_for(path);

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_range(v, file_size));
    let (start, end, status) = match range {
        Some((start, end)) => (start, end, StatusCode::PARTIAL_CONTENT),
        None => (0, file_size.saturating_sub(1), StatusCode::OK),
    };
    let content_length = if file_size == 0 { 0 } else { end - start + 1 };

    let mut file = tokio::fs::File::open(path).await.map_err(PipelineError::from)?;
    file.seek(SeekFrom::Start(start))
        .await
        .map_err(PipelineError::from)?;

    let stream = FramedRead::new(file.take(content_length), BytesCodec::new())
        .map(|chunk| chunk.map(|bytes| bytes.freeze()));

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, content_length.to_string());
    if status == StatusCode::PARTIAL_CONTENT {
        builder = builder.header(
            header::CONTENT_RANGE,
            format!("bytes {start}-{end}/{file_size}"),
        );
    }
    if let Some(name) = download_name {
        builder = builder.header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}\""),
        );
    }

    builder
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::Pipeline(PipelineError::EngineExecution(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_range_forms() {
        assert_eq!(parse_range("bytes=0-99", 1000), Some((0, 99)));
        assert_eq!(parse_range("bytes=500-", 1000), Some((500, 999)));
        assert_eq!(parse_range("bytes=-100", 1000), Some((900, 999)));
        assert_eq!(parse_range("bytes=-5000", 1000), Some((0, 999)));
        assert_eq!(parse_range("bytes=900-5000", 1000), Some((900, 999)));
    }

    #[test]
    fn rejects_unsatisfiable_or_malformed_ranges() {
        assert_eq!(parse_range("bytes=1000-", 1000), None);
        assert_eq!(parse_range("bytes=50-10", 1000), None);
        assert_eq!(parse_range("bytes=-", 1000), None);
        assert_eq!(parse_range("items=0-1", 1000), None);
        assert_eq!(parse_range("bytes=0-1", 0), None);
        assert_eq!(parse_range("bytes=a-b", 1000), None);
    }

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type_for(Path::new("/x/final.mp4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("/x/voice.MP3")), "audio/mpeg");
        assert_eq!(content_type_for(Path::new("/x/blob")), "application/octet-stream");
    }
}
