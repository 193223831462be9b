//! C6: synchronous "test URL" path. Reuses the frame grabber from
//! [`crate::capture`] with a temp file and returns a base64 data URI.

use std::time::Duration;

use base64::Engine;
use tracing::warn;

use crate::capture::grab_frame;
use crate::models::{StreamType, TestUrlResponse};

fn detect_stream_type(url: &str) -> StreamType {
    if url.to_ascii_lowercase().starts_with("rtsp://") {
        StreamType::Rtsp
    } else {
        StreamType::Http
    }
}

pub async fn test_url(url: &str, stream_type: Option<StreamType>, timeout: Duration) -> TestUrlResponse {
    let stream_type = stream_type.unwrap_or_else(|| detect_stream_type(url));

    let tmp = match tempfile::Builder::new().suffix(".jpg").tempfile() {
        Ok(f) => f,
        Err(e) => {
            return TestUrlResponse {
                success: false,
                message: format!("failed to create temp file: {e}"),
                image_data: None,
                image_size: None,
            };
        }
    };
    let output_path = tmp.path().to_path_buf();

    let result = grab_frame(url, stream_type, &output_path, timeout).await;

    match result {
        Ok(()) => match tokio::fs::read(&output_path).await {
            Ok(bytes) => {
                let image_size = bytes.len();
                let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
                TestUrlResponse {
                    success: true,
                    message: "successfully captured test image".to_string(),
                    image_data: Some(format!("data:image/jpeg;base64,{encoded}")),
                    image_size: Some(image_size),
                }
            }
            Err(e) => {
                warn!(url, error = %e, "probe succeeded but failed to read captured frame");
                TestUrlResponse {
                    success: false,
                    message: format!("capture reported success but frame could not be read: {e}"),
                    image_data: None,
                    image_size: None,
                }
            }
        },
        Err(e) => TestUrlResponse {
            success: false,
            message: format!("please check the url: {e}"),
            image_data: None,
            image_size: None,
        },
    }
    // tmp is removed on drop regardless of outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_rtsp_by_scheme() {
        assert_eq!(detect_stream_type("rtsp://camera.local/stream"), StreamType::Rtsp);
        assert_eq!(detect_stream_type("RTSP://camera.local/stream"), StreamType::Rtsp);
    }

    #[test]
    fn defaults_to_http() {
        assert_eq!(detect_stream_type("http://camera.local/frame.jpg"), StreamType::Http);
        assert_eq!(detect_stream_type("https://camera.local/frame.jpg"), StreamType::Http);
    }
}
