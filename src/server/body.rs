//! WAV response bodies streamed from a scratch file.
//!
//! The stream owns the [`ScratchFile`] guard, so the file is deleted exactly
//! once, when hyper drops the body: after the last byte is written or when
//! the connection goes away.

use super::error::ApiError;
use crate::scratch::ScratchFile;
use crate::synthesis::SynthesisOutput;
use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::io::ReaderStream;

/// Download name offered to clients.
pub const OUTPUT_FILENAME: &str = "output.wav";

/// Byte stream over a scratch file that deletes the file when dropped.
pub struct ScratchFileStream {
    inner: ReaderStream<tokio::fs::File>,
    _guard: ScratchFile,
}

impl ScratchFileStream {
    /// Open `guard`'s file for streaming.
    ///
    /// # Errors
    ///
    /// Returns the open error; the guard is dropped (and the file removed).
    pub async fn open(guard: ScratchFile) -> std::io::Result<Self> {
        let file = tokio::fs::File::open(guard.path()).await?;
        Ok(Self {
            inner: ReaderStream::new(file),
            _guard: guard,
        })
    }
}

impl Stream for ScratchFileStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

/// Build the `audio/wav` attachment response for a finished synthesis.
///
/// # Errors
///
/// 500 if the output file cannot be opened.
pub async fn wav_response(output: SynthesisOutput) -> Result<Response, ApiError> {
    let length = std::fs::metadata(output.file.path()).map(|m| m.len()).ok();
    let stream = ScratchFileStream::open(output.file).await.map_err(|e| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to open generated audio: {e}"),
        )
    })?;

    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/wav"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"output.wav\""),
    );
    if let Some(length) = length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::scratch::ScratchSpace;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn stream_yields_contents_then_deletes_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchSpace::new(Some(dir.path().to_path_buf())).unwrap();
        let guard = scratch.reserve_output().unwrap();
        std::fs::write(guard.path(), b"RIFF-wave-bytes").unwrap();
        let path = guard.path().to_path_buf();

        let mut stream = ScratchFileStream::open(guard).await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"RIFF-wave-bytes");
        // Still present until the body is dropped.
        assert!(path.exists());

        drop(stream);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn abandoned_stream_still_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchSpace::new(Some(dir.path().to_path_buf())).unwrap();
        let guard = scratch.reserve_output().unwrap();
        std::fs::write(guard.path(), vec![0u8; 64 * 1024]).unwrap();
        let path = guard.path().to_path_buf();

        let mut stream = ScratchFileStream::open(guard).await.unwrap();
        let _first = stream.next().await;
        drop(stream);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn response_has_wav_headers() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchSpace::new(Some(dir.path().to_path_buf())).unwrap();
        let guard = scratch.reserve_output().unwrap();
        std::fs::write(guard.path(), b"RIFF").unwrap();

        let response = wav_response(SynthesisOutput {
            file: guard,
            sample_rate: 24_000,
            samples: 0,
        })
        .await
        .unwrap();
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "audio/wav");
        assert!(
            headers[header::CONTENT_DISPOSITION]
                .to_str()
                .unwrap()
                .contains(OUTPUT_FILENAME)
        );
        assert_eq!(headers[header::CONTENT_LENGTH], "4");
    }
}
