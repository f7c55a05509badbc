//! Shared HTTP plumbing for site adapters.
//!
//! Wraps a reqwest client with a browser user agent, cookie store, and
//! streaming file downloads that write to a temp path and rename on
//! success so interrupted transfers never leave truncated files behind.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use super::{ProgressSink, SiteError};
use crate::utils::format_size;

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko)";

/// Byte interval between progress messages on large transfers.
const PROGRESS_STEP: u64 = 5 * 1024 * 1024;

/// Minimum size for an existing file to count as already downloaded.
const MIN_EXISTING_SIZE: u64 = 1024;

/// HTTP client shared by adapters.
pub struct SiteClient {
    client: reqwest::Client,
}

impl SiteClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    fn check_status(status: reqwest::StatusCode) -> Result<(), SiteError> {
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(SiteError::Restricted);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SiteError::NotFound);
        }
        if !status.is_success() {
            return Err(SiteError::Status(status.as_u16()));
        }
        Ok(())
    }

    /// Fetch a page body as text.
    pub async fn fetch_text(&self, url: &str) -> Result<String, SiteError> {
        let response = self.client.get(url).send().await?;
        Self::check_status(response.status())?;
        Ok(response.text().await?)
    }

    /// Stream a file to `dest`, writing through a `.tmp` sibling.
    ///
    /// Returns the byte count. Existing files above 1 KiB are kept as-is
    /// (the manifest gate upstream normally prevents re-requests; this is
    /// the last line of defense against clobbering finished media).
    pub async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        progress: &ProgressSink,
    ) -> Result<u64, SiteError> {
        if let Ok(meta) = tokio::fs::metadata(dest).await {
            if meta.len() > MIN_EXISTING_SIZE {
                return Ok(meta.len());
            }
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self.client.get(url).send().await?;
        Self::check_status(response.status())?;
        let expected = response.content_length();

        let tmp_path = dest.with_extension("tmp");
        let result = self
            .stream_to_file(response, &tmp_path, expected, progress)
            .await;

        match result {
            Ok(written) if written > 0 => {
                tokio::fs::rename(&tmp_path, dest).await?;
                Ok(written)
            }
            Ok(_) => {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                Err(SiteError::Parse("empty response body".to_string()))
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                Err(e)
            }
        }
    }

    async fn stream_to_file(
        &self,
        response: reqwest::Response,
        tmp_path: &Path,
        expected: Option<u64>,
        progress: &ProgressSink,
    ) -> Result<u64, SiteError> {
        let mut file = tokio::fs::File::create(tmp_path).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        let mut next_report = PROGRESS_STEP;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;

            if written >= next_report {
                next_report += PROGRESS_STEP;
                match expected {
                    Some(total) => progress.send(format!(
                        "Downloading: {} / {}",
                        format_size(written),
                        format_size(total)
                    )),
                    None => progress.send(format!("Downloading: {}", format_size(written))),
                }
            }
        }

        file.flush().await?;
        Ok(written)
    }
}

/// Guess an audio file extension from a URL, defaulting to `.mp3`.
pub fn audio_extension(url: &str) -> &'static str {
    let path = url.split('?').next().unwrap_or(url).to_lowercase();
    if path.ends_with(".m4a") {
        ".m4a"
    } else if path.ends_with(".wav") {
        ".wav"
    } else {
        ".mp3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_extension() {
        assert_eq!(audio_extension("https://x/e.m4a"), ".m4a");
        assert_eq!(audio_extension("https://x/e.mp3?token=abc"), ".mp3");
        assert_eq!(audio_extension("https://x/e.wav"), ".wav");
        assert_eq!(audio_extension("https://x/episode"), ".mp3");
    }
}
