//! Generator utility functions
//!
//! This module provides common utility functions used by the generator,
//! including path expansion and HTTP fetching with retries.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::get_version;

/// Base delay between fetch attempts; attempt `n` waits `n` times this
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

// ============================================================================
// Path Utilities
// ============================================================================

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &str) -> String {
    if (path.starts_with("~/") || path == "~")
        && let Some(home) = dirs_home()
    {
        return path.replacen("~", &home, 1);
    }
    path.to_string()
}

/// Get home directory path
pub fn dirs_home() -> Option<String> {
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE").ok()
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOME").ok()
    }
}

pub fn is_remote(path_or_url: &str) -> bool {
    path_or_url.starts_with("http://") || path_or_url.starts_with("https://")
}

// ============================================================================
// HTTP Utilities
// ============================================================================

/// Fetch text content from a URL
pub async fn fetch_text(url: &str) -> Result<String> {
    debug!("Fetching URL: {}", url);

    let client = reqwest::Client::builder()
        .user_agent(format!("subconfuse/{}", get_version()))
        .build()
        .context("Failed to build HTTP client")?;

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch URL: {}", url))?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("HTTP request failed with status {}: {}", status, url);
    }

    let text = response
        .text()
        .await
        .with_context(|| format!("Failed to read response body from: {}", url))?;

    Ok(text)
}

/// Fetch text content, retrying up to `retries` more times with a linear
/// backoff. The last error is returned when every attempt fails.
pub async fn fetch_with_retry(url: &str, retries: u32) -> Result<String> {
    let mut attempt = 0;
    loop {
        match fetch_text(url).await {
            Ok(text) => return Ok(text),
            Err(e) if attempt < retries => {
                attempt += 1;
                warn!(
                    "Fetch failed (attempt {}/{}): {:#}",
                    attempt,
                    retries + 1,
                    e
                );
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Giving up on {} after {} attempt(s)", url, attempt + 1)
                });
            }
        }
    }
}

/// Read text from a local path (with `~` expansion) or an http(s) URL
pub async fn read_source(path_or_url: &str, retries: u32) -> Result<String> {
    if is_remote(path_or_url) {
        fetch_with_retry(path_or_url, retries).await
    } else {
        let expanded = expand_tilde(path_or_url);
        tokio::fs::read_to_string(&expanded)
            .await
            .with_context(|| format!("Failed to read {}", expanded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_expand_tilde_with_home() {
        if let Ok(home) = env::var("HOME") {
            let expanded = expand_tilde("~/test/path");
            assert!(expanded.starts_with(&home));
            assert!(expanded.ends_with("/test/path"));
            assert!(!expanded.contains('~'));
        }
    }

    #[test]
    fn test_expand_tilde_just_tilde() {
        if let Ok(home) = env::var("HOME") {
            assert_eq!(expand_tilde("~"), home);
        }
    }

    #[test]
    fn test_expand_tilde_untouched() {
        for path in ["/absolute/path/to/file", "./relative/path", "/some/~/path"] {
            assert_eq!(expand_tilde(path), path);
        }
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://example.com/sub"));
        assert!(is_remote("http://example.com/sub"));
        assert!(!is_remote("./links.txt"));
        assert!(!is_remote("ftp://example.com/links"));
    }

    #[tokio::test]
    async fn test_read_source_local_file() {
        let path = env::temp_dir().join(format!("subconfuse-read-{}.txt", std::process::id()));
        tokio::fs::write(&path, "vless://a@b:1#c\n").await.unwrap();

        let content = read_source(path.to_str().unwrap(), 0).await.unwrap();
        assert_eq!(content, "vless://a@b:1#c\n");

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_source_missing_file() {
        let err = read_source("/nonexistent/subconfuse/links.txt", 0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[tokio::test]
    async fn test_fetch_with_retry_reports_last_error() {
        // Port 9 (discard) is closed on test hosts; the connection is refused
        let err = fetch_with_retry("http://127.0.0.1:9/", 1).await.unwrap_err();
        assert!(format!("{:#}", err).contains("after 2 attempt(s)"));
    }
}
