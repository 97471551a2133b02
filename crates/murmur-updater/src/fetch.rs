//! Remote manifest, release-notes, and archive retrieval.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::{StatusCode, Url};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{Result, UpdateError};

/// HTTP client for the update endpoints.
///
/// Built with an explicit request timeout and with automatic redirect
/// following disabled; [`RemoteFetcher::download_file`] follows
/// redirects by hand so the depth stays bounded.
#[derive(Debug, Clone)]
pub struct RemoteFetcher {
    client: reqwest::Client,
    redirect_limit: usize,
}

impl RemoteFetcher {
    /// Creates a fetcher with the given timeout and redirect cap.
    pub fn new(timeout: Duration, redirect_limit: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("murmur/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            client,
            redirect_limit,
        })
    }

    /// Fetches a URL and parses the full response body as JSON.
    pub async fn fetch_json(&self, url: &str) -> Result<serde_json::Value> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Download { status });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Streams the response body for `url` into a file at `dest`.
    ///
    /// Redirects are followed up to the configured cap. Every failure
    /// path removes the partial file, so either the complete download
    /// exists at `dest` or nothing does.
    pub async fn download_file(&self, url: &str, dest: &Path) -> Result<()> {
        let mut target = url.to_string();

        for _ in 0..=self.redirect_limit {
            let response = match self.client.get(&target).send().await {
                Ok(response) => response,
                Err(e) => {
                    remove_partial(dest).await;
                    return Err(e.into());
                }
            };

            let status = response.status();
            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_owned);
                remove_partial(dest).await;

                let Some(location) = location else {
                    return Err(UpdateError::Download { status });
                };
                // Location may be relative; resolve against the current hop.
                let next = Url::parse(&target)
                    .and_then(|base| base.join(&location))
                    .map_err(|_| UpdateError::Download { status })?;
                debug!(%status, location = %next, "following download redirect");
                target = next.into();
                continue;
            }

            if status != StatusCode::OK {
                remove_partial(dest).await;
                return Err(UpdateError::Download { status });
            }

            return write_body(response, dest).await;
        }

        remove_partial(dest).await;
        Err(UpdateError::RedirectLimit {
            limit: self.redirect_limit,
        })
    }
}

/// Streams a successful response's body to `dest`.
async fn write_body(response: reqwest::Response, dest: &Path) -> Result<()> {
    let mut file = fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                drop(file);
                remove_partial(dest).await;
                return Err(e.into());
            }
        };
        if let Err(e) = file.write_all(&chunk).await {
            drop(file);
            remove_partial(dest).await;
            return Err(e.into());
        }
    }

    file.flush().await?;
    Ok(())
}

/// Best-effort removal of a partial download.
async fn remove_partial(dest: &Path) {
    if let Err(e) = fs::remove_file(dest).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %dest.display(), error = %e, "failed to remove partial download");
        }
    }
}
