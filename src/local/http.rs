//! HTTP downloads with resume.
//!
//! # Design
//!
//! - Provider links are resolved to a direct URL first: direct links pass
//!   through, Dropbox share links get `dl=1`, Mediafire share pages are
//!   fetched and scanned for the numbered download host
//! - The body streams into `<dest>.part`; an existing `.part` is resumed with
//!   `Range: bytes=N-`
//! - A `.part` left by an interrupted transfer is kept for the next attempt
//! - Only `Started`/`Progress` events are sent; the orchestrator owns the
//!   terminal event

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{PatcherError, Result};
use crate::local::copier::{partial_path, ProgressTracker};
use crate::progress::ProgressEvent;
use crate::services::{emit, DownloadService, EventSink, TransferRequest};
use crate::types::Provider;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Link Resolution
// ============================================================================

/// Turn a Dropbox share link into one that serves the file itself.
pub fn dropbox_direct_url(share_url: &str) -> String {
    if share_url.contains("dl=0") {
        return share_url.replace("dl=0", "dl=1");
    }
    if share_url.contains("dl=1") {
        return share_url.to_string();
    }
    let sep = if share_url.contains('?') { '&' } else { '?' };
    format!("{}{}dl=1", share_url, sep)
}

/// Find the `https://downloadN.mediafire.com/...` link in a share page.
pub fn find_mediafire_download_url(html: &str) -> Option<String> {
    const PREFIX: &str = "https://download";
    const HOST: &str = ".mediafire.com/";

    let mut rest = html;
    while let Some(start) = rest.find(PREFIX) {
        let candidate = &rest[start..];
        let after = &candidate[PREFIX.len()..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        if digits > 0 && after[digits..].starts_with(HOST) {
            let end = candidate
                .find(|c: char| matches!(c, '"' | '\'' | '<' | '>') || c.is_whitespace())
                .unwrap_or(candidate.len());
            return Some(candidate[..end].to_string());
        }
        rest = after;
    }
    None
}

/// Total size from `Content-Range: bytes 100-199/500`, if the server knows it.
pub fn content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next().and_then(|total| total.trim().parse().ok())
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

// ============================================================================
// Resume Decisions
// ============================================================================

/// How a response relates to the bytes already in `.part`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeFrom {
    /// Server honoured the range; append after `n` bytes
    Offset(u64),
    /// Server sent the whole file; start over
    Start,
    /// The range starts at or past the end; `.part` is already whole
    Finished,
    /// The range request was refused; drop `.part` and ask again without it
    Retry,
}

pub fn resume_decision(status: StatusCode, existing: u64) -> Result<ResumeFrom> {
    match status {
        StatusCode::PARTIAL_CONTENT if existing > 0 => Ok(ResumeFrom::Offset(existing)),
        StatusCode::PARTIAL_CONTENT | StatusCode::OK => Ok(ResumeFrom::Start),
        StatusCode::RANGE_NOT_SATISFIABLE if existing > 0 => Ok(ResumeFrom::Finished),
        s if s.is_client_error() && existing > 0 => Ok(ResumeFrom::Retry),
        s => Err(PatcherError::transfer(format!("server answered {}", s))),
    }
}

// ============================================================================
// HTTP Transfer
// ============================================================================

/// Download service over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpTransfer {
    client: reqwest::Client,
    progress_interval: Duration,
}

impl HttpTransfer {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| PatcherError::config(format!("HTTP client: {}", e)))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            progress_interval: Duration::from_millis(100),
        }
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Direct URL for a provider link.
    pub async fn resolve(&self, provider: Provider, url: &str) -> Result<String> {
        if !is_http_url(url) {
            return Err(PatcherError::transfer(format!("{} is not an HTTP link", url)));
        }
        match provider {
            Provider::Direct => Ok(url.to_string()),
            Provider::Dropbox => Ok(dropbox_direct_url(url)),
            Provider::Mediafire => self.resolve_mediafire(url).await,
            other => Err(PatcherError::transfer(format!(
                "{} links can't be downloaded automatically: {}",
                other, url
            ))),
        }
    }

    async fn resolve_mediafire(&self, share_url: &str) -> Result<String> {
        tracing::debug!(url = share_url, "Fetching Mediafire share page");
        let response = self
            .client
            .get(share_url)
            .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(|e| PatcherError::transfer(format!("{}: {}", share_url, e)))?;
        if !response.status().is_success() {
            return Err(PatcherError::transfer(format!(
                "{}: share page answered {}",
                share_url,
                response.status()
            )));
        }
        let html = response
            .text()
            .await
            .map_err(|e| PatcherError::transfer(format!("{}: {}", share_url, e)))?;
        find_mediafire_download_url(&html).ok_or_else(|| {
            PatcherError::transfer(format!("{}: no download link on the share page", share_url))
        })
    }

    async fn request(&self, url: &str, existing: u64) -> Result<reqwest::Response> {
        let mut request = self.client.get(url);
        if existing > 0 {
            request = request.header(RANGE, format!("bytes={}-", existing));
        }
        request
            .send()
            .await
            .map_err(|e| PatcherError::transfer(format!("{}: {}", url, e)))
    }

    /// Stream `url` into `dest`, resuming a leftover `.part` when the server
    /// allows it. Returns the number of bytes in the finished file.
    pub async fn fetch(
        &self,
        request: &TransferRequest,
        url: &str,
        dest: &Path,
        sink: &EventSink,
    ) -> Result<u64> {
        let partial = partial_path(dest);
        let mut existing = match fs::metadata(&partial).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let mut response = self.request(url, existing).await?;
        let mut from = resume_decision(response.status(), existing)?;
        if from == ResumeFrom::Retry {
            tracing::info!(module = %request.module, status = %response.status(), "Range refused; downloading from the start");
            fs::remove_file(&partial).await?;
            existing = 0;
            response = self.request(url, 0).await?;
            from = resume_decision(response.status(), 0)?;
        }

        let offset = match from {
            ResumeFrom::Finished => {
                tracing::info!(module = %request.module, bytes = existing, "Partial download already complete");
                emit(
                    sink,
                    ProgressEvent::Started {
                        id: request.id.clone(),
                        display_name: request.display_name.clone(),
                        total_units: existing,
                    },
                );
                fs::rename(&partial, dest).await?;
                return Ok(existing);
            }
            ResumeFrom::Offset(n) => n,
            ResumeFrom::Start | ResumeFrom::Retry => 0,
        };

        let total = match from {
            ResumeFrom::Offset(n) => response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(content_range_total)
                .or_else(|| response.content_length().map(|len| len + n))
                .unwrap_or(0),
            _ => response.content_length().unwrap_or(0),
        };

        tracing::debug!(
            module = %request.module,
            url,
            offset,
            total,
            "Downloading"
        );
        emit(
            sink,
            ProgressEvent::Started {
                id: request.id.clone(),
                display_name: request.display_name.clone(),
                total_units: total,
            },
        );

        let mut file = if offset > 0 {
            fs::OpenOptions::new().append(true).open(&partial).await?
        } else {
            fs::File::create(&partial).await?
        };
        let mut tracker =
            ProgressTracker::new(request.id.clone(), total, self.progress_interval).resume_from(offset);

        let mut body = std::pin::pin!(response.bytes_stream());
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| {
                PatcherError::transfer(format!("{}: connection lost after {} bytes: {}", url, tracker.done(), e))
            })?;
            file.write_all(&chunk).await?;
            if let Some(event) = tracker.update(chunk.len() as u64) {
                emit(sink, event);
            }
        }
        file.flush().await?;
        drop(file);
        emit(sink, tracker.event());

        if total > 0 && tracker.done() != total {
            return Err(PatcherError::transfer(format!(
                "{}: received {} of {} bytes",
                url,
                tracker.done(),
                total
            )));
        }
        fs::rename(&partial, dest).await?;
        Ok(tracker.done())
    }
}

#[async_trait]
impl DownloadService for HttpTransfer {
    async fn transfer(&self, request: TransferRequest, sink: EventSink) -> Result<PathBuf> {
        let url = self.resolve(request.provider, &request.url).await?;
        let file_name = match &request.target_file_name {
            Some(name) => name.clone(),
            None => file_name_from_url(&url)
                .ok_or_else(|| PatcherError::transfer(format!("{} has no file name", url)))?,
        };
        fs::create_dir_all(&request.dest_dir).await?;
        let dest = request.dest_dir.join(file_name);

        let bytes = self.fetch(&request, &url, &dest, &sink).await?;
        tracing::info!(module = %request.module, bytes, path = %dest.display(), "Download finished");
        Ok(dest)
    }
}

fn file_name_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && !name.contains(':'))
        .map(str::to_string)
}
