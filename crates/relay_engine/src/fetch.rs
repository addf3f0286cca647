use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::BytesMut;
use futures_util::StreamExt;
use relay_logging::{relay_debug, relay_info, relay_warn};
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::persist::remove_quietly;
use crate::TransferObserver;

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    /// Maximum idle time between two reads.
    pub read_timeout: Duration,
    pub total_timeout: Option<Duration>,
    /// Size of each sequential write to disk.
    pub chunk_size: usize,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            total_timeout: Some(Duration::from_secs(3600)),
            chunk_size: 128 * 1024,
            user_agent: concat!("linkrelay/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub path: PathBuf,
    pub bytes: u64,
    pub content_type: Option<String>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transfer cancelled")]
    Cancelled,
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Stream `url` into `dest`. A partial file is never left behind on failure.
    async fn fetch_to_file(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
        observer: &dyn TransferObserver,
    ) -> Result<FetchedFile, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    settings: FetchSettings,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        Self { settings }
    }

    fn build_client(&self) -> Result<reqwest::Client, FetchError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .read_timeout(self.settings.read_timeout)
            .user_agent(self.settings.user_agent.clone());
        if let Some(total) = self.settings.total_timeout {
            builder = builder.timeout(total);
        }
        builder
            .build()
            .map_err(|err| FetchError::Network(err.to_string()))
    }

    async fn stream_body(
        &self,
        response: reqwest::Response,
        dest: &Path,
        cancel: &CancellationToken,
        observer: &dyn TransferObserver,
    ) -> Result<u64, FetchError> {
        let total = response.content_length();
        let chunk_size = self.settings.chunk_size.max(1);
        let mut file = File::create(dest).await?;
        let mut buffer = BytesMut::with_capacity(chunk_size);
        let mut written: u64 = 0;

        observer.on_progress(0, total);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            let chunk = chunk.map_err(map_reqwest_error)?;
            buffer.extend_from_slice(&chunk);
            while buffer.len() >= chunk_size {
                let block = buffer.split_to(chunk_size);
                file.write_all(&block).await?;
                written += block.len() as u64;
                observer.on_progress(written, total);
            }
        }
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        if !buffer.is_empty() {
            file.write_all(&buffer).await?;
            written += buffer.len() as u64;
            observer.on_progress(written, total);
        }
        file.flush().await?;
        Ok(written)
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch_to_file(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
        observer: &dyn TransferObserver,
    ) -> Result<FetchedFile, FetchError> {
        let parsed =
            reqwest::Url::parse(url.trim()).map_err(|err| FetchError::InvalidUrl(err.to_string()))?;
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let client = self.build_client()?;

        relay_debug!("GET {parsed}");
        let response = client.get(parsed).send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        match self.stream_body(response, dest, cancel, observer).await {
            Ok(bytes) => {
                relay_info!("Fetched {bytes} bytes into {}", dest.display());
                Ok(FetchedFile {
                    path: dest.to_path_buf(),
                    bytes,
                    content_type,
                })
            }
            Err(err) => {
                if matches!(err, FetchError::Cancelled) {
                    relay_info!("Transfer cancelled, removing {}", dest.display());
                } else {
                    relay_warn!("Transfer failed ({err}), removing {}", dest.display());
                }
                remove_quietly(dest).await;
                Err(err)
            }
        }
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::Timeout(err.to_string());
    }
    FetchError::Network(err.to_string())
}
