//! Remote archive download.
//!
//! Plain http(s) URLs are fetched as-is. Share links of the hosted-drive
//! dialect (`drive.google.com`, `docs.google.com`) are rewritten to the
//! public direct-download form before fetching.

use async_trait::async_trait;
use futures_util::StreamExt;
use regex::Regex;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::{Host, Url};

use showcase_models::SourceKind;

use crate::error::DownloadError;
use crate::fs_utils::remove_file_if_exists;

const SHARE_LINK_HOSTS: &[&str] = &["drive.google.com", "docs.google.com"];
const DIRECT_DOWNLOAD_BASE: &str = "https://drive.google.com/uc?export=download&id=";

/// Local file header / empty-archive signatures.
const ZIP_MAGIC: &[&[u8]] = &[b"PK\x03\x04", b"PK\x05\x06"];

/// HTTP download settings.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Whole-request timeout, body included
    pub timeout_secs: u64,
    /// Largest archive accepted
    pub max_bytes: u64,
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            max_bytes: 2 * 1024 * 1024 * 1024,
            user_agent: concat!("showcase-worker/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl DownloadConfig {
    /// Create from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout_secs: std::env::var("SHOWCASE_DOWNLOAD_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            max_bytes: std::env::var("SHOWCASE_MAX_ARCHIVE_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_bytes),
            user_agent: std::env::var("SHOWCASE_USER_AGENT").unwrap_or(defaults.user_agent),
        }
    }
}

/// Fetches a remote archive to a local path.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    /// Download `url` into `dest`; returns the number of bytes written.
    async fn fetch(&self, url: &str, kind: SourceKind, dest: &Path) -> Result<u64, DownloadError>;
}

/// reqwest-backed [`ArchiveFetcher`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    config: DownloadConfig,
}

impl HttpFetcher {
    pub fn new(config: DownloadConfig) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(30)))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| DownloadError::Connection(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn map_reqwest_error(&self, e: reqwest::Error) -> DownloadError {
        if e.is_timeout() {
            DownloadError::Timeout(self.config.timeout_secs)
        } else if e.is_builder() {
            DownloadError::invalid_url(e.to_string())
        } else {
            DownloadError::Connection(e.to_string())
        }
    }

    async fn stream_to_file(
        &self,
        response: reqwest::Response,
        tmp: &Path,
    ) -> Result<u64, DownloadError> {
        let limit = self.config.max_bytes;
        let mut file = tokio::fs::File::create(tmp).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        let mut head: Vec<u8> = Vec::with_capacity(4);

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.map_reqwest_error(e))?;
            written += chunk.len() as u64;
            if written > limit {
                return Err(DownloadError::TooLarge { limit });
            }
            if head.len() < 4 {
                let take = (4 - head.len()).min(chunk.len());
                head.extend_from_slice(&chunk[..take]);
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        if !ZIP_MAGIC.iter().any(|magic| head.starts_with(magic)) {
            return Err(DownloadError::NotAnArchive);
        }
        Ok(written)
    }
}

#[async_trait]
impl ArchiveFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, kind: SourceKind, dest: &Path) -> Result<u64, DownloadError> {
        let target = match kind {
            SourceKind::ShareLink => direct_download_url(url)?,
            _ => Url::parse(url)
                .map_err(|e| DownloadError::invalid_url(e.to_string()))?
                .to_string(),
        };
        debug!(url = %target, "Downloading archive");

        let response = self
            .client
            .get(&target)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status();
        match status.as_u16() {
            404 => return Err(DownloadError::NotFound),
            403 => return Err(DownloadError::Forbidden),
            _ if !status.is_success() => return Err(DownloadError::Http(status.as_u16())),
            _ => {}
        }

        if let Some(len) = response.content_length() {
            if len > self.config.max_bytes {
                return Err(DownloadError::TooLarge {
                    limit: self.config.max_bytes,
                });
            }
        }

        let tmp = dest.with_extension("part");
        let result = self.stream_to_file(response, &tmp).await;
        match result {
            Ok(bytes) => {
                tokio::fs::rename(&tmp, dest).await?;
                info!(bytes, dest = %dest.display(), "Archive downloaded");
                Ok(bytes)
            }
            Err(e) => {
                if let Err(rm) = remove_file_if_exists(&tmp).await {
                    warn!("Failed to remove partial download {}: {}", tmp.display(), rm);
                }
                Err(e)
            }
        }
    }
}

fn share_id_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"/file/d/([A-Za-z0-9_-]+)",
            r"/document/d/([A-Za-z0-9_-]+)",
            r"/spreadsheets/d/([A-Za-z0-9_-]+)",
            r"/presentation/d/([A-Za-z0-9_-]+)",
            r"[?&]id=([A-Za-z0-9_-]+)",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Whether a URL belongs to the share-link dialect.
pub fn is_share_link(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .map(|host| SHARE_LINK_HOSTS.contains(&host.as_str()))
        .unwrap_or(false)
}

/// Extract the file id embedded in a share link.
pub fn extract_share_file_id(url: &str) -> Option<String> {
    share_id_patterns()
        .iter()
        .find_map(|re| re.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Rewrite a share link to its direct-download form.
pub fn direct_download_url(url: &str) -> Result<String, DownloadError> {
    if !is_share_link(url) {
        return Err(DownloadError::invalid_url(format!(
            "not a share link: {}",
            url
        )));
    }
    let id = extract_share_file_id(url)
        .ok_or_else(|| DownloadError::invalid_url("share link without a file id"))?;
    Ok(format!("{}{}", DIRECT_DOWNLOAD_BASE, id))
}

/// Validate a user-submitted URL: http(s) only, no local or private hosts.
///
/// Only literal addresses are checked; names are not resolved.
pub fn validate_remote_url(raw: &str) -> Result<Url, DownloadError> {
    let url = Url::parse(raw.trim()).map_err(|e| DownloadError::invalid_url(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(DownloadError::invalid_url(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }
    match url.host() {
        None => Err(DownloadError::invalid_url("URL has no host")),
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") {
                Err(DownloadError::invalid_url("local addresses are not allowed"))
            } else {
                Ok(url)
            }
        }
        Some(Host::Ipv4(ip)) if is_internal_ip(IpAddr::V4(ip)) => {
            Err(DownloadError::invalid_url("private addresses are not allowed"))
        }
        Some(Host::Ipv6(ip)) if is_internal_ip(IpAddr::V6(ip)) => {
            Err(DownloadError::invalid_url("private addresses are not allowed"))
        }
        Some(_) => Ok(url),
    }
}

fn is_internal_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_internal_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_internal_v4(v4);
            }
            is_internal_v6(v6)
        }
    }
}

fn is_internal_v4(ip: Ipv4Addr) -> bool {
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 100.64.0.0/10 carrier-grade NAT
        || (ip.octets()[0] == 100 && (ip.octets()[1] & 0xc0) == 64)
}

fn is_internal_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00 // unique local
        || (first & 0xffc0) == 0xfe80 // link local
}

/// Original filename implied by the URL path, when it names a `.zip`.
pub fn filename_from_url(url: &Url) -> Option<String> {
    let last = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    last.to_ascii_lowercase()
        .ends_with(".zip")
        .then(|| last.to_string())
}
