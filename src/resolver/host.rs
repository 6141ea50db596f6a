// src/resolver/host.rs

//! Remote package hosts
//!
//! A host publishes the same `contents.toml` index an install tree carries.
//! Resolving a package remotely means finding its entry in that index and
//! downloading the import descriptor next to it.

use crate::contents::{CONTENTS_FILENAME, ContentsDocument};
use crate::descriptor::FileSpec;
use crate::error::{Error, Result};
use crate::version::compare_optional;
use reqwest::blocking::Client;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum attempts per request
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// A package entry found on a remote host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePackageRef {
    pub host: String,
    pub name: String,
    pub platform: Option<String>,
    pub version: Option<String>,
    /// Import descriptor, relative to the host root
    pub import_file: FileSpec,
}

/// Looks up and fetches package metadata from a download host
pub trait HostClient: fmt::Debug {
    /// Find the newest matching package on `host`
    fn get_package(
        &self,
        host: &str,
        name: &str,
        version: Option<&str>,
        platform: Option<&str>,
    ) -> Result<Option<RemotePackageRef>>;

    /// Make `local` a verified copy of the package's import descriptor.
    /// Returns false if the host could not provide it.
    fn freshen_file(&self, package: &RemotePackageRef, local: &Path) -> Result<bool>;
}

/// Join a host-relative path onto a host URL
pub fn host_url(host: &str, path: &str) -> Result<Url> {
    let base = if host.ends_with('/') {
        host.to_string()
    } else {
        format!("{host}/")
    };
    Url::parse(&base)
        .and_then(|u| u.join(path))
        .map_err(|e| Error::DownloadError(format!("invalid host URL {host}: {e}")))
}

/// Blocking HTTP host client with retry support
pub struct HttpHostClient {
    client: Client,
    max_retries: u32,
    contents: RefCell<HashMap<String, ContentsDocument>>,
}

impl fmt::Debug for HttpHostClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpHostClient")
            .field("max_retries", &self.max_retries)
            .field("hosts", &self.contents.borrow().len())
            .finish()
    }
}

impl HttpHostClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::DownloadError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
            contents: RefCell::new(HashMap::new()),
        })
    }

    fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url.clone()).send() {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(Error::DownloadError(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }
                    return response
                        .bytes()
                        .map(|b| b.to_vec())
                        .map_err(|e| Error::DownloadError(format!("Failed to read {url}: {e}")));
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::DownloadError(format!(
                            "Failed to fetch {url} after {attempt} attempts: {e}"
                        )));
                    }
                    warn!("Attempt {} to fetch {} failed: {}, retrying...", attempt, url, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
                }
            }
        }
    }

    /// Fetch (once per run) the contents index of `host`
    fn host_contents(&self, host: &str) -> Result<ContentsDocument> {
        if let Some(doc) = self.contents.borrow().get(host) {
            return Ok(doc.clone());
        }

        let url = host_url(host, CONTENTS_FILENAME)?;
        info!("Fetching package index from {}", url);
        let bytes = self.fetch_bytes(&url)?;
        let text = String::from_utf8(bytes)
            .map_err(|e| Error::DownloadError(format!("{url} is not UTF-8: {e}")))?;
        let doc = ContentsDocument::parse(&text)?;
        self.contents.borrow_mut().insert(host.to_string(), doc.clone());
        Ok(doc)
    }
}

impl HostClient for HttpHostClient {
    fn get_package(
        &self,
        host: &str,
        name: &str,
        version: Option<&str>,
        platform: Option<&str>,
    ) -> Result<Option<RemotePackageRef>> {
        let contents = self.host_contents(host)?;
        let newest = contents
            .find(name, version, platform)
            .filter(|p| !p.solo && p.import_file.is_some())
            .max_by(|a, b| compare_optional(a.version.as_deref(), b.version.as_deref()));

        Ok(newest.and_then(|entry| {
            Some(RemotePackageRef {
                host: host.to_string(),
                name: entry.name.clone(),
                platform: entry.platform.clone(),
                version: entry.version.clone(),
                import_file: entry.import_file.clone()?,
            })
        }))
    }

    fn freshen_file(&self, package: &RemotePackageRef, local: &Path) -> Result<bool> {
        if package.import_file.matches_file(local) {
            debug!("{} is current", local.display());
            return Ok(true);
        }

        let url = host_url(&package.host, &package.import_file.filename)?;
        let data = match self.fetch_bytes(&url) {
            Ok(data) => data,
            Err(e) => {
                warn!("{}", e);
                return Ok(false);
            }
        };

        let actual = crate::hash::sha256(&data);
        if actual != package.import_file.hash {
            return Err(Error::DownloadError(format!(
                "checksum mismatch for {}: expected {}, got {}",
                url, package.import_file.hash, actual
            )));
        }

        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(local, &data)
            .map_err(|e| Error::IoError(format!("cannot write {}: {}", local.display(), e)))?;
        Ok(true)
    }
}
