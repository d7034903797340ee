//! Remote list and rule downloads.
//!
//! Downloads go through the local proxy when a port is given, so that lists
//! blocked on the direct path can still be fetched. Conditional requests use
//! `If-Modified-Since` built from the local file's timestamp; a `304` answer
//! yields an empty body, meaning "keep the local copy".

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::{Error, Result};

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Body and `Last-Modified` header of a fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fetched {
    /// Empty when the server answered `304 Not Modified`
    pub body: Vec<u8>,
    pub last_modified: Option<String>,
}

impl Fetched {
    pub fn not_modified(&self) -> bool {
        self.body.is_empty()
    }
}

/// Source of remote content.
pub trait ContentFetcher: Send + Sync {
    /// Fetch `url`, optionally through the local proxy on `proxy_port`.
    ///
    /// `binary` bodies that arrive gzip-compressed are decompressed.
    fn fetch(
        &self,
        url: &str,
        proxy_port: Option<u16>,
        if_modified_since: Option<SystemTime>,
        binary: bool,
    ) -> Result<Fetched>;
}

/// [`ContentFetcher`] backed by `ureq`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: Duration,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn agent(&self, proxy_port: Option<u16>) -> Result<ureq::Agent> {
        let mut builder = ureq::AgentBuilder::new().timeout(self.timeout);
        if let Some(port) = proxy_port {
            let proxy = ureq::Proxy::new(format!("http://127.0.0.1:{}", port))
                .map_err(|e| Error::Fetch(format!("invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }
        Ok(builder.build())
    }
}

impl ContentFetcher for HttpFetcher {
    fn fetch(
        &self,
        url: &str,
        proxy_port: Option<u16>,
        if_modified_since: Option<SystemTime>,
        binary: bool,
    ) -> Result<Fetched> {
        let mut request = self.agent(proxy_port)?.get(url);
        if let Some(since) = if_modified_since {
            request = request.set("If-Modified-Since", &http_date(since));
        }

        let response = request.call().map_err(|e| match e {
            ureq::Error::Status(code, _) => Error::Fetch(format!("HTTP error {} for {}", code, url)),
            ureq::Error::Transport(t) => Error::Fetch(format!("transport error for {}: {}", url, t)),
        })?;

        let last_modified = response.header("Last-Modified").map(str::to_string);
        if response.status() == 304 {
            log::debug!("{} not modified", url);
            return Ok(Fetched {
                body: Vec::new(),
                last_modified,
            });
        }

        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| Error::Fetch(format!("failed to read response: {}", e)))?;

        if binary && is_gzip(&body) {
            body = gunzip(&body)?;
        }
        log::info!("Fetched {} ({} bytes)", url, body.len());

        Ok(Fetched {
            body,
            last_modified,
        })
    }
}

/// Format a timestamp as an HTTP date.
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Modification time of a local file, if it exists.
pub fn local_mtime(path: impl AsRef<Path>) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::Decode(format!("gzip decompression failed: {}", e)))?;
    Ok(out)
}

/// Replace `path` with `data` through a temporary file in the same directory.
pub fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::time::UNIX_EPOCH;

    #[test]
    fn test_http_date() {
        let time = UNIX_EPOCH + Duration::from_secs(1_445_412_480);
        assert_eq!(http_date(time), "Wed, 21 Oct 2015 07:28:00 GMT");
    }

    #[test]
    fn test_gunzip() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"1.0.1.0/24\n").unwrap();
        let compressed = encoder.finish().unwrap();

        assert!(is_gzip(&compressed));
        assert!(!is_gzip(b"1.0.1.0/24"));
        assert_eq!(gunzip(&compressed).unwrap(), b"1.0.1.0/24\n");
        assert!(gunzip(&[0x1f, 0x8b, 0x00]).is_err());
    }

    #[test]
    fn test_write_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud_spac.json");
        write_atomic(&path, b"[]").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"[]");
        write_atomic(&path, b"[{}]").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"[{}]");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_local_mtime() {
        let dir = tempfile::tempdir().unwrap();
        assert!(local_mtime(dir.path().join("missing")).is_none());
        let path = dir.path().join("present");
        fs::write(&path, "x").unwrap();
        assert!(local_mtime(&path).is_some());
    }
}
