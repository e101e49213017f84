//! Network adapter: fetches encoded images over HTTP(S) and decodes them
//! as in-memory buffers.

use std::path::PathBuf;
use std::time::Duration;

use printcheck_core::domain::{Provenance, RawImage};
use printcheck_core::error::LoadError;
use printcheck_core::ImageSource;
use tracing::debug;

use crate::fs::{load_from_bytes, UniqueTitles};

/// Whether an input argument names a remote image.
#[must_use]
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Title for a downloaded image: the last path segment without query or
/// extension, or the host when the path is empty.
#[must_use]
pub fn title_from_url(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or(without_scheme)
        .trim_end_matches('/');
    let last = path.rsplit('/').next().unwrap_or(path);
    match last.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() && path.contains('/') => stem.to_string(),
        _ => last.to_string(),
    }
}

/// Blocking HTTP fetcher.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// Builds a client with connect and overall timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()?;
        Ok(Self { client })
    }

    /// Downloads the body of `url`. No retries.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Fetch`] on transport errors and non-success
    /// statuses.
    pub fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        let fetch_err = |reason: String| LoadError::Fetch {
            url: url.to_string(),
            reason,
        };
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| fetch_err(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fetch_err(format!("HTTP {status}")));
        }
        let bytes = response.bytes().map_err(|e| fetch_err(e.to_string()))?;
        debug!(url, bytes = bytes.len(), "fetched");
        Ok(bytes.to_vec())
    }

    /// Downloads and decodes `url`.
    ///
    /// # Errors
    ///
    /// See [`Self::fetch_bytes`] and [`load_from_bytes`].
    pub fn load(&self, url: &str, debug_dir: Option<&std::path::Path>) -> Result<RawImage, LoadError> {
        self.load_titled(url, &title_from_url(url), debug_dir)
    }

    fn load_titled(
        &self,
        url: &str,
        title: &str,
        debug_dir: Option<&std::path::Path>,
    ) -> Result<RawImage, LoadError> {
        let bytes = self.fetch_bytes(url)?;
        let mut raw =
            load_from_bytes(&bytes, title, debug_dir).map_err(|e| match e {
                LoadError::Decode { reason, .. } => LoadError::Decode {
                    source_name: url.to_string(),
                    reason,
                },
                other => other,
            })?;
        raw.provenance = Provenance::Url(url.to_string());
        Ok(raw)
    }
}

/// Image source over a list of URLs.
pub struct UrlImageSource {
    urls: Vec<String>,
    fetcher: HttpFetcher,
    debug_dir: Option<PathBuf>,
    titles: UniqueTitles,
}

impl UrlImageSource {
    /// Creates a source fetching each URL once, in order.
    #[must_use]
    pub fn new(urls: Vec<String>, fetcher: HttpFetcher) -> Self {
        Self {
            urls,
            fetcher,
            debug_dir: None,
            titles: UniqueTitles::new(),
        }
    }

    /// Creates a scratch directory per image under `dir`.
    #[must_use]
    pub fn with_debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_dir = Some(dir.into());
        self
    }

    /// Draws titles from a claim set shared with other sources.
    #[must_use]
    pub fn with_titles(mut self, titles: UniqueTitles) -> Self {
        self.titles = titles;
        self
    }
}

impl ImageSource for UrlImageSource {
    fn images(&self) -> Box<dyn Iterator<Item = Result<RawImage, LoadError>> + Send + '_> {
        let debug_dir = self.debug_dir.as_deref();
        Box::new(
            self.urls
                .iter()
                .map(move |url| {
                    let title = self.titles.claim(&title_from_url(url));
                    self.fetcher.load_titled(url, &title, debug_dir)
                }),
        )
    }

    fn count_hint(&self) -> Option<usize> {
        Some(self.urls.len())
    }
}
