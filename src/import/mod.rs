//! Import pipeline: fetch, sanitize, persist.
//!
//! An import either produces a fully-formed entry (snapshot + metadata +
//! empty annotation collection, published with one rename) or leaves the
//! library exactly as it was. The fetch carries an explicit timeout and a
//! bounded redirect budget; the whole pipeline is cancel-safe because
//! nothing is visible to readers before the final rename.

pub mod sanitize;

use std::time::Duration;

use reqwest::{redirect, Client, StatusCode, Url};
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::library::{EntryId, Library, Metadata};

pub use sanitize::SanitizedDocument;

/// Knobs for the remote fetch.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Whole-request timeout, redirects included.
    pub timeout: Duration,

    /// How many 3xx hops to follow before giving up.
    pub max_redirects: usize,

    /// User agent sent with the request. Some publishers refuse the
    /// default library agent, so this is configurable.
    pub user_agent: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_redirects: 10,
            user_agent: format!(
                "Mozilla/5.0 (compatible; snapshelf/{})",
                env!("CARGO_PKG_VERSION")
            ),
        }
    }
}

/// Imports remote documents into a library.
#[derive(Debug, Default)]
pub struct Importer {
    options: FetchOptions,
}

impl Importer {
    /// Create an importer with the given fetch options.
    pub fn new(options: FetchOptions) -> Self {
        Self { options }
    }

    /// Import the document at `url` into `library`.
    ///
    /// Returns the new entry's metadata. All-or-nothing: on any failure
    /// no new entry is visible and the error is typed (`Validation` for a
    /// malformed URL, `FetchFailed` for the remote leg, `Io` for
    /// persistence).
    pub async fn import(&self, library: &Library, url: &str) -> Result<Metadata> {
        let source_url = Url::parse(url).map_err(|e| StoreError::Validation {
            reason: format!("invalid import url '{}': {}", url, e),
        })?;

        let raw = self.fetch(&source_url).await?;
        let document = sanitize::sanitize(&raw, &source_url);

        let id = EntryId::generate();
        let meta = Metadata::new(id, document.title, source_url.as_str());
        library.create_entry(&meta, &document.html).await?;

        info!("Imported {} as entry {}", source_url, id);
        Ok(meta)
    }

    /// Fetch the document body. Redirects (3xx + `Location`) are followed
    /// transitively up to the configured cap; anything but a terminal 200
    /// is a hard failure.
    async fn fetch(&self, url: &Url) -> Result<String> {
        let client = Client::builder()
            .timeout(self.options.timeout)
            .redirect(redirect::Policy::limited(self.options.max_redirects))
            .user_agent(self.options.user_agent.as_str())
            .build()
            .map_err(|e| fetch_failed(url, &e))?;

        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| fetch_failed(url, &e))?;

        debug!("Fetched {} (terminal url {})", url, response.url());

        let status = response.status();
        if status != StatusCode::OK {
            return Err(StoreError::FetchFailed {
                url: url.to_string(),
                reason: format!("unexpected status {}", status),
            });
        }

        response.text().await.map_err(|e| fetch_failed(url, &e))
    }
}

fn fetch_failed(url: &Url, error: &reqwest::Error) -> StoreError {
    StoreError::FetchFailed {
        url: url.to_string(),
        reason: error.to_string(),
    }
}
