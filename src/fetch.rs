//! HTTP client seam for the prediction feed.
//!
//! The poller talks to the feed through [`HttpClient`] so cycles can run
//! against a canned response in tests. [`BasicClient`] is the production
//! implementation; the fetch timeout is enforced by the underlying
//! `reqwest::Client`, so a slow feed aborts the request rather than stalling
//! the cycle.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Performs a GET and returns the raw response body.
    async fn get(&self, url: &str) -> Result<Vec<u8>>;
}

#[async_trait]
impl<C: HttpClient + ?Sized> HttpClient for std::sync::Arc<C> {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        (**self).get(url).await
    }
}

pub struct BasicClient(reqwest::Client);

impl BasicClient {
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self(client))
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.0.get(url).send().await?.error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }
}

/// Fetches `url` and deserializes the JSON body.
pub async fn fetch_json<C: HttpClient, T: DeserializeOwned>(client: &C, url: &str) -> Result<T> {
    let body = client.get(url).await?;
    serde_json::from_slice(&body).context("malformed JSON from feed")
}
