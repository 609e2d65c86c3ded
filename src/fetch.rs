//! Snapshot retrieval.
//!
//! Candidates are tried strictly in order; the first response that is 2xx,
//! parses as JSON and passes the payload shape check wins. Every other
//! outcome is logged and skipped, and running out of candidates is `None`,
//! never an error.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use crate::config::{expand_template, FetchConfig};
use crate::error::NavError;
use crate::payload::NavPayload;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
    pub etag: Option<String>,
}

impl TransportResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            etag: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            etag: None,
        }
    }

    pub fn with_etag(mut self, etag: &str) -> Self {
        self.etag = Some(etag.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A `GET` with a per-request timeout. Network errors and timeouts are
/// `Err`; HTTP error statuses are `Ok` with that status.
pub trait Transport {
    fn get(&self, url: &str, timeout_ms: u64) -> Result<TransportResponse, NavError>;
}

/// Serves snapshot URLs from a directory, mapping the URL path onto it.
pub struct FsTransport {
    root: PathBuf,
}

impl FsTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, url: &str) -> Option<PathBuf> {
        let path = url.split(['?', '#']).next().unwrap_or_default();
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }
}

impl Transport for FsTransport {
    fn get(&self, url: &str, _timeout_ms: u64) -> Result<TransportResponse, NavError> {
        let Some(path) = self.resolve(url) else {
            return Ok(TransportResponse::status(404));
        };
        match fs::read_to_string(&path) {
            Ok(body) => Ok(TransportResponse::ok(body)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(TransportResponse::status(404)),
            Err(e) => Err(NavError::fetch(url, e.to_string())),
        }
    }
}

/// In-memory routes, for embedded snapshots and tests.
#[derive(Default)]
pub struct StaticTransport {
    routes: HashMap<String, Result<TransportResponse, String>>,
    requests: Mutex<Vec<String>>,
}

impl StaticTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, url: &str, response: TransportResponse) -> Self {
        self.routes.insert(url.to_string(), Ok(response));
        self
    }

    pub fn with_body(self, url: &str, body: &str) -> Self {
        self.with_response(url, TransportResponse::ok(body))
    }

    pub fn with_failure(mut self, url: &str, reason: &str) -> Self {
        self.routes.insert(url.to_string(), Err(reason.to_string()));
        self
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Transport for StaticTransport {
    fn get(&self, url: &str, _timeout_ms: u64) -> Result<TransportResponse, NavError> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(url.to_string());
        }
        match self.routes.get(url) {
            Some(Ok(response)) => Ok(response.clone()),
            Some(Err(reason)) => Err(NavError::fetch(url, reason.clone())),
            None => Ok(TransportResponse::status(404)),
        }
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn get(&self, url: &str, timeout_ms: u64) -> Result<TransportResponse, NavError> {
        (**self).get(url, timeout_ms)
    }
}

/// Blocking HTTP transport. Relative candidate URLs are resolved against
/// `base_url`.
#[cfg(feature = "http")]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base_url: Option<String>,
}

#[cfg(feature = "http")]
impl HttpTransport {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url,
        }
    }

    fn absolute(&self, url: &str) -> String {
        match (&self.base_url, url.starts_with('/') && !url.starts_with("//")) {
            (Some(base), true) => format!("{}{}", base.trim_end_matches('/'), url),
            _ => url.to_string(),
        }
    }
}

#[cfg(feature = "http")]
impl Transport for HttpTransport {
    fn get(&self, url: &str, timeout_ms: u64) -> Result<TransportResponse, NavError> {
        let target = self.absolute(url);
        let response = self
            .client
            .get(&target)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .map_err(|e| NavError::fetch(&target, e.to_string()))?;
        let status = response.status().as_u16();
        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string());
        let body = response
            .text()
            .map_err(|e| NavError::fetch(&target, e.to_string()))?;
        Ok(TransportResponse { status, body, etag })
    }
}

/// A payload together with the URL it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSnapshot {
    pub url: String,
    pub payload: NavPayload,
}

pub struct SnapshotFetcher {
    transport: Box<dyn Transport>,
    config: FetchConfig,
}

impl SnapshotFetcher {
    pub fn new(transport: Box<dyn Transport>, config: FetchConfig) -> Self {
        Self { transport, config }
    }

    pub fn candidate_urls(&self, lang: &str) -> Vec<String> {
        self.config
            .candidates
            .iter()
            .map(|t| expand_template(t, lang))
            .collect()
    }

    pub fn fetch(&self, lang: &str) -> Option<FetchedSnapshot> {
        for url in self.candidate_urls(lang) {
            match self.try_candidate(&url) {
                Ok(payload) => {
                    tracing::debug!(url = url.as_str(), lang, "navigation snapshot loaded");
                    return Some(FetchedSnapshot { url, payload });
                }
                Err(e) => {
                    tracing::debug!(code = e.code(), "candidate skipped: {}", e);
                }
            }
        }
        tracing::warn!(lang, "no navigation snapshot available");
        None
    }

    fn try_candidate(&self, url: &str) -> Result<NavPayload, NavError> {
        let response = self.transport.get(url, self.config.timeout_ms)?;
        if !response.is_success() {
            return Err(NavError::fetch(url, format!("HTTP {}", response.status)));
        }
        let mut payload = NavPayload::from_json_str(&response.body, url)?;
        payload.set_version_if_missing(response.etag);
        Ok(payload)
    }
}
