use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_FETCH: &str = "NAV-ERR-FETCH";
pub const ERR_PAYLOAD: &str = "NAV-ERR-PAYLOAD";
pub const ERR_TARGET: &str = "NAV-ERR-TARGET";
pub const ERR_STORAGE: &str = "NAV-ERR-STORAGE";
pub const ERR_CONFIG: &str = "NAV-ERR-CONFIG";
pub const ERR_IO: &str = "NAV-ERR-IO";

/// Failure taxonomy for the hydration pipeline.
///
/// None of these reach the page: fetch and payload failures move on to the
/// next source, target failures skip one mount point, storage failures turn
/// the cache off.
#[derive(Debug, Error)]
pub enum NavError {
    #[error("fetch of '{url}' failed: {reason}")]
    FetchFailure { url: String, reason: String },

    #[error("payload from '{source_name}' rejected: {reason}")]
    MalformedPayload { source_name: String, reason: String },

    #[error("render target '#{target}' is missing")]
    RenderTargetMissing { target: String },

    #[error("cache storage failed for '{key}': {reason}")]
    StorageFailure { key: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("i/o error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl NavError {
    pub fn fetch(url: &str, reason: impl Into<String>) -> Self {
        Self::FetchFailure {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub fn payload(source_name: &str, reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            source_name: source_name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn storage(key: &str, reason: impl Into<String>) -> Self {
        Self::StorageFailure {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable error code, suitable for host-side diagnostics.
    pub fn code(&self) -> &'static str {
        match self {
            Self::FetchFailure { .. } => ERR_FETCH,
            Self::MalformedPayload { .. } => ERR_PAYLOAD,
            Self::RenderTargetMissing { .. } => ERR_TARGET,
            Self::StorageFailure { .. } => ERR_STORAGE,
            Self::Config(_) => ERR_CONFIG,
            Self::Io { .. } => ERR_IO,
        }
    }

    pub fn guarantee(&self) -> &'static str {
        get_guarantee(self.code())
    }

    /// Whether the pipeline moves on to the next candidate source.
    pub fn is_source_failure(&self) -> bool {
        matches!(
            self,
            Self::FetchFailure { .. } | Self::MalformedPayload { .. }
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// GUARANTEES
// ═══════════════════════════════════════════════════════════════════════════════

fn get_guarantee(code: &str) -> &'static str {
    match code {
        ERR_FETCH => "The next candidate source is tried, then the cache, then the fallback menu.",
        ERR_PAYLOAD => "A payload that fails the shape check is treated like a failed fetch.",
        ERR_TARGET => "Only the missing mount point is skipped; other targets still render.",
        ERR_STORAGE => "Caching is best-effort; the menu is fetched fresh instead.",
        ERR_CONFIG => "Configuration is validated before any fetch or render happens.",
        ERR_IO => "Snapshot tooling reports the failing path and continues with other files.",
        _ => "Unknown error code.",
    }
}
