//! Typed client for the local document backend.
//!
//! # Architecture
//!
//! The crate is organized around one operation per backend capability:
//!
//! - [`Backend`] - the object-safe trait the engine calls through
//! - [`HttpBackend`] - the reqwest implementation against the sidecar
//!   backend process on `http://127.0.0.1:8765`
//!
//! The backend wraps most payloads in a `{success, data, detail}` envelope;
//! this layer decodes it and surfaces failures as [`GatewayError::Api`] with
//! the backend's human-readable detail string. The artifact fetch returns
//! raw bytes and uses HTTP 404 as a distinguished "not yet rendered"
//! outcome, mapped to [`GatewayError::NotFound`].
//!
//! # Cancellation
//!
//! Every operation takes a [`CancellationToken`]. A cancelled call settles
//! as [`GatewayError::Cancelled`] - never as success and never as a generic
//! failure - so callers can always tell "superseded" apart from "backend
//! said no".
//!
//! This layer performs no retries and holds no state beyond the HTTP
//! connection pool.

mod http;

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use quill_types::{FileListing, ProjectDir, RelPath, UserConfig};

pub use http::HttpBackend;

/// Default address of the sidecar backend process.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8765";

/// Boxed future returned by [`Backend`] operations.
pub type BackendFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, GatewayError>> + Send + 'a>>;

/// Failure modes of a single backend call.
///
/// A sum type rather than a string so callers can structurally distinguish
/// the distinguished outcomes: `NotFound` drives "not yet built" UI,
/// `Cancelled` is silently discarded and never surfaced.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The HTTP call itself failed (connect, timeout, malformed transport).
    #[error("backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered, and the answer was a failure.
    #[error("{detail}")]
    Api { detail: String },

    /// Distinguished missing-resource outcome (HTTP 404).
    #[error("not found")]
    NotFound,

    /// The response body did not match the expected envelope.
    #[error("malformed backend response: {0}")]
    InvalidResponse(String),

    /// The operation's lifecycle token was cancelled before it settled.
    #[error("operation cancelled")]
    Cancelled,
}

impl GatewayError {
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Backend health probe payload.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthInfo {
    pub status: String,
    pub version: String,
}

/// One operation per backend capability.
///
/// Object-safe so the engine can hold `Arc<dyn Backend>` and tests can
/// substitute an in-memory implementation. Arguments are plain, validated
/// types; implementations perform exactly one remote call and no retries.
pub trait Backend: Send + Sync {
    fn health<'a>(&'a self, cancel: CancellationToken) -> BackendFut<'a, HealthInfo>;

    fn list_files<'a>(
        &'a self,
        dir: &'a ProjectDir,
        cancel: CancellationToken,
    ) -> BackendFut<'a, FileListing>;

    fn read_file<'a>(
        &'a self,
        dir: &'a ProjectDir,
        path: &'a RelPath,
        cancel: CancellationToken,
    ) -> BackendFut<'a, String>;

    fn write_file<'a>(
        &'a self,
        dir: &'a ProjectDir,
        path: &'a RelPath,
        content: &'a str,
        cancel: CancellationToken,
    ) -> BackendFut<'a, ()>;

    /// Idempotent: initializing an already-scaffolded directory succeeds.
    fn init_project<'a>(
        &'a self,
        dir: &'a ProjectDir,
        template: &'a str,
        cancel: CancellationToken,
    ) -> BackendFut<'a, ()>;

    /// A build failure surfaces as [`GatewayError::Api`] whose detail is the
    /// build tool's diagnostic output.
    fn compile<'a>(&'a self, dir: &'a ProjectDir, cancel: CancellationToken)
    -> BackendFut<'a, ()>;

    /// [`GatewayError::NotFound`] when the project has never been rendered.
    fn fetch_artifact<'a>(
        &'a self,
        dir: &'a ProjectDir,
        cancel: CancellationToken,
    ) -> BackendFut<'a, Vec<u8>>;

    fn get_config<'a>(&'a self, cancel: CancellationToken) -> BackendFut<'a, UserConfig>;

    /// Sends only the keys present in `updates`; returns the merged config.
    fn update_config<'a>(
        &'a self,
        updates: &'a UserConfig,
        cancel: CancellationToken,
    ) -> BackendFut<'a, UserConfig>;

    fn reset_config<'a>(&'a self, cancel: CancellationToken) -> BackendFut<'a, ()>;

    /// Ask the project assistant a question. Consumed by the chat pane, not
    /// by the session engine.
    fn chat<'a>(
        &'a self,
        dir: &'a ProjectDir,
        query: &'a str,
        cancel: CancellationToken,
    ) -> BackendFut<'a, String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_is_structurally_distinguishable() {
        let err = GatewayError::Cancelled;
        assert!(err.is_cancelled());
        assert!(!err.is_not_found());

        let err = GatewayError::Api {
            detail: "build broke".to_owned(),
        };
        assert!(!err.is_cancelled());
        assert_eq!(err.to_string(), "build broke");
    }

    #[test]
    fn not_found_is_not_a_generic_failure() {
        let err = GatewayError::NotFound;
        assert!(err.is_not_found());
        assert!(!err.is_cancelled());
    }
}
