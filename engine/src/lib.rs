//! Session synchronization engine for Quill - state machine and orchestration.
//!
//! # Architecture
//!
//! The engine owns "the currently open project" and keeps local editable
//! state consistent with the backend under overlapping async operations:
//!
//! - [`Session`] - the state store; single source of truth for the project,
//!   its file listing, the active file, and the rendered artifact. Every
//!   mutation flows through one of its operations, and each entity has
//!   exactly one commit path.
//! - `saver` - the debounced mutation scheduler. Rapid edits coalesce into
//!   at most one pending persist per quiescence window, with
//!   cancel-and-supersede semantics.
//! - `render` - the compile/render pipeline:
//!   `Idle -> Ensuring -> Building -> Fetching -> {Rendered | Failed}`.
//! - `lifecycle` - one cancellation token per open-project lifetime, paired
//!   with a monotonic epoch counter.
//!
//! # Staleness
//!
//! Every asynchronous operation captures the epoch (and, for file content,
//! the selection token) current when it started, and re-checks it before
//! committing its result. Opening a different project cancels the previous
//! project's in-flight calls and bumps the epoch, so a superseded response
//! can neither race its result into the new project's state nor surface an
//! error for work nobody asked to finish.
//!
//! The engine owns no threads; all concurrency is outstanding futures on the
//! caller's tokio runtime, and the session lock is never held across an
//! await.

mod config;
mod lifecycle;
mod render;
mod saver;
mod session;

pub use config::{ConfigError, EngineConfig};
pub use session::{Session, SessionError, SessionSnapshot};

// Re-export the vocabulary the engine surface speaks in.
pub use quill_gateway::{self, Backend, GatewayError, HttpBackend};
pub use quill_types::{
    ActiveFile, FileListing, ProjectDir, RelPath, RenderFailureKind, RenderPhase, RenderedArtifact,
};
