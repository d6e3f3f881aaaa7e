//! The session state store - single source of truth for the open project.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, warn};

use quill_gateway::{Backend, GatewayError};
use quill_types::{
    ActiveFile, Epoch, FileListing, ProjectDir, RelPath, RenderFailureKind, RenderPhase,
    RenderedArtifact, SelectionToken,
};

use crate::config::EngineConfig;
use crate::lifecycle::Lifecycle;
use crate::{render, saver};

/// Validation failures, reported synchronously to the caller.
///
/// These never reach the network. Contrast with backend failures, which are
/// recorded as the session's failure detail for display, and cancellations,
/// which are dropped silently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no project is open")]
    NoProject,
    #[error("no file is open for editing")]
    NoActiveFile,
    #[error("file not found in project: {path}")]
    FileNotFound { path: String },
}

/// Read-only view of the session, suitable for polling or reactive display.
///
/// The artifact clone shares its bytes, so taking a snapshot per frame is
/// cheap.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub project: Option<ProjectDir>,
    pub files: FileListing,
    pub active_path: Option<RelPath>,
    pub edited_content: Option<String>,
    pub dirty: bool,
    pub phase: RenderPhase,
    pub artifact: Option<RenderedArtifact>,
    pub failure: Option<String>,
}

pub(crate) struct SessionState {
    pub(crate) lifecycle: Lifecycle,
    pub(crate) project: Option<ProjectDir>,
    pub(crate) files: FileListing,
    pub(crate) active: Option<ActiveFile>,
    pub(crate) selection: SelectionToken,
    pub(crate) artifact: Option<RenderedArtifact>,
    pub(crate) phase: RenderPhase,
    pub(crate) failure: Option<String>,
    /// Bumped on every edit, flush, and file or project switch. A debounce
    /// timer whose captured generation is stale was superseded and must die
    /// without a network call.
    pub(crate) save_generation: u64,
}

impl SessionState {
    fn new() -> Self {
        Self {
            lifecycle: Lifecycle::default(),
            project: None,
            files: FileListing::default(),
            active: None,
            selection: SelectionToken::default(),
            artifact: None,
            phase: RenderPhase::Idle,
            failure: None,
            save_generation: 0,
        }
    }
}

/// Cloneable handle to the open session.
///
/// All mutations flow through the operations below. Each entity has exactly
/// one commit function, and every commit re-checks the epoch (and, for file
/// content and saves, the selection token) captured when the operation
/// started, discarding stale results silently.
///
/// Must live on a tokio runtime: edits arm debounce timers via spawned
/// tasks.
#[derive(Clone)]
pub struct Session {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) config: Arc<EngineConfig>,
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, config: EngineConfig) -> Self {
        Self {
            backend,
            config: Arc::new(config),
            state: Arc::new(Mutex::new(SessionState::new())),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the project at `dir`, superseding any previous project.
    ///
    /// The previous project's listing, active file, and artifact are cleared
    /// before the first await, so no stale frame is ever observable for the
    /// new path; in-flight calls belonging to the old project are cancelled
    /// at the same moment. The listing and initial render then run against
    /// the fresh epoch.
    pub async fn open_project(&self, dir: ProjectDir) {
        let (epoch, cancel) = {
            let mut state = self.lock();
            let (epoch, cancel) = state.lifecycle.supersede();
            state.project = Some(dir.clone());
            state.files = FileListing::default();
            state.active = None;
            state.artifact = None;
            state.phase = RenderPhase::Idle;
            state.failure = None;
            state.save_generation = state.save_generation.wrapping_add(1);
            (epoch, cancel)
        };
        debug!(project = %dir, epoch = epoch.value(), "opening project");

        let listing = match self.backend.list_files(&dir, cancel.clone()).await {
            Ok(listing) => listing,
            Err(err) => {
                self.record_gateway_failure::<()>(epoch, "list files", err);
                return;
            }
        };
        if !self.commit_listing(epoch, listing) {
            return;
        }

        // Scaffolding (when the entry point is missing) and the initial
        // build both belong to the render pipeline's Ensuring step.
        render::run(self, &dir, epoch, &cancel).await;
    }

    /// Open `path` for editing.
    ///
    /// Validated synchronously against the current listing: an unlisted path
    /// fails with [`SessionError::FileNotFound`] before any network call.
    /// The content read is scoped by the epoch and a fresh selection token,
    /// so a newer selection supersedes this one even mid-flight. Any pending
    /// debounced save dies outright rather than flushing across the switch.
    pub async fn select_file(&self, path: &str) -> Result<(), SessionError> {
        let (dir, rel, epoch, cancel, selection) = {
            let mut state = self.lock();
            let dir = state.project.clone().ok_or(SessionError::NoProject)?;
            if !state.files.contains(path) {
                return Err(SessionError::FileNotFound {
                    path: path.to_owned(),
                });
            }
            let rel = RelPath::new(path).map_err(|_| SessionError::FileNotFound {
                path: path.to_owned(),
            })?;
            state.selection = state.selection.next();
            let selection = state.selection;
            state.active = Some(ActiveFile::pending(rel.clone(), selection));
            state.save_generation = state.save_generation.wrapping_add(1);
            (
                dir,
                rel,
                state.lifecycle.epoch(),
                state.lifecycle.token(),
                selection,
            )
        };
        debug!(file = %rel, "selecting file");

        match self.backend.read_file(&dir, &rel, cancel).await {
            Ok(content) => self.commit_loaded_content(epoch, selection, content),
            Err(err) => {
                self.record_gateway_failure::<()>(epoch, "read file", err);
            }
        }
        Ok(())
    }

    /// Replace the edited content of the active file and (re)arm the
    /// debounced persist.
    ///
    /// Synchronous and infallible while a file is active; the saved content
    /// is untouched until a persist round-trips.
    pub fn edit_active_file(&self, content: impl Into<String>) -> Result<(), SessionError> {
        {
            let mut state = self.lock();
            let active = state.active.as_mut().ok_or(SessionError::NoActiveFile)?;
            active.edit(content.into());
        }
        saver::schedule(self);
        Ok(())
    }

    /// Persist the edited content immediately iff it differs from the saved
    /// content.
    ///
    /// Cancels any pending debounce timer either way; a clean flush performs
    /// zero network calls.
    pub async fn flush_save(&self) {
        let Some(job) = saver::take_immediate(self) else {
            return;
        };
        saver::persist(self, job).await;
    }

    /// Run the render pipeline for the open project.
    ///
    /// On success the artifact is replaced wholesale; on failure the
    /// previous artifact is kept and only the failure detail changes. Either
    /// way the session survives.
    pub async fn request_render(&self) -> Result<(), SessionError> {
        let (dir, epoch, cancel) = {
            let state = self.lock();
            let dir = state.project.clone().ok_or(SessionError::NoProject)?;
            (dir, state.lifecycle.epoch(), state.lifecycle.token())
        };
        render::run(self, &dir, epoch, &cancel).await;
        Ok(())
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock();
        SessionSnapshot {
            project: state.project.clone(),
            files: state.files.clone(),
            active_path: state.active.as_ref().map(|a| a.path().clone()),
            edited_content: state.active.as_ref().map(|a| a.edited().to_owned()),
            dirty: state.active.as_ref().is_some_and(ActiveFile::is_dirty),
            phase: state.phase,
            artifact: state.artifact.clone(),
            failure: state.failure.clone(),
        }
    }

    // One commit path per entity. Every commit checks the captured epoch
    // against the live one and discards stale results without touching
    // state.

    pub(crate) fn commit_listing(&self, epoch: Epoch, files: FileListing) -> bool {
        let mut state = self.lock();
        if !state.lifecycle.is_current(epoch) {
            debug!("discarding listing from superseded project");
            return false;
        }
        state.files = files;
        true
    }

    pub(crate) fn commit_loaded_content(
        &self,
        epoch: Epoch,
        selection: SelectionToken,
        content: String,
    ) {
        let mut state = self.lock();
        if !state.lifecycle.is_current(epoch) {
            debug!("discarding file content from superseded project");
            return;
        }
        let Some(active) = state.active.as_mut() else {
            return;
        };
        if active.selection() != selection {
            debug!("discarding file content from superseded selection");
            return;
        }
        active.load(content);
    }

    /// Record that `content` round-tripped to the backend. Returns true when
    /// the latest edited content has already drifted past the persisted
    /// snapshot and the scheduler must re-arm.
    pub(crate) fn commit_saved(
        &self,
        epoch: Epoch,
        selection: SelectionToken,
        content: &str,
    ) -> bool {
        let mut state = self.lock();
        if !state.lifecycle.is_current(epoch) {
            debug!("discarding save result from superseded project");
            return false;
        }
        let Some(active) = state.active.as_mut() else {
            return false;
        };
        if active.selection() != selection {
            debug!("discarding save result from superseded selection");
            return false;
        }
        active.mark_saved(content);
        active.is_dirty()
    }

    pub(crate) fn commit_phase(&self, epoch: Epoch, phase: RenderPhase) -> bool {
        let mut state = self.lock();
        if !state.lifecycle.is_current(epoch) {
            debug!(?phase, "abandoning render transition from superseded project");
            return false;
        }
        state.phase = phase;
        true
    }

    /// Commit a successful render: the artifact is replaced wholesale and
    /// the failure detail cleared.
    pub(crate) fn commit_rendered(&self, epoch: Epoch, artifact: RenderedArtifact) {
        let mut state = self.lock();
        if !state.lifecycle.is_current(epoch) {
            debug!("discarding rendered artifact from superseded project");
            return;
        }
        state.artifact = Some(artifact);
        state.phase = RenderPhase::Rendered;
        state.failure = None;
    }

    /// Commit a render failure: the phase and detail change, the previous
    /// artifact stays visible.
    pub(crate) fn commit_render_failure(
        &self,
        epoch: Epoch,
        kind: RenderFailureKind,
        detail: String,
    ) {
        let mut state = self.lock();
        if !state.lifecycle.is_current(epoch) {
            debug!("discarding render failure from superseded project");
            return;
        }
        warn!(%kind, %detail, "render failed");
        state.phase = RenderPhase::Failed(kind);
        state.failure = Some(detail);
    }

    pub(crate) fn commit_failure(&self, epoch: Epoch, detail: String) {
        let mut state = self.lock();
        if !state.lifecycle.is_current(epoch) {
            debug!("discarding failure from superseded project");
            return;
        }
        state.failure = Some(detail);
    }

    /// Route a gateway error: cancellations are dropped silently, real
    /// failures become the session's failure detail. Always yields `None`
    /// so callers can tail-call it when a pipeline step dies.
    pub(crate) fn record_gateway_failure<T>(
        &self,
        epoch: Epoch,
        operation: &str,
        err: GatewayError,
    ) -> Option<T> {
        if err.is_cancelled() {
            debug!(operation, "dropping cancelled call");
            return None;
        }
        warn!(operation, error = %err, "backend call failed");
        self.commit_failure(epoch, format!("{operation}: {err}"));
        None
    }
}
