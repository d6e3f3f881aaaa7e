//! The compile/render pipeline.
//!
//! `Idle -> Ensuring -> Building -> Fetching -> {Rendered | Failed}`.
//!
//! Ensuring checks the listing for the entry-point file and scaffolds the
//! project when it is absent. A build rejection and a missing artifact fail
//! with distinct reasons: the first is a document error carrying the build
//! tool's diagnostic, the second a backend inconsistency. Neither clears a
//! previously rendered artifact.
//!
//! Every transition is guarded by the epoch captured when the pipeline
//! started; a stale transition is abandoned without touching state or
//! surfacing an error.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use quill_gateway::GatewayError;
use quill_types::{Epoch, ProjectDir, RenderFailureKind, RenderPhase, RenderedArtifact};

use crate::session::Session;

pub(crate) async fn run(
    session: &Session,
    dir: &ProjectDir,
    epoch: Epoch,
    cancel: &CancellationToken,
) {
    if !session.commit_phase(epoch, RenderPhase::Ensuring) {
        return;
    }
    if !ensure_entry_point(session, dir, epoch, cancel).await {
        return;
    }

    if !session.commit_phase(epoch, RenderPhase::Building) {
        return;
    }
    if let Err(err) = session.backend.compile(dir, cancel.clone()).await {
        match err {
            GatewayError::Cancelled => debug!("render superseded during build"),
            GatewayError::Api { detail } => {
                session.commit_render_failure(epoch, RenderFailureKind::Build, detail);
            }
            other => {
                session.commit_render_failure(epoch, RenderFailureKind::Backend, other.to_string());
            }
        }
        return;
    }

    if !session.commit_phase(epoch, RenderPhase::Fetching) {
        return;
    }
    match session.backend.fetch_artifact(dir, cancel.clone()).await {
        Ok(bytes) => session.commit_rendered(epoch, RenderedArtifact::new(bytes)),
        Err(GatewayError::Cancelled) => debug!("render superseded during fetch"),
        Err(GatewayError::NotFound) => {
            // The build reported success but the backend has nothing to
            // serve. Not a document error, so it gets its own reason.
            session.commit_render_failure(
                epoch,
                RenderFailureKind::ArtifactMissing,
                "build succeeded but no artifact was produced".to_owned(),
            );
        }
        Err(other) => {
            session.commit_render_failure(epoch, RenderFailureKind::Backend, other.to_string());
        }
    }
}

/// Scaffold the project and refresh the listing when the entry point is
/// missing. Returns false when the pipeline must stop.
async fn ensure_entry_point(
    session: &Session,
    dir: &ProjectDir,
    epoch: Epoch,
    cancel: &CancellationToken,
) -> bool {
    let has_entry_point = session.lock().files.has_entry_point();
    if has_entry_point {
        return true;
    }

    debug!(project = %dir, "entry point missing; scaffolding");
    let scaffolded = session
        .backend
        .init_project(dir, &session.config.template, cancel.clone())
        .await;
    if let Err(err) = scaffolded {
        return ensure_failed(session, epoch, err);
    }

    match session.backend.list_files(dir, cancel.clone()).await {
        Ok(files) => session.commit_listing(epoch, files),
        Err(err) => ensure_failed(session, epoch, err),
    }
}

fn ensure_failed(session: &Session, epoch: Epoch, err: GatewayError) -> bool {
    match err {
        GatewayError::Cancelled => debug!("render superseded during ensure"),
        other => {
            session.commit_render_failure(epoch, RenderFailureKind::Backend, other.to_string());
        }
    }
    false
}
