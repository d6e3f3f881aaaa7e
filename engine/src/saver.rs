//! Debounced persistence of local edits.
//!
//! Cancel-and-supersede: every edit bumps the save generation and arms a
//! fresh timer; an older timer notices the stale generation when it fires
//! and dies without a network call. A timer that survives the quiescence
//! window persists the content snapshot taken at fire time, then compares
//! the round-tripped content with whatever is edited now and re-arms when
//! they differ, so the newest content eventually persists.
//!
//! Switching file or project kills a pending timer outright instead of
//! flushing it: a save must never land on the wrong target. Persistence
//! failures keep the local edits intact and retry only on the next
//! qualifying edit or an explicit flush.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use quill_types::{Epoch, ProjectDir, RelPath, SelectionToken};

use crate::session::Session;

/// A persist ready to go: target, fire-time content snapshot, and the
/// staleness guards captured when it was armed.
pub(crate) struct SaveJob {
    dir: ProjectDir,
    path: RelPath,
    content: String,
    epoch: Epoch,
    selection: SelectionToken,
    cancel: CancellationToken,
}

/// Arm (or re-arm) the debounce timer for the active file, superseding any
/// previously armed timer.
pub(crate) fn schedule(session: &Session) {
    let (epoch, cancel, selection, generation, delay) = {
        let mut state = session.lock();
        let Some(active) = state.active.as_ref() else {
            return;
        };
        let selection = active.selection();
        state.save_generation = state.save_generation.wrapping_add(1);
        (
            state.lifecycle.epoch(),
            state.lifecycle.token(),
            selection,
            state.save_generation,
            session.config.debounce(),
        )
    };

    let session = session.clone();
    tokio::spawn(async move {
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
        let Some(job) = snapshot_if_current(&session, epoch, selection, generation) else {
            return;
        };
        persist(&session, job).await;
    });
}

/// Flush variant: kills any armed timer and snapshots the latest content
/// without waiting out the quiescence window. `None` when nothing is dirty.
pub(crate) fn take_immediate(session: &Session) -> Option<SaveJob> {
    let mut state = session.lock();
    state.save_generation = state.save_generation.wrapping_add(1);
    let active = state.active.as_ref()?;
    if !active.is_dirty() {
        return None;
    }
    Some(SaveJob {
        dir: state.project.clone()?,
        path: active.path().clone(),
        content: active.edited().to_owned(),
        epoch: state.lifecycle.epoch(),
        selection: active.selection(),
        cancel: state.lifecycle.token(),
    })
}

/// Fire-time snapshot: the job carries what is edited *now*, not what was
/// edited when the timer was armed, in case edits raced in meanwhile.
fn snapshot_if_current(
    session: &Session,
    epoch: Epoch,
    selection: SelectionToken,
    generation: u64,
) -> Option<SaveJob> {
    let state = session.lock();
    if !state.lifecycle.is_current(epoch) || state.save_generation != generation {
        return None;
    }
    let active = state.active.as_ref()?;
    if active.selection() != selection || !active.is_dirty() {
        return None;
    }
    Some(SaveJob {
        dir: state.project.clone()?,
        path: active.path().clone(),
        content: active.edited().to_owned(),
        epoch,
        selection,
        cancel: state.lifecycle.token(),
    })
}

pub(crate) async fn persist(session: &Session, job: SaveJob) {
    debug!(path = %job.path, bytes = job.content.len(), "persisting edits");
    let written = session
        .backend
        .write_file(&job.dir, &job.path, &job.content, job.cancel.clone())
        .await;
    match written {
        Ok(()) => {
            let drifted = session.commit_saved(job.epoch, job.selection, &job.content);
            if drifted {
                debug!(path = %job.path, "edits raced the persist round-trip; re-arming");
                schedule(session);
            }
        }
        Err(err) => {
            // The user's keystrokes stay intact locally; the next qualifying
            // edit or an explicit flush retries.
            session.record_gateway_failure::<()>(job.epoch, "save file", err);
        }
    }
}
