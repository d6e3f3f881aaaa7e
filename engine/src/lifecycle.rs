//! Request lifecycle: one cancellation signal per open-project lifetime.

use tokio_util::sync::CancellationToken;

use quill_types::Epoch;

/// Owns the epoch counter and the cancellation token for the open project.
///
/// Superseding cancels every in-flight gateway call that belongs to the
/// previous project and hands out a fresh token. Cancellation stops most
/// stale work early; the epoch check at commit time catches anything that
/// still slips through, such as a response arriving in the same tick the
/// cancellation is processed.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    epoch: Epoch,
    cancel: CancellationToken,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            epoch: Epoch::default(),
            cancel: CancellationToken::new(),
        }
    }
}

impl Lifecycle {
    pub(crate) fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Token scoping in-flight calls to the current project.
    pub(crate) fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn is_current(&self, captured: Epoch) -> bool {
        self.epoch == captured
    }

    /// Retire the current project lifetime and start the next one.
    pub(crate) fn supersede(&mut self) -> (Epoch, CancellationToken) {
        self.cancel.cancel();
        self.epoch = self.epoch.next();
        self.cancel = CancellationToken::new();
        (self.epoch, self.cancel.clone())
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supersede_cancels_previous_token() {
        let mut lifecycle = Lifecycle::default();
        let old_epoch = lifecycle.epoch();
        let old_token = lifecycle.token();

        let (new_epoch, new_token) = lifecycle.supersede();

        assert!(old_token.is_cancelled());
        assert!(!new_token.is_cancelled());
        assert!(!lifecycle.is_current(old_epoch));
        assert!(lifecycle.is_current(new_epoch));
    }

    #[test]
    fn drop_cancels_outstanding_token() {
        let lifecycle = Lifecycle::default();
        let token = lifecycle.token();
        drop(lifecycle);
        assert!(token.is_cancelled());
    }
}
