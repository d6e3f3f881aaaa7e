//! Staleness guards for overlapping asynchronous operations.

/// Monotonic counter identifying one open-project lifetime.
///
/// Every asynchronous operation captures the epoch that was current when it
/// started. A result whose captured epoch no longer matches the live epoch
/// belongs to a superseded project session and must be discarded without
/// touching state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(u64);

impl Epoch {
    /// The epoch that supersedes this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// Secondary token scoping reads and saves to a single file selection.
///
/// Bumped on every file selection, so a response belonging to a superseded
/// selection is discarded even when the project epoch still matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SelectionToken(u64);

impl SelectionToken {
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}
