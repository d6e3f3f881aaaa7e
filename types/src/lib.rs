//! Core domain types for Quill.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

mod artifact;
mod epoch;
mod project;
mod settings;

pub use artifact::{RenderFailureKind, RenderPhase, RenderedArtifact};
pub use epoch::{Epoch, SelectionToken};
pub use project::{
    ActiveFile, DEFAULT_TEMPLATE, ENTRY_POINT_FILE, FileListing, ProjectDir, RelPath, RelPathError,
};
pub use settings::UserConfig;
