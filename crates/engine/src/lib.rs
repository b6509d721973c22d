//! Per-cell session engine.
//!
//! Each mounted cell gets a [`CellController`] that follows the shared
//! `cells` topic, keeps its focus / insert-mode state, drives the editor
//! widget through [`EditorHandle`] and reports the local selection on the
//! `session` topic while in insert mode.

pub mod controller;
pub mod editor;
pub mod error;
pub mod focus;
pub mod harness;
pub mod host;
pub mod identity;
pub mod presence;
pub mod server;

pub use controller::{CellController, CellSnapshot, Collaborators};
pub use editor::{EditorFactory, EditorHandle, MarkdownFactory, MarkdownSink};
pub use error::CellError;
pub use focus::{EditorCommand, Effect, FocusMachine, FocusState, Transition};
pub use host::{CellHost, DeferredTask, Platform};
pub use identity::CellIdentity;
pub use presence::PresenceBroadcaster;
pub use server::{CellServer, InitReply};
