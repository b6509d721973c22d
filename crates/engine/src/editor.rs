//! Editor widget and markdown renderer seams.
//!
//! The editing widget owns the text buffer, cursor rendering and its own
//! revisioned sync protocol. This crate only drives its lifecycle, focus and
//! remote cursor overlays.

use std::sync::Arc;

use cellsync_protocol::{ClientId, Revision, Selection};

use crate::identity::CellIdentity;

/// Callback receiving the full source after every change.
pub type ChangeCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Callback invoked when the editor loses focus.
pub type BlurCallback = Box<dyn Fn() + Send + Sync>;

/// Callback receiving the local cursor/selection after it moves.
pub type SelectionCallback = Box<dyn Fn(&Selection) + Send + Sync>;

/// A live editing widget bound to one cell.
pub trait EditorHandle: Send + Sync {
    /// Release the widget. No other method is called afterwards.
    fn dispose(&self);

    fn focus(&self);

    fn blur(&self);

    /// Insert text at the current cursor.
    fn insert(&self, text: &str);

    /// Current local selection, if the widget has a cursor.
    fn selection(&self) -> Option<Selection>;

    fn on_change(&self, callback: ChangeCallback);

    fn on_blur(&self, callback: BlurCallback);

    fn on_cursor_selection_change(&self, callback: SelectionCallback);

    /// Show (or replace) the overlay for a remote client.
    fn update_user_selection(&self, client: &ClientId, selection: &Selection);

    /// Remove the overlay for a remote client, if any.
    fn remove_user_selection(&self, client: &ClientId);
}

/// Builds editor widgets once the initial source is known.
pub trait EditorFactory: Send + Sync {
    fn construct(&self, cell: &CellIdentity, source: &str, revision: Revision) -> Arc<dyn EditorHandle>;
}

/// Rendered markdown output of a markdown cell.
pub trait MarkdownSink: Send + Sync {
    fn set_content(&self, source: &str);
}

/// Builds markdown sinks. The sink resolves relative links against the
/// cell's session path.
pub trait MarkdownFactory: Send + Sync {
    fn create(&self, cell: &CellIdentity, source: &str) -> Arc<dyn MarkdownSink>;
}
