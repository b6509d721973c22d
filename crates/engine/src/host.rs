//! Rendering-surface seams.
//!
//! The state machine never touches a display directly. The host element and
//! the platform event loop are reached through these traits, so transitions
//! can be exercised without a real surface.

use cellsync_config::ScrollOptions;

/// Task scheduled to run after the current event-processing turn.
pub type DeferredTask = Box<dyn FnOnce() + Send>;

/// The element hosting one cell.
pub trait CellHost: Send + Sync {
    /// Current value of a host attribute.
    fn attribute(&self, name: &str) -> Option<String>;

    /// Show or hide the visible focus marker.
    fn set_focus_marker(&self, focused: bool);

    /// Bring the cell element into view.
    fn scroll_into_view(&self, options: ScrollOptions);
}

/// Process-wide platform services shared by all cells.
pub trait Platform: Send + Sync {
    /// Queue a task behind every event already pending on the platform loop.
    /// The task runs exactly once.
    fn defer(&self, task: DeferredTask);

    /// Bring whatever element currently has platform focus into view.
    fn scroll_active_element_into_view(&self, options: ScrollOptions);
}
