//! Presence: local selection broadcasts and remote cursor overlays.
//!
//! Outgoing: a cell reports its selection on the `session` topic only while it
//! is in insert mode, so at most one cell per client feeds the session.
//!
//! Incoming: a location report either places the client's overlay in this
//! cell or removes it (the client moved elsewhere or cleared its selection).

use cellsync_bus::Topic;
use cellsync_protocol::{CellId, ClientId, LocationReport, Selection, SessionEvent};

use crate::focus::{EditorCommand, FocusState};

/// Guarded emitter of local selection changes.
#[derive(Clone, Debug)]
pub struct PresenceBroadcaster {
    session: Topic<SessionEvent>,
}

impl PresenceBroadcaster {
    pub fn new(session: Topic<SessionEvent>) -> Self {
        Self { session }
    }

    /// Publish `selection` for `cell_id` if `state` is insert mode.
    /// Returns whether anything was published.
    pub fn broadcast(&self, cell_id: &CellId, state: FocusState, selection: Selection) -> bool {
        if !state.is_insert() {
            log::trace!("Cell {} not in insert mode, selection not broadcast", cell_id);
            return false;
        }

        self.session.publish(&SessionEvent::CursorSelectionChanged {
            cell_id: cell_id.clone(),
            selection,
        });
        true
    }
}

/// Overlay command for a location report received by cell `me`.
pub fn overlay_command(me: &CellId, client: &ClientId, report: &LocationReport) -> EditorCommand {
    match &report.selection {
        Some(selection) if &report.cell_id == me => EditorCommand::UpdateUserSelection {
            client: client.clone(),
            selection: selection.clone(),
        },
        _ => EditorCommand::RemoveUserSelection { client: client.clone() },
    }
}
