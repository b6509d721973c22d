//! Focus / insert-mode state machine for a single cell.
//!
//! The machine is a plain value: `apply` takes a `cells` event, moves to the
//! next state and returns the side effects to run. It never calls out, so the
//! controller can run effects after releasing its own lock.
//!
//! States:
//! - `Unfocused`
//! - `Command` (focused, keystrokes are session commands)
//! - `Insert` (focused, keystrokes go to the editor)
//!
//! Insert implies focused: `insert_mode_changed` is ignored while unfocused,
//! and losing focus always leaves insert mode.

use cellsync_protocol::{embed_markdown, CellId, CellsEvent, ClientId, Selection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FocusState {
    #[default]
    Unfocused,
    Command,
    Insert,
}

impl FocusState {
    pub fn is_focused(self) -> bool {
        !matches!(self, FocusState::Unfocused)
    }

    pub fn is_insert(self) -> bool {
        matches!(self, FocusState::Insert)
    }

    pub fn name(self) -> &'static str {
        match self {
            FocusState::Unfocused => "unfocused",
            FocusState::Command => "command",
            FocusState::Insert => "insert",
        }
    }
}

/// Content-level command for the editor widget.
///
/// Unlike focus effects these are recorded while the editor does not exist
/// yet and replayed once it is constructed.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorCommand {
    Insert(String),
    UpdateUserSelection { client: ClientId, selection: Selection },
    RemoveUserSelection { client: ClientId },
}

impl EditorCommand {
    /// Remote client whose overlay this command sets or clears.
    pub fn overlay_client(&self) -> Option<&ClientId> {
        match self {
            EditorCommand::Insert(_) => None,
            EditorCommand::UpdateUserSelection { client, .. }
            | EditorCommand::RemoveUserSelection { client } => Some(client),
        }
    }
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    SetFocusMarker(bool),
    ScrollCellIntoView,
    FocusEditor,
    BlurEditor,
    /// Scroll the platform-focused element into view after the current turn,
    /// once in-flight click handling has placed the cursor.
    ScheduleActiveElementScroll,
    BroadcastSelection,
    Editor(EditorCommand),
}

/// Outcome of applying one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: FocusState,
    pub to: FocusState,
    pub effects: Vec<Effect>,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

#[derive(Debug, Clone, Default)]
pub struct FocusMachine {
    state: FocusState,
}

impl FocusMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FocusState {
        self.state
    }

    /// Apply a `cells` event addressed to the session, from the point of view
    /// of cell `me`. Location reports and unknown events yield no effects here.
    pub fn apply(&mut self, event: &CellsEvent, me: &CellId) -> Transition {
        let from = self.state;
        let mut effects = Vec::new();

        match event {
            CellsEvent::CellFocused { cell_id } if cell_id == me => {
                if from == FocusState::Unfocused {
                    self.state = FocusState::Command;
                }
                effects.push(Effect::SetFocusMarker(true));
                effects.push(Effect::ScrollCellIntoView);
            }
            CellsEvent::CellFocused { .. } => {
                // Only one cell is focused at a time
                if from.is_focused() {
                    self.state = FocusState::Unfocused;
                    effects.push(Effect::SetFocusMarker(false));
                }
            }
            CellsEvent::InsertModeChanged { enabled: true } => {
                if from == FocusState::Command {
                    self.state = FocusState::Insert;
                    effects.push(Effect::FocusEditor);
                    effects.push(Effect::ScheduleActiveElementScroll);
                    effects.push(Effect::BroadcastSelection);
                }
            }
            CellsEvent::InsertModeChanged { enabled: false } => {
                if from == FocusState::Insert {
                    self.state = FocusState::Command;
                    effects.push(Effect::BlurEditor);
                }
            }
            CellsEvent::CellMoved { cell_id } => {
                if cell_id == me && from.is_focused() {
                    effects.push(Effect::ScrollCellIntoView);
                }
            }
            CellsEvent::CellUpload { cell_id, url } => {
                if cell_id == me {
                    effects.push(Effect::Editor(EditorCommand::Insert(embed_markdown(url))));
                }
            }
            CellsEvent::LocationReport { .. } | CellsEvent::Unknown => {}
        }

        Transition {
            from,
            to: self.state,
            effects,
        }
    }
}
