//! Session controller for one mounted cell.
//!
//! Lifecycle:
//! 1. `mount` reads identity, sends one `cell_init` request and subscribes to
//!    the `cells` topic. Events are applied to local state from this point on.
//! 2. The init reply constructs the editor. State recorded while waiting
//!    (focus, insert mode, uploads, overlays) is reconciled onto it once.
//! 3. `destroy` unsubscribes, then disposes the editor.
//!
//! Locking: the state lock is never held while calling a collaborator.
//! Effects are computed under the lock and run after it is released, so
//! editor callbacks may re-enter the controller.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use cellsync_bus::{EventBus, Subscription};
use cellsync_config::Settings;
use cellsync_protocol::{
    CellId, CellsEvent, InitPayload, InitRequest, Selection, SessionEvent, TOPIC_CELLS,
    TOPIC_SESSION,
};

use crate::editor::{EditorFactory, EditorHandle, MarkdownFactory};
use crate::error::CellError;
use crate::focus::{EditorCommand, Effect, FocusMachine, FocusState};
use crate::host::{CellHost, Platform};
use crate::identity::CellIdentity;
use crate::presence::{self, PresenceBroadcaster};
use crate::server::{CellServer, InitReply};

/// Shared services every cell of a session is mounted with.
#[derive(Clone)]
pub struct Collaborators {
    pub bus: EventBus,
    pub platform: Arc<dyn Platform>,
    pub server: Arc<dyn CellServer>,
    pub editors: Arc<dyn EditorFactory>,
    pub markdown: Arc<dyn MarkdownFactory>,
    pub settings: Arc<Settings>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("bus", &self.bus)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a cell's local state.
#[derive(Debug, Clone, PartialEq)]
pub struct CellSnapshot {
    pub identity: CellIdentity,
    pub focus: FocusState,
    pub editor_ready: bool,
    /// Editor commands recorded before the editor existed.
    pub pending_commands: usize,
    pub destroyed: bool,
}

struct CellState {
    identity: CellIdentity,
    machine: FocusMachine,
    editor: Option<Arc<dyn EditorHandle>>,
    pending: Vec<EditorCommand>,
    destroyed: bool,
}

struct CellInner {
    host: Arc<dyn CellHost>,
    platform: Arc<dyn Platform>,
    editors: Arc<dyn EditorFactory>,
    markdown: Arc<dyn MarkdownFactory>,
    settings: Arc<Settings>,
    broadcaster: PresenceBroadcaster,
    subscription: Mutex<Option<Subscription>>,
    state: Mutex<CellState>,
}

/// Controller owning one cell's focus state and editor.
///
/// Dropping the controller destroys it.
pub struct CellController {
    inner: Arc<CellInner>,
}

impl CellController {
    /// Mount a cell on `host`.
    ///
    /// Fails if a required identity attribute is missing; no partial cell is
    /// created in that case.
    pub fn mount(host: Arc<dyn CellHost>, deps: &Collaborators) -> Result<Self, CellError> {
        let identity = CellIdentity::read(host.as_ref(), &deps.settings.attributes)?;
        let cells = deps.bus.topic::<CellsEvent>(TOPIC_CELLS)?;
        let session = deps.bus.topic::<SessionEvent>(TOPIC_SESSION)?;
        let cell_id = identity.cell_id.clone();
        let cell_type = identity.cell_type.clone();

        let inner = Arc::new(CellInner {
            host,
            platform: Arc::clone(&deps.platform),
            editors: Arc::clone(&deps.editors),
            markdown: Arc::clone(&deps.markdown),
            settings: Arc::clone(&deps.settings),
            broadcaster: PresenceBroadcaster::new(session),
            subscription: Mutex::new(None),
            state: Mutex::new(CellState {
                identity,
                machine: FocusMachine::new(),
                editor: None,
                pending: Vec::new(),
                destroyed: false,
            }),
        });

        let weak = Arc::downgrade(&inner);
        deps.server.request_init(
            InitRequest { cell_id: cell_id.clone() },
            InitReply::new(move |payload| match weak.upgrade() {
                Some(inner) => inner.on_init(payload),
                None => log::debug!("Init reply for a dropped cell, ignoring"),
            }),
        );

        let weak = Arc::downgrade(&inner);
        let subscription = cells.subscribe(move |event: &CellsEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_cells_event(event);
            }
        });
        *inner.subscription.lock() = Some(subscription);

        log::debug!("Mounted cell {} ({})", cell_id, cell_type);
        Ok(Self { inner })
    }

    pub fn cell_id(&self) -> CellId {
        self.inner.state.lock().identity.cell_id.clone()
    }

    pub fn focus_state(&self) -> FocusState {
        self.inner.state.lock().machine.state()
    }

    pub fn snapshot(&self) -> CellSnapshot {
        let state = self.inner.state.lock();
        CellSnapshot {
            identity: state.identity.clone(),
            focus: state.machine.state(),
            editor_ready: state.editor.is_some(),
            pending_commands: state.pending.len(),
            destroyed: state.destroyed,
        }
    }

    /// Re-read identity after the host re-rendered. Focus state and the
    /// editor are kept. On error the previous identity stays in place.
    pub fn refresh_identity(&self) -> Result<(), CellError> {
        let identity = CellIdentity::read(self.inner.host.as_ref(), &self.inner.settings.attributes)?;
        let mut state = self.inner.state.lock();
        if state.identity != identity {
            log::debug!("Cell {} identity refreshed to {:?}", state.identity.cell_id, identity);
        }
        state.identity = identity;
        Ok(())
    }

    /// Report the current selection to the session, or `explicit` if given.
    /// No-op unless the cell is in insert mode.
    pub fn broadcast_selection(&self, explicit: Option<Selection>) -> bool {
        self.inner.broadcast_selection(explicit)
    }

    /// Unsubscribe from the `cells` topic, then dispose the editor.
    /// Calling it again is a no-op.
    pub fn destroy(&self) {
        self.inner.destroy();
    }
}

impl Drop for CellController {
    fn drop(&mut self) {
        self.inner.destroy();
    }
}

impl fmt::Debug for CellController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellController")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl CellInner {
    fn handle_cells_event(&self, event: &CellsEvent) {
        let (effects, editor) = {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            let me = state.identity.cell_id.clone();

            let effects = match event {
                CellsEvent::LocationReport { client, report } => {
                    vec![Effect::Editor(presence::overlay_command(&me, client, report))]
                }
                CellsEvent::Unknown => {
                    log::trace!("Cell {} ignoring unknown cells event", me);
                    return;
                }
                _ => {
                    let transition = state.machine.apply(event, &me);
                    if transition.changed() {
                        log::debug!(
                            "Cell {}: {:?} -> {:?} on {}",
                            me,
                            transition.from,
                            transition.to,
                            event.kind()
                        );
                    } else if transition.effects.is_empty() {
                        log::trace!("Cell {} unaffected by {}", me, event.kind());
                    }
                    transition.effects
                }
            };

            // Content commands wait for the editor; focus effects do not,
            // the recorded state is reconciled on construction instead.
            let effects = if state.editor.is_none() {
                let mut kept = Vec::with_capacity(effects.len());
                for effect in effects {
                    match effect {
                        Effect::Editor(command) => {
                            log::trace!("Cell {} editor not ready, recording {:?}", me, command);
                            record_pending(&mut state.pending, command);
                        }
                        other => kept.push(other),
                    }
                }
                kept
            } else {
                effects
            };

            (effects, state.editor.clone())
        };

        self.run_effects(effects, editor);
    }

    /// Run effects in order. A collaborator may destroy the cell from inside
    /// a callback; nothing runs after that.
    fn run_effects(&self, effects: Vec<Effect>, editor: Option<Arc<dyn EditorHandle>>) {
        for effect in effects {
            if self.is_destroyed() {
                log::trace!("Cell destroyed mid-transition, dropping {:?}", effect);
                return;
            }
            self.run_effect(effect, editor.as_ref());
        }
    }

    fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    fn run_effect(&self, effect: Effect, editor: Option<&Arc<dyn EditorHandle>>) {
        match effect {
            Effect::SetFocusMarker(focused) => self.host.set_focus_marker(focused),
            Effect::ScrollCellIntoView => self.host.scroll_into_view(self.settings.cell_scroll()),
            Effect::FocusEditor => {
                if let Some(editor) = editor {
                    editor.focus();
                }
            }
            Effect::BlurEditor => {
                if let Some(editor) = editor {
                    editor.blur();
                }
            }
            Effect::ScheduleActiveElementScroll => {
                if editor.is_some() {
                    let platform = Arc::clone(&self.platform);
                    let options = self.settings.active_element_scroll();
                    self.platform
                        .defer(Box::new(move || platform.scroll_active_element_into_view(options)));
                }
            }
            Effect::BroadcastSelection => {
                if editor.is_some() {
                    self.broadcast_selection(None);
                }
            }
            Effect::Editor(command) => {
                if let Some(editor) = editor {
                    apply_command(editor.as_ref(), &command);
                }
            }
        }
    }

    fn broadcast_selection(&self, explicit: Option<Selection>) -> bool {
        let (cell_id, focus, editor) = {
            let state = self.state.lock();
            if state.destroyed {
                return false;
            }
            (state.identity.cell_id.clone(), state.machine.state(), state.editor.clone())
        };

        let selection = match explicit.or_else(|| editor.and_then(|e| e.selection())) {
            Some(selection) => selection,
            None => return false,
        };

        self.broadcaster.broadcast(&cell_id, focus, selection)
    }

    fn on_init(self: &Arc<Self>, payload: InitPayload) {
        let identity = {
            let state = self.state.lock();
            if state.destroyed {
                log::debug!("Cell {} destroyed before init reply, ignoring", state.identity.cell_id);
                return;
            }
            if state.editor.is_some() {
                log::warn!("Cell {} already initialized, ignoring reply", state.identity.cell_id);
                return;
            }
            state.identity.clone()
        };

        let editor = self.editors.construct(&identity, &payload.source, payload.revision);
        log::debug!(
            "Cell {} editor constructed at revision {}",
            identity.cell_id,
            payload.revision.0
        );

        if identity.cell_type.is_markdown() {
            let sink = self.markdown.create(&identity, &payload.source);
            editor.on_change(Box::new(move |source: &str| sink.set_content(source)));
        }

        let (focus, pending) = {
            let mut state = self.state.lock();
            state.editor = Some(Arc::clone(&editor));
            (state.machine.state(), std::mem::take(&mut state.pending))
        };

        // Reflect focus state recorded while waiting for the server
        if focus.is_insert() {
            editor.focus();
            // Focusing interrupts an in-flight scroll to this cell
            self.host.scroll_into_view(self.settings.cell_scroll());
            self.broadcast_selection(None);
        }

        if self.is_destroyed() {
            return;
        }
        if !pending.is_empty() {
            log::debug!(
                "Cell {} replaying {} recorded editor command(s)",
                identity.cell_id,
                pending.len()
            );
        }
        for command in &pending {
            apply_command(editor.as_ref(), command);
        }

        let weak = Arc::downgrade(self);
        editor.on_blur(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.handle_editor_blur();
            }
        }));

        let weak = Arc::downgrade(self);
        editor.on_cursor_selection_change(Box::new(move |selection: &Selection| {
            if let Some(inner) = weak.upgrade() {
                inner.broadcast_selection(Some(selection.clone()));
            }
        }));
    }

    /// Keep the editor focused unless the cell actually left insert mode
    /// (e.g. when the cell is moved with toolbar buttons).
    fn handle_editor_blur(&self) {
        if !self.settings.refocus_on_blur {
            return;
        }
        let editor = {
            let state = self.state.lock();
            if state.destroyed || !state.machine.state().is_insert() {
                return;
            }
            state.editor.clone()
        };
        if let Some(editor) = editor {
            log::trace!("Editor blurred in insert mode, refocusing");
            editor.focus();
        }
    }

    fn destroy(&self) {
        // Unsubscribe first so no event reaches a disposed editor
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.unsubscribe();
        }

        let (cell_id, editor) = {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.pending.clear();
            (state.identity.cell_id.clone(), state.editor.take())
        };

        if let Some(editor) = editor {
            editor.dispose();
        }
        log::debug!("Destroyed cell {}", cell_id);
    }
}

/// Queue a command for the editor under construction. Overlays are
/// last-writer-wins per client, so only the latest one per client is kept;
/// inserts keep their arrival order.
fn record_pending(pending: &mut Vec<EditorCommand>, command: EditorCommand) {
    if let Some(client) = command.overlay_client() {
        pending.retain(|queued| queued.overlay_client() != Some(client));
    }
    pending.push(command);
}

fn apply_command(editor: &dyn EditorHandle, command: &EditorCommand) {
    match command {
        EditorCommand::Insert(text) => editor.insert(text),
        EditorCommand::UpdateUserSelection { client, selection } => {
            editor.update_user_selection(client, selection)
        }
        EditorCommand::RemoveUserSelection { client } => editor.remove_user_selection(client),
    }
}
