//! In-memory collaborators for driving cells without a display or server.
//!
//! Every fake appends to a shared [`Recorder`], so a test (or the replay CLI)
//! sees one chronological log of what the controllers asked of the outside
//! world:
//! - `FakeHost` records focus markers and scrolls
//! - `FakePlatform` queues deferred tasks until `run_pending`
//! - `FakeServer` holds init requests until `reply`
//! - `FakeEditor` keeps focus, content and overlays, and can simulate user input
//!
//! `SessionHarness` wires all of them to one bus.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use cellsync_bus::{EventBus, Subscription, Topic};
use cellsync_config::{ScrollOptions, Settings};
use cellsync_protocol::{
    CellId, CellsEvent, ClientId, InitPayload, InitRequest, Revision, Selection, SessionEvent,
    TOPIC_CELLS, TOPIC_SESSION,
};

use crate::controller::{CellController, Collaborators};
use crate::editor::{
    BlurCallback, ChangeCallback, EditorFactory, EditorHandle, MarkdownFactory, MarkdownSink,
    SelectionCallback,
};
use crate::error::CellError;
use crate::host::{CellHost, DeferredTask, Platform};
use crate::identity::CellIdentity;
use crate::server::{CellServer, InitReply};

/// A call made by a controller to one of its collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum Call {
    InitRequested { cell: CellId },
    FocusMarker { cell: CellId, focused: bool },
    ScrollCell { cell: CellId },
    TaskDeferred,
    ScrollActiveElement,
    EditorConstructed { cell: CellId, source: String, revision: Revision },
    EditorDisposed { cell: CellId },
    EditorFocused { cell: CellId },
    EditorBlurred { cell: CellId },
    EditorInserted { cell: CellId, text: String },
    OverlayUpdated { cell: CellId, client: ClientId, selection: Selection },
    OverlayRemoved { cell: CellId, client: ClientId },
    MarkdownCreated { cell: CellId, base_url: String },
    MarkdownRendered { cell: CellId, source: String },
    SelectionPublished { cell: CellId, selection: Selection },
}

/// Shared, chronological call log.
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Drain the log.
    pub fn take(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock())
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

// ============================================================================
// Host and platform
// ============================================================================

pub struct FakeHost {
    label: CellId,
    attributes: Mutex<HashMap<String, String>>,
    focus_marker: AtomicBool,
    recorder: Recorder,
}

impl FakeHost {
    /// A host with no attributes.
    pub fn new(recorder: Recorder) -> Self {
        Self {
            label: CellId::from(""),
            attributes: Mutex::new(HashMap::new()),
            focus_marker: AtomicBool::new(false),
            recorder,
        }
    }

    /// A host carrying the default identity attributes.
    pub fn cell(recorder: Recorder, cell_id: &str, cell_type: &str, session_path: &str) -> Self {
        let host = Self {
            label: CellId::from(cell_id),
            ..Self::new(recorder)
        };
        host.set_attribute("cell-id", cell_id);
        host.set_attribute("type", cell_type);
        host.set_attribute("session-path", session_path);
        host
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        self.attributes.lock().insert(name.to_string(), value.to_string());
    }

    pub fn remove_attribute(&self, name: &str) {
        self.attributes.lock().remove(name);
    }

    pub fn has_focus_marker(&self) -> bool {
        self.focus_marker.load(Ordering::SeqCst)
    }
}

impl CellHost for FakeHost {
    fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.lock().get(name).cloned()
    }

    fn set_focus_marker(&self, focused: bool) {
        self.focus_marker.store(focused, Ordering::SeqCst);
        self.recorder.record(Call::FocusMarker { cell: self.label.clone(), focused });
    }

    fn scroll_into_view(&self, _options: ScrollOptions) {
        self.recorder.record(Call::ScrollCell { cell: self.label.clone() });
    }
}

/// Platform whose deferred tasks run only when asked.
pub struct FakePlatform {
    queue: Mutex<VecDeque<DeferredTask>>,
    recorder: Recorder,
}

impl FakePlatform {
    pub fn new(recorder: Recorder) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            recorder,
        }
    }

    /// Run queued tasks (including ones queued while running) in FIFO order.
    /// Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.queue.lock().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Platform for FakePlatform {
    fn defer(&self, task: DeferredTask) {
        self.recorder.record(Call::TaskDeferred);
        self.queue.lock().push_back(task);
    }

    fn scroll_active_element_into_view(&self, _options: ScrollOptions) {
        self.recorder.record(Call::ScrollActiveElement);
    }
}

// ============================================================================
// Server
// ============================================================================

/// Server that answers `cell_init` only when told to.
pub struct FakeServer {
    pending: Mutex<Vec<(InitRequest, InitReply)>>,
    recorder: Recorder,
}

impl FakeServer {
    pub fn new(recorder: Recorder) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            recorder,
        }
    }

    /// Answer the oldest outstanding request for `cell`.
    /// Returns false if there is none.
    pub fn reply(&self, cell: &CellId, payload: InitPayload) -> bool {
        let reply = {
            let mut pending = self.pending.lock();
            match pending.iter().position(|(req, _)| &req.cell_id == cell) {
                Some(index) => pending.remove(index).1,
                None => return false,
            }
        };
        reply.send(payload);
        true
    }

    pub fn pending_requests(&self) -> Vec<CellId> {
        self.pending.lock().iter().map(|(req, _)| req.cell_id.clone()).collect()
    }
}

impl CellServer for FakeServer {
    fn request_init(&self, request: InitRequest, reply: InitReply) {
        self.recorder.record(Call::InitRequested { cell: request.cell_id.clone() });
        self.pending.lock().push((request, reply));
    }
}

// ============================================================================
// Editor
// ============================================================================

type SharedChange = Arc<dyn Fn(&str) + Send + Sync>;
type SharedBlur = Arc<dyn Fn() + Send + Sync>;
type SharedSelection = Arc<dyn Fn(&Selection) + Send + Sync>;

pub struct FakeEditor {
    cell: CellId,
    source: Mutex<String>,
    selection: Mutex<Option<Selection>>,
    focused: AtomicBool,
    disposed: AtomicBool,
    overlays: Mutex<BTreeMap<ClientId, Selection>>,
    on_change: Mutex<Vec<SharedChange>>,
    on_blur: Mutex<Vec<SharedBlur>>,
    on_selection: Mutex<Vec<SharedSelection>>,
    recorder: Recorder,
}

impl FakeEditor {
    fn new(cell: CellId, source: &str, recorder: Recorder) -> Self {
        Self {
            cell,
            source: Mutex::new(source.to_string()),
            selection: Mutex::new(Some(Selection::range(0, 0))),
            focused: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            overlays: Mutex::new(BTreeMap::new()),
            on_change: Mutex::new(Vec::new()),
            on_blur: Mutex::new(Vec::new()),
            on_selection: Mutex::new(Vec::new()),
            recorder,
        }
    }

    pub fn source(&self) -> String {
        self.source.lock().clone()
    }

    pub fn is_focused(&self) -> bool {
        self.focused.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn overlays(&self) -> BTreeMap<ClientId, Selection> {
        self.overlays.lock().clone()
    }

    /// Set the selection without notifying listeners.
    pub fn set_selection(&self, selection: Option<Selection>) {
        *self.selection.lock() = selection;
    }

    /// Simulate the local user moving the cursor.
    pub fn move_cursor(&self, selection: Selection) {
        *self.selection.lock() = Some(selection.clone());
        let callbacks = self.on_selection.lock().clone();
        for callback in callbacks {
            callback(&selection);
        }
    }

    /// Simulate the local user replacing the content.
    pub fn edit(&self, source: &str) {
        *self.source.lock() = source.to_string();
        self.notify_change();
    }

    /// Simulate the widget losing platform focus.
    pub fn lose_focus(&self) {
        self.focused.store(false, Ordering::SeqCst);
        let callbacks = self.on_blur.lock().clone();
        for callback in callbacks {
            callback();
        }
    }

    fn notify_change(&self) {
        let source = self.source();
        let callbacks = self.on_change.lock().clone();
        for callback in callbacks {
            callback(&source);
        }
    }
}

impl EditorHandle for FakeEditor {
    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.recorder.record(Call::EditorDisposed { cell: self.cell.clone() });
    }

    fn focus(&self) {
        self.focused.store(true, Ordering::SeqCst);
        self.recorder.record(Call::EditorFocused { cell: self.cell.clone() });
    }

    fn blur(&self) {
        self.focused.store(false, Ordering::SeqCst);
        self.recorder.record(Call::EditorBlurred { cell: self.cell.clone() });
    }

    fn insert(&self, text: &str) {
        self.source.lock().push_str(text);
        self.recorder.record(Call::EditorInserted {
            cell: self.cell.clone(),
            text: text.to_string(),
        });
        self.notify_change();
    }

    fn selection(&self) -> Option<Selection> {
        self.selection.lock().clone()
    }

    fn on_change(&self, callback: ChangeCallback) {
        self.on_change.lock().push(Arc::from(callback));
    }

    fn on_blur(&self, callback: BlurCallback) {
        self.on_blur.lock().push(Arc::from(callback));
    }

    fn on_cursor_selection_change(&self, callback: SelectionCallback) {
        self.on_selection.lock().push(Arc::from(callback));
    }

    fn update_user_selection(&self, client: &ClientId, selection: &Selection) {
        self.overlays.lock().insert(client.clone(), selection.clone());
        self.recorder.record(Call::OverlayUpdated {
            cell: self.cell.clone(),
            client: client.clone(),
            selection: selection.clone(),
        });
    }

    fn remove_user_selection(&self, client: &ClientId) {
        self.overlays.lock().remove(client);
        self.recorder.record(Call::OverlayRemoved {
            cell: self.cell.clone(),
            client: client.clone(),
        });
    }
}

pub struct FakeEditorFactory {
    editors: Mutex<Vec<Arc<FakeEditor>>>,
    recorder: Recorder,
}

impl FakeEditorFactory {
    pub fn new(recorder: Recorder) -> Self {
        Self {
            editors: Mutex::new(Vec::new()),
            recorder,
        }
    }

    /// Most recently constructed editor for `cell`.
    pub fn editor(&self, cell: &CellId) -> Option<Arc<FakeEditor>> {
        self.editors.lock().iter().rev().find(|e| &e.cell == cell).cloned()
    }

    pub fn constructed(&self) -> usize {
        self.editors.lock().len()
    }
}

impl EditorFactory for FakeEditorFactory {
    fn construct(&self, cell: &CellIdentity, source: &str, revision: Revision) -> Arc<dyn EditorHandle> {
        let editor = Arc::new(FakeEditor::new(cell.cell_id.clone(), source, self.recorder.clone()));
        self.recorder.record(Call::EditorConstructed {
            cell: cell.cell_id.clone(),
            source: source.to_string(),
            revision,
        });
        self.editors.lock().push(Arc::clone(&editor));
        editor
    }
}

// ============================================================================
// Markdown
// ============================================================================

pub struct FakeMarkdown {
    cell: CellId,
    content: Mutex<String>,
    recorder: Recorder,
}

impl FakeMarkdown {
    pub fn content(&self) -> String {
        self.content.lock().clone()
    }
}

impl MarkdownSink for FakeMarkdown {
    fn set_content(&self, source: &str) {
        *self.content.lock() = source.to_string();
        self.recorder.record(Call::MarkdownRendered {
            cell: self.cell.clone(),
            source: source.to_string(),
        });
    }
}

pub struct FakeMarkdownFactory {
    sinks: Mutex<Vec<Arc<FakeMarkdown>>>,
    recorder: Recorder,
}

impl FakeMarkdownFactory {
    pub fn new(recorder: Recorder) -> Self {
        Self {
            sinks: Mutex::new(Vec::new()),
            recorder,
        }
    }

    pub fn sink(&self, cell: &CellId) -> Option<Arc<FakeMarkdown>> {
        self.sinks.lock().iter().rev().find(|s| &s.cell == cell).cloned()
    }
}

impl MarkdownFactory for FakeMarkdownFactory {
    fn create(&self, cell: &CellIdentity, source: &str) -> Arc<dyn MarkdownSink> {
        self.recorder.record(Call::MarkdownCreated {
            cell: cell.cell_id.clone(),
            base_url: cell.session_path.clone(),
        });
        let sink = Arc::new(FakeMarkdown {
            cell: cell.cell_id.clone(),
            content: Mutex::new(source.to_string()),
            recorder: self.recorder.clone(),
        });
        self.sinks.lock().push(Arc::clone(&sink));
        sink
    }
}

// ============================================================================
// Session
// ============================================================================

/// Default session path given to harness-mounted cells.
pub const HARNESS_SESSION_PATH: &str = "/sessions/harness";

/// One bus plus a full set of fakes, with the `session` topic recorded.
pub struct SessionHarness {
    pub recorder: Recorder,
    pub bus: EventBus,
    pub platform: Arc<FakePlatform>,
    pub server: Arc<FakeServer>,
    pub editors: Arc<FakeEditorFactory>,
    pub markdown: Arc<FakeMarkdownFactory>,
    collaborators: Collaborators,
    cells: Topic<CellsEvent>,
    session_listener: Subscription,
}

impl SessionHarness {
    pub fn new() -> Result<Self, CellError> {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Result<Self, CellError> {
        let recorder = Recorder::new();
        let bus = EventBus::new();
        let platform = Arc::new(FakePlatform::new(recorder.clone()));
        let server = Arc::new(FakeServer::new(recorder.clone()));
        let editors = Arc::new(FakeEditorFactory::new(recorder.clone()));
        let markdown = Arc::new(FakeMarkdownFactory::new(recorder.clone()));

        let cells = bus.topic::<CellsEvent>(TOPIC_CELLS)?;
        let session = bus.topic::<SessionEvent>(TOPIC_SESSION)?;

        let session_recorder = recorder.clone();
        let session_listener = session.subscribe(move |event: &SessionEvent| {
            if let SessionEvent::CursorSelectionChanged { cell_id, selection } = event {
                session_recorder.record(Call::SelectionPublished {
                    cell: cell_id.clone(),
                    selection: selection.clone(),
                });
            }
        });

        let collaborators = Collaborators {
            bus: bus.clone(),
            platform: platform.clone(),
            server: server.clone(),
            editors: editors.clone(),
            markdown: markdown.clone(),
            settings: Arc::new(settings),
        };

        Ok(Self {
            recorder,
            bus,
            platform,
            server,
            editors,
            markdown,
            collaborators,
            cells,
            session_listener,
        })
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// A host with default attributes, sharing this harness' recorder.
    pub fn host(&self, cell_id: &str, cell_type: &str) -> Arc<FakeHost> {
        Arc::new(FakeHost::cell(self.recorder.clone(), cell_id, cell_type, HARNESS_SESSION_PATH))
    }

    pub fn mount(&self, cell_id: &str, cell_type: &str) -> Result<(CellController, Arc<FakeHost>), CellError> {
        let host = self.host(cell_id, cell_type);
        let controller = self.mount_host(host.clone())?;
        Ok((controller, host))
    }

    pub fn mount_host(&self, host: Arc<FakeHost>) -> Result<CellController, CellError> {
        CellController::mount(host, &self.collaborators)
    }

    /// Answer the init request of `cell_id`.
    pub fn init(&self, cell_id: &str, source: &str, revision: u64) -> bool {
        self.server.reply(
            &CellId::from(cell_id),
            InitPayload {
                source: source.to_string(),
                revision: Revision(revision),
            },
        )
    }

    pub fn publish(&self, event: CellsEvent) {
        self.cells.publish(&event);
    }

    pub fn focus(&self, cell_id: &str) {
        self.publish(CellsEvent::CellFocused { cell_id: CellId::from(cell_id) });
    }

    pub fn insert_mode(&self, enabled: bool) {
        self.publish(CellsEvent::InsertModeChanged { enabled });
    }

    pub fn editor(&self, cell_id: &str) -> Option<Arc<FakeEditor>> {
        self.editors.editor(&CellId::from(cell_id))
    }

    /// Every `cursor_selection_changed` seen on the session topic so far.
    pub fn published_selections(&self) -> Vec<(CellId, Selection)> {
        self.recorder
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SelectionPublished { cell, selection } => Some((cell, selection)),
                _ => None,
            })
            .collect()
    }
}

impl Drop for SessionHarness {
    fn drop(&mut self) {
        self.session_listener.unsubscribe();
    }
}
