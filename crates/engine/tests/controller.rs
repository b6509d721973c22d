//! End-to-end cell scenarios against in-memory collaborators.

use std::sync::Arc;

use cellsync_bus::EventBus;
use cellsync_config::Settings;
use cellsync_engine::harness::{Call, SessionHarness};
use cellsync_engine::{CellController, CellError, Collaborators, FocusState};
use cellsync_protocol::{
    CellId, CellType, CellsEvent, ClientId, LocationReport, Selection, TOPIC_CELLS,
};

fn harness() -> SessionHarness {
    SessionHarness::new().unwrap()
}

fn location(client: &str, cell: &str, selection: Option<Selection>) -> CellsEvent {
    CellsEvent::LocationReport {
        client: ClientId::from(client),
        report: LocationReport { cell_id: CellId::from(cell), selection },
    }
}

fn cells_subscribers(h: &SessionHarness) -> usize {
    h.bus.topic::<CellsEvent>(TOPIC_CELLS).unwrap().subscriber_count()
}

// =============================================================================
// Mount
// =============================================================================

#[test]
fn test_mount_sends_one_init_request() {
    let h = harness();
    let (cell, _host) = h.mount("c1", "elixir").unwrap();

    assert_eq!(h.server.pending_requests(), vec![CellId::from("c1")]);
    assert_eq!(cells_subscribers(&h), 1);

    let snapshot = cell.snapshot();
    assert_eq!(snapshot.focus, FocusState::Unfocused);
    assert!(!snapshot.editor_ready);
    assert_eq!(snapshot.identity.cell_type, CellType::Code { language: "elixir".to_string() });
    assert_eq!(snapshot.identity.session_path, "/sessions/harness");
}

#[test]
fn test_mount_missing_attribute_creates_nothing() {
    let h = harness();
    let host = h.host("c1", "elixir");
    host.remove_attribute("session-path");

    let err = h.mount_host(host).unwrap_err();
    assert_eq!(err, CellError::MissingAttribute { name: "session-path".to_string() });
    assert!(h.server.pending_requests().is_empty());
    assert_eq!(cells_subscribers(&h), 0);
}

#[test]
fn test_mount_rejects_mistyped_bus_topic() {
    let h = harness();
    let bus = EventBus::new();
    let _wrong = bus.topic::<String>(TOPIC_CELLS).unwrap();
    let deps = Collaborators { bus, ..h.collaborators().clone() };

    let err = CellController::mount(h.host("c1", "elixir"), &deps).unwrap_err();
    assert!(matches!(err, CellError::Bus(_)));
    assert!(h.server.pending_requests().is_empty());
}

#[test]
fn test_init_constructs_editor_with_payload() {
    let h = harness();
    let (cell, _host) = h.mount("c1", "elixir").unwrap();

    assert!(h.init("c1", "IO.puts(1)", 7));
    let editor = h.editor("c1").unwrap();
    assert_eq!(editor.source(), "IO.puts(1)");
    assert!(cell.snapshot().editor_ready);
    assert!(h.recorder.calls().contains(&Call::EditorConstructed {
        cell: CellId::from("c1"),
        source: "IO.puts(1)".to_string(),
        revision: cellsync_protocol::Revision(7),
    }));
}

// =============================================================================
// Focus and insert mode
// =============================================================================

#[test]
fn test_focus_insert_and_switch_cells() {
    let h = harness();
    let (c1, host1) = h.mount("c1", "elixir").unwrap();
    let (c2, host2) = h.mount("c2", "elixir").unwrap();
    h.init("c1", "a", 1);
    h.init("c2", "b", 1);
    let e1 = h.editor("c1").unwrap();
    let e2 = h.editor("c2").unwrap();

    h.focus("c1");
    assert_eq!(c1.focus_state(), FocusState::Command);
    assert_eq!(c2.focus_state(), FocusState::Unfocused);
    assert!(host1.has_focus_marker());
    assert!(!host2.has_focus_marker());

    h.insert_mode(true);
    assert_eq!(c1.focus_state(), FocusState::Insert);
    assert_eq!(c2.focus_state(), FocusState::Unfocused);
    assert!(e1.is_focused());
    assert!(!e2.is_focused());
    assert_eq!(h.published_selections(), vec![(CellId::from("c1"), Selection::range(0, 0))]);

    e1.move_cursor(Selection::range(1, 3));
    assert_eq!(h.published_selections().len(), 2);
    assert_eq!(h.published_selections()[1], (CellId::from("c1"), Selection::range(1, 3)));

    h.focus("c2");
    assert_eq!(c1.focus_state(), FocusState::Unfocused);
    assert_eq!(c2.focus_state(), FocusState::Command);
    assert!(!host1.has_focus_marker());
    assert!(host2.has_focus_marker());

    // c1 left insert mode with focus; its cursor is no longer reported
    e1.move_cursor(Selection::range(4, 4));
    e2.move_cursor(Selection::range(0, 1));
    assert_eq!(h.published_selections().len(), 2);

    h.insert_mode(true);
    assert!(e2.is_focused());
    assert_eq!(h.published_selections()[2], (CellId::from("c2"), Selection::range(0, 1)));
}

#[test]
fn test_insert_mode_defers_active_element_scroll() {
    let h = harness();
    let (_cell, _host) = h.mount("c1", "elixir").unwrap();
    h.init("c1", "", 1);
    h.focus("c1");
    h.recorder.clear();

    h.insert_mode(true);
    assert_eq!(h.platform.pending(), 1);
    assert_eq!(h.recorder.count(|c| *c == Call::ScrollActiveElement), 0);

    assert_eq!(h.platform.run_pending(), 1);
    assert_eq!(h.recorder.count(|c| *c == Call::ScrollActiveElement), 1);
}

#[test]
fn test_leave_insert_mode_blurs_editor() {
    let h = harness();
    let (cell, _host) = h.mount("c1", "elixir").unwrap();
    h.init("c1", "", 1);
    h.focus("c1");
    h.insert_mode(true);
    let editor = h.editor("c1").unwrap();
    assert!(editor.is_focused());

    h.insert_mode(false);
    assert_eq!(cell.focus_state(), FocusState::Command);
    assert!(!editor.is_focused());

    editor.move_cursor(Selection::range(2, 2));
    assert_eq!(h.published_selections().len(), 1);
}

#[test]
fn test_cell_moved_scrolls_focused_cell() {
    let h = harness();
    let (_cell, _host) = h.mount("c1", "elixir").unwrap();
    h.init("c1", "", 1);
    let scrolls = |h: &SessionHarness| h.recorder.count(|c| matches!(c, Call::ScrollCell { .. }));

    h.publish(CellsEvent::CellMoved { cell_id: CellId::from("c1") });
    assert_eq!(scrolls(&h), 0);

    h.focus("c1");
    assert_eq!(scrolls(&h), 1);
    h.publish(CellsEvent::CellMoved { cell_id: CellId::from("c1") });
    assert_eq!(scrolls(&h), 2);
    h.publish(CellsEvent::CellMoved { cell_id: CellId::from("c2") });
    assert_eq!(scrolls(&h), 2);
}

#[test]
fn test_unknown_event_ignored() {
    let h = harness();
    let (cell, _host) = h.mount("c1", "elixir").unwrap();
    h.init("c1", "", 1);
    h.focus("c1");
    h.recorder.clear();

    h.publish(CellsEvent::Unknown);
    assert_eq!(cell.focus_state(), FocusState::Command);
    assert!(h.recorder.calls().is_empty());
}

// =============================================================================
// Reconciliation
// =============================================================================

#[test]
fn test_insert_before_init_is_reconciled() {
    let h = harness();
    let (cell, host) = h.mount("c1", "elixir").unwrap();

    h.focus("c1");
    h.insert_mode(true);
    assert_eq!(cell.focus_state(), FocusState::Insert);
    assert!(host.has_focus_marker());
    assert!(h.published_selections().is_empty());
    assert_eq!(h.platform.pending(), 0);

    h.init("c1", "x", 1);
    let editor = h.editor("c1").unwrap();
    assert!(editor.is_focused());
    assert_eq!(h.published_selections(), vec![(CellId::from("c1"), Selection::range(0, 0))]);

    let calls = h.recorder.calls();
    let constructed = calls
        .iter()
        .position(|c| matches!(c, Call::EditorConstructed { .. }))
        .unwrap();
    assert!(calls[constructed..].iter().any(|c| matches!(c, Call::ScrollCell { .. })));
}

#[test]
fn test_command_mode_before_init_not_focused() {
    let h = harness();
    let (_cell, _host) = h.mount("c1", "elixir").unwrap();
    h.focus("c1");

    h.init("c1", "x", 1);
    assert!(!h.editor("c1").unwrap().is_focused());
    assert!(h.published_selections().is_empty());
}

#[test]
fn test_content_commands_buffered_until_init() {
    let h = harness();
    let (cell, _host) = h.mount("c1", "elixir").unwrap();

    h.publish(CellsEvent::CellUpload { cell_id: CellId::from("c1"), url: "/u/a.png".to_string() });
    h.publish(location("x", "c1", Some(Selection::range(3, 3))));
    assert_eq!(cell.snapshot().pending_commands, 2);

    h.init("c1", "src ", 1);
    let editor = h.editor("c1").unwrap();
    assert_eq!(editor.source(), "src ![](/u/a.png)");
    assert_eq!(editor.overlays().get(&ClientId::from("x")), Some(&Selection::range(3, 3)));
    assert_eq!(cell.snapshot().pending_commands, 0);
}

#[test]
fn test_pending_overlays_coalesced_per_client() {
    let h = harness();
    let (cell, _host) = h.mount("c1", "elixir").unwrap();

    for at in 0..10_000 {
        h.publish(location("x", "c2", Some(Selection::range(at, at))));
    }
    assert_eq!(cell.snapshot().pending_commands, 1);

    h.publish(location("y", "c1", Some(Selection::range(4, 4))));
    h.publish(location("x", "c1", Some(Selection::range(7, 7))));
    assert_eq!(cell.snapshot().pending_commands, 2);

    h.init("c1", "", 1);
    let editor = h.editor("c1").unwrap();
    assert_eq!(editor.overlays().get(&ClientId::from("x")), Some(&Selection::range(7, 7)));
    assert_eq!(editor.overlays().get(&ClientId::from("y")), Some(&Selection::range(4, 4)));
    assert_eq!(h.recorder.count(|c| matches!(c, Call::OverlayUpdated { .. })), 2);
    assert_eq!(h.recorder.count(|c| matches!(c, Call::OverlayRemoved { .. })), 0);
}

#[test]
fn test_each_mount_gets_its_own_reply() {
    let h = harness();
    let collaborators = h.collaborators().clone();
    let (_cell, _host) = h.mount("c1", "elixir").unwrap();
    h.init("c1", "first", 1);

    // A second mount of the same id issues its own request
    let second = CellController::mount(h.host("c1", "elixir"), &collaborators).unwrap();
    assert!(h.init("c1", "second", 2));
    assert_eq!(h.editors.constructed(), 2);
    assert!(!h.init("c1", "third", 3));
    drop(second);
}

#[test]
fn test_init_after_destroy_ignored() {
    let h = harness();
    let (cell, _host) = h.mount("c1", "elixir").unwrap();
    cell.destroy();

    assert!(h.init("c1", "late", 1));
    assert_eq!(h.editors.constructed(), 0);
}

// =============================================================================
// Presence
// =============================================================================

#[test]
fn test_location_report_places_and_clears_overlay() {
    let h = harness();
    let (_c1, _h1) = h.mount("c1", "elixir").unwrap();
    let (_c2, _h2) = h.mount("c2", "elixir").unwrap();
    h.init("c1", "", 1);
    h.init("c2", "", 1);
    let e1 = h.editor("c1").unwrap();
    let e2 = h.editor("c2").unwrap();
    let x = ClientId::from("x");
    h.recorder.clear();

    h.publish(location("x", "c1", Some(Selection::range(5, 8))));
    assert_eq!(e1.overlays().get(&x), Some(&Selection::range(5, 8)));
    assert!(e2.overlays().is_empty());
    assert_eq!(overlay_calls(&h), (vec!["c1"], vec!["c2"]));

    // Client moves to c2
    h.publish(location("x", "c2", Some(Selection::range(1, 1))));
    assert!(e1.overlays().is_empty());
    assert_eq!(e2.overlays().get(&x), Some(&Selection::range(1, 1)));
    assert_eq!(overlay_calls(&h), (vec!["c2"], vec!["c1"]));

    // Client clears its selection
    h.publish(location("x", "c2", None));
    assert!(e1.overlays().is_empty());
    assert!(e2.overlays().is_empty());
    assert_eq!(overlay_calls(&h), (Vec::<&str>::new(), vec!["c1", "c2"]));
}

/// Cells that received an overlay update and an overlay removal since the
/// last call, in mount order.
fn overlay_calls(h: &SessionHarness) -> (Vec<&'static str>, Vec<&'static str>) {
    let calls = h.recorder.take();
    let cells = |updated: bool| -> Vec<&'static str> {
        ["c1", "c2"]
            .into_iter()
            .flat_map(|id| {
                let n = calls
                    .iter()
                    .filter(|c| match c {
                        Call::OverlayUpdated { cell, .. } => updated && cell.as_str() == id,
                        Call::OverlayRemoved { cell, .. } => !updated && cell.as_str() == id,
                        _ => false,
                    })
                    .count();
                std::iter::repeat(id).take(n)
            })
            .collect()
    };
    (cells(true), cells(false))
}

#[test]
fn test_location_report_does_not_change_focus() {
    let h = harness();
    let (cell, _host) = h.mount("c1", "elixir").unwrap();
    h.init("c1", "", 1);
    h.focus("c1");
    h.insert_mode(true);

    h.publish(location("y", "c1", Some(Selection::range(0, 2))));
    assert_eq!(cell.focus_state(), FocusState::Insert);
    assert_eq!(h.published_selections().len(), 1);
}

#[test]
fn test_explicit_broadcast_guarded() {
    let h = harness();
    let (cell, _host) = h.mount("c1", "elixir").unwrap();
    h.init("c1", "", 1);

    assert!(!cell.broadcast_selection(Some(Selection::range(1, 2))));
    h.focus("c1");
    assert!(!cell.broadcast_selection(None));
    h.insert_mode(true);
    assert!(cell.broadcast_selection(Some(Selection::range(1, 2))));
    assert_eq!(h.published_selections().last(), Some(&(CellId::from("c1"), Selection::range(1, 2))));
}

#[test]
fn test_broadcast_skipped_without_selection() {
    let h = harness();
    let (cell, _host) = h.mount("c1", "elixir").unwrap();
    h.init("c1", "", 1);
    h.editor("c1").unwrap().set_selection(None);

    h.focus("c1");
    h.insert_mode(true);
    assert_eq!(cell.focus_state(), FocusState::Insert);
    assert!(h.published_selections().is_empty());
}

// =============================================================================
// Editor callbacks
// =============================================================================

#[test]
fn test_refocus_on_blur_in_insert_mode() {
    let h = harness();
    let (_cell, _host) = h.mount("c1", "elixir").unwrap();
    h.init("c1", "", 1);
    let editor = h.editor("c1").unwrap();

    // Command mode: blur sticks
    h.focus("c1");
    editor.lose_focus();
    assert!(!editor.is_focused());

    h.insert_mode(true);
    editor.lose_focus();
    assert!(editor.is_focused());
}

#[test]
fn test_refocus_on_blur_disabled() {
    let settings = Settings { refocus_on_blur: false, ..Settings::default() };
    let h = SessionHarness::with_settings(settings).unwrap();
    let (_cell, _host) = h.mount("c1", "elixir").unwrap();
    h.init("c1", "", 1);
    h.focus("c1");
    h.insert_mode(true);

    let editor = h.editor("c1").unwrap();
    editor.lose_focus();
    assert!(!editor.is_focused());
}

#[test]
fn test_markdown_sink_follows_changes() {
    let h = harness();
    let (_cell, _host) = h.mount("m1", "markdown").unwrap();
    h.init("m1", "# Hi", 1);

    assert!(h.recorder.calls().contains(&Call::MarkdownCreated {
        cell: CellId::from("m1"),
        base_url: "/sessions/harness".to_string(),
    }));
    let sink = h.markdown.sink(&CellId::from("m1")).unwrap();
    assert_eq!(sink.content(), "# Hi");

    h.editor("m1").unwrap().edit("# Bye");
    assert_eq!(sink.content(), "# Bye");

    h.publish(CellsEvent::CellUpload { cell_id: CellId::from("m1"), url: "/u/p.png".to_string() });
    assert_eq!(sink.content(), "# Bye![](/u/p.png)");
}

#[test]
fn test_code_cell_has_no_markdown_sink() {
    let h = harness();
    let (_cell, _host) = h.mount("c1", "elixir").unwrap();
    h.init("c1", "", 1);
    assert!(h.markdown.sink(&CellId::from("c1")).is_none());
}

// =============================================================================
// Identity refresh and teardown
// =============================================================================

#[test]
fn test_refresh_identity_keeps_state() {
    let h = harness();
    let (cell, host) = h.mount("c1", "elixir").unwrap();
    h.init("c1", "", 1);
    h.focus("c1");
    h.insert_mode(true);

    host.set_attribute("session-path", "/sessions/renamed");
    cell.refresh_identity().unwrap();

    let snapshot = cell.snapshot();
    assert_eq!(snapshot.identity.session_path, "/sessions/renamed");
    assert_eq!(snapshot.focus, FocusState::Insert);
    assert!(snapshot.editor_ready);
    assert_eq!(h.editors.constructed(), 1);
}

#[test]
fn test_refresh_identity_error_keeps_previous() {
    let h = harness();
    let (cell, host) = h.mount("c1", "elixir").unwrap();
    host.remove_attribute("type");

    let err = cell.refresh_identity().unwrap_err();
    assert_eq!(err, CellError::MissingAttribute { name: "type".to_string() });
    assert!(!cell.snapshot().identity.cell_type.is_markdown());
}

#[test]
fn test_destroy_unsubscribes_and_disposes() {
    let h = harness();
    let (cell, _host) = h.mount("c1", "elixir").unwrap();
    h.init("c1", "", 1);
    let editor = h.editor("c1").unwrap();
    assert_eq!(cells_subscribers(&h), 1);

    cell.destroy();
    assert!(editor.is_disposed());
    assert!(cell.snapshot().destroyed);
    assert_eq!(cells_subscribers(&h), 0);

    h.recorder.clear();
    h.focus("c1");
    h.publish(CellsEvent::CellUpload { cell_id: CellId::from("c1"), url: "/u".to_string() });
    assert!(h.recorder.calls().is_empty());
    assert_eq!(cell.focus_state(), FocusState::Unfocused);
}

#[test]
fn test_destroy_twice_disposes_once() {
    let h = harness();
    let (cell, _host) = h.mount("c1", "elixir").unwrap();
    h.init("c1", "", 1);

    cell.destroy();
    cell.destroy();
    drop(cell);
    assert_eq!(h.recorder.count(|c| matches!(c, Call::EditorDisposed { .. })), 1);
}

#[test]
fn test_drop_destroys() {
    let h = harness();
    let (cell, _host) = h.mount("c1", "elixir").unwrap();
    h.init("c1", "", 1);
    let editor = h.editor("c1").unwrap();

    drop(cell);
    assert!(editor.is_disposed());
    assert_eq!(cells_subscribers(&h), 0);
}

#[test]
fn test_editor_callbacks_after_destroy_are_inert() {
    let h = harness();
    let (cell, _host) = h.mount("c1", "elixir").unwrap();
    h.init("c1", "", 1);
    h.focus("c1");
    h.insert_mode(true);
    let editor = h.editor("c1").unwrap();
    let published = h.published_selections().len();

    cell.destroy();
    editor.move_cursor(Selection::range(9, 9));
    editor.lose_focus();
    assert_eq!(h.published_selections().len(), published);
    assert!(!editor.is_focused());
}

#[test]
fn test_handler_may_mount_cells_reentrantly() {
    let h = Arc::new(harness());
    let cells = h.bus.topic::<CellsEvent>(TOPIC_CELLS).unwrap();
    let mounted = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let (h2, mounted2) = (Arc::clone(&h), Arc::clone(&mounted));
    let sub = cells.subscribe(move |event: &CellsEvent| {
        if let CellsEvent::CellMoved { cell_id } = event {
            let (cell, _) = h2.mount(cell_id.as_str(), "elixir").unwrap();
            mounted2.lock().push(cell);
        }
    });

    h.publish(CellsEvent::CellMoved { cell_id: CellId::from("late") });
    sub.unsubscribe();
    assert_eq!(mounted.lock().len(), 1);
    assert_eq!(h.server.pending_requests(), vec![CellId::from("late")]);
    mounted.lock().clear();
}
