//! Cell Session Protocol: bus topics and server round-trip
//!
//! This crate defines the canonical payload types exchanged by cell controllers:
//!
//! - `cells` topic: focus, insert mode, moves, uploads and remote location reports.
//!   One topic is shared by every cell in a session; each cell filters by its own id.
//! - `session` topic: local cursor/selection broadcasts consumed by peers.
//! - `cell_init` request/response with the server.
//!
//! Field names on the wire are camelCase (`cellId`), tags are snake_case.
//!
//! # Usage
//!
//! ```ignore
//! use cellsync_protocol::{CellsEvent, CellId};
//!
//! let event: CellsEvent = serde_json::from_str(r#"{"type":"cell_focused","cellId":"c1"}"#)?;
//! assert_eq!(event, CellsEvent::CellFocused { cell_id: CellId::from("c1") });
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Topic carrying [`CellsEvent`]s.
pub const TOPIC_CELLS: &str = "cells";

/// Topic carrying [`SessionEvent`]s.
pub const TOPIC_SESSION: &str = "session";

/// Server event name for the initialization request.
pub const CELL_INIT: &str = "cell_init";

// =============================================================================
// Identities
// =============================================================================

/// Identity of a cell within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(String);

impl CellId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CellId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CellId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a remote client whose cursor is shown as an overlay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of cell, read from the host `type` attribute.
///
/// Hosts name code cells by their language (e.g. `elixir`), so every
/// non-markdown value is a code cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellType {
    Markdown,
    Code { language: String },
}

impl CellType {
    /// Parse an attribute value. Returns None for an empty value.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "" => None,
            "markdown" => Some(CellType::Markdown),
            language => Some(CellType::Code { language: language.to_string() }),
        }
    }

    pub fn is_markdown(&self) -> bool {
        matches!(self, CellType::Markdown)
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellType::Markdown => f.write_str("markdown"),
            CellType::Code { language } => f.write_str(language),
        }
    }
}

// =============================================================================
// Editor-owned values
// =============================================================================

/// A cursor/selection as reported by the editor widget.
///
/// Opaque to this crate: it is passed between the editor and peers unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection(serde_json::Value);

impl Selection {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// A plain `{from, to}` range.
    pub fn range(from: u64, to: u64) -> Self {
        Self(serde_json::json!({ "from": from, "to": to }))
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Opaque revision token owned by the editor's own sync protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub u64);

// =============================================================================
// Server round-trip
// =============================================================================

/// Initialization request sent once per mounted cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitRequest {
    pub cell_id: CellId,
}

/// Server reply to [`InitRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitPayload {
    pub source: String,
    pub revision: Revision,
}

// =============================================================================
// `cells` topic
// =============================================================================

/// Events shared by all cells of a session.
///
/// Unrecognized tags decode to [`CellsEvent::Unknown`] and are ignored by consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CellsEvent {
    CellFocused {
        #[serde(rename = "cellId")]
        cell_id: CellId,
    },
    InsertModeChanged {
        enabled: bool,
    },
    CellMoved {
        #[serde(rename = "cellId")]
        cell_id: CellId,
    },
    CellUpload {
        #[serde(rename = "cellId")]
        cell_id: CellId,
        url: String,
    },
    LocationReport {
        client: ClientId,
        report: LocationReport,
    },
    #[serde(other)]
    Unknown,
}

impl CellsEvent {
    /// Wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            CellsEvent::CellFocused { .. } => "cell_focused",
            CellsEvent::InsertModeChanged { .. } => "insert_mode_changed",
            CellsEvent::CellMoved { .. } => "cell_moved",
            CellsEvent::CellUpload { .. } => "cell_upload",
            CellsEvent::LocationReport { .. } => "location_report",
            CellsEvent::Unknown => "unknown",
        }
    }
}

/// Where a remote client's cursor currently is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationReport {
    #[serde(rename = "cellId")]
    pub cell_id: CellId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Selection>,
}

// =============================================================================
// `session` topic
// =============================================================================

/// Events published by a cell for the rest of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    CursorSelectionChanged {
        #[serde(rename = "cellId")]
        cell_id: CellId,
        selection: Selection,
    },
    #[serde(other)]
    Unknown,
}

// =============================================================================
// Content helpers
// =============================================================================

/// Markdown embed reference inserted into a cell after an upload.
pub fn embed_markdown(url: &str) -> String {
    format!("![]({url})")
}
