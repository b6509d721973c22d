//! Replay script format.
//!
//! One JSON object per line, blank lines and `//` comments skipped:
//!
//! ```text
//! {"cells": {"type": "cell_focused", "cellId": "c1"}}
//! {"init": "c1", "source": "IO.puts(1)", "revision": 3}
//! {"editor": "c1", "selection": {"from": 0, "to": 4}}
//! {"blur": "c1"}
//! {"flush": true}
//! {"unmount": "c1"}
//! ```
//!
//! Parsing is strict. A line that matches no step, including a `cells` event
//! with a known `type` but missing or mistyped fields, fails the whole script
//! with its line number. Only an unrecognised `type` is accepted: it decodes to
//! `CellsEvent::Unknown` and every cell ignores it.

use serde::Deserialize;

use cellsync_protocol::{CellId, CellsEvent, Selection};

use crate::ReplayError;

/// One script instruction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Step {
    /// Publish an event on the `cells` topic.
    Cells { cells: CellsEvent },
    /// Answer the cell's pending `cell_init` request.
    Init {
        init: CellId,
        #[serde(default)]
        source: String,
        #[serde(default)]
        revision: u64,
    },
    /// Move the local cursor in the cell's editor.
    Editor { editor: CellId, selection: Selection },
    /// The cell's editor loses platform focus.
    Blur { blur: CellId },
    /// Run deferred platform tasks.
    Flush { flush: bool },
    /// Destroy the cell.
    Unmount { unmount: CellId },
}

impl Step {
    /// Short label for human output.
    pub fn label(&self) -> String {
        match self {
            Step::Cells { cells } => format!("cells {}", cells.kind()),
            Step::Init { init, revision, .. } => format!("init {} @{}", init, revision),
            Step::Editor { editor, .. } => format!("cursor {}", editor),
            Step::Blur { blur } => format!("blur {}", blur),
            Step::Flush { .. } => "flush".to_string(),
            Step::Unmount { unmount } => format!("unmount {}", unmount),
        }
    }
}

/// A step with its 1-based script line.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptLine {
    pub line: usize,
    pub step: Step,
}

/// Parse a whole script. Fails on the first malformed line.
pub fn parse_script(contents: &str) -> Result<Vec<ScriptLine>, ReplayError> {
    let mut steps = Vec::new();
    for (index, raw) in contents.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        let step = serde_json::from_str(trimmed).map_err(|source| ReplayError::Parse {
            line: index + 1,
            source,
        })?;
        steps.push(ScriptLine { line: index + 1, step });
    }
    Ok(steps)
}
