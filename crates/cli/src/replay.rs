//! Replay driver: one harness session, a fixed set of mounted cells.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use serde::Serialize;

use cellsync_config::Settings;
use cellsync_engine::harness::{Call, FakeEditor, SessionHarness};
use cellsync_engine::CellController;
use cellsync_protocol::CellId;

use crate::script::{ScriptLine, Step};
use crate::ReplayError;

/// How results are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutput {
    Human,
    /// One JSON object per recorded call, then one summary object.
    Json,
}

/// A recorded call attributed to the script line that caused it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayRecord {
    pub line: usize,
    #[serde(flatten)]
    pub call: Call,
}

/// Final state after a replay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub steps: usize,
    pub calls: usize,
    /// Focus state of every still-mounted cell.
    pub cells: BTreeMap<String, &'static str>,
}

pub struct Replay {
    harness: SessionHarness,
    cells: BTreeMap<CellId, CellController>,
    steps: usize,
    calls: usize,
}

impl Replay {
    /// Mount `cells` as code cells and `markdown` as markdown cells.
    /// An id given in both lists is a markdown cell; an id repeated within
    /// one list is rejected. Mount-time calls (init requests) are discarded.
    pub fn new(settings: Settings, cells: &[String], markdown: &[String]) -> Result<Self, ReplayError> {
        let harness = SessionHarness::with_settings(settings)?;
        let mut mounted = BTreeMap::new();

        let code = cells.iter().filter(|id| !markdown.contains(id)).map(|id| (id, "elixir"));
        let docs = markdown.iter().map(|id| (id, "markdown"));
        for (id, cell_type) in code.chain(docs) {
            let cell = CellId::from(id.as_str());
            if mounted.contains_key(&cell) {
                return Err(ReplayError::DuplicateCell { cell });
            }
            let (controller, _host) = harness.mount(id, cell_type)?;
            mounted.insert(cell, controller);
        }
        log::info!("Mounted {} cell(s)", mounted.len());
        harness.recorder.clear();

        Ok(Self {
            harness,
            cells: mounted,
            steps: 0,
            calls: 0,
        })
    }

    /// Apply one step and return the calls it caused, in order.
    pub fn step(&mut self, line: &ScriptLine) -> Result<Vec<Call>, ReplayError> {
        let h = &self.harness;
        match &line.step {
            Step::Cells { cells } => h.publish(cells.clone()),
            Step::Init { init, source, revision } => {
                self.require_mounted(line.line, init)?;
                if !h.init(init.as_str(), source, *revision) {
                    log::warn!("line {}: no pending init request for {}", line.line, init);
                }
            }
            Step::Editor { editor, selection } => {
                self.editor(line.line, editor)?.move_cursor(selection.clone());
            }
            Step::Blur { blur } => {
                self.editor(line.line, blur)?.lose_focus();
            }
            Step::Flush { .. } => {
                let ran = h.platform.run_pending();
                log::debug!("line {}: ran {} deferred task(s)", line.line, ran);
            }
            Step::Unmount { unmount } => match self.cells.remove(unmount) {
                Some(controller) => controller.destroy(),
                None => {
                    return Err(ReplayError::UnknownCell {
                        line: line.line,
                        cell: unmount.clone(),
                    })
                }
            },
        }

        let calls = self.harness.recorder.take();
        self.steps += 1;
        self.calls += calls.len();
        Ok(calls)
    }

    /// Apply every step, writing calls to `out` as they happen.
    pub fn run<W: Write>(
        &mut self,
        script: &[ScriptLine],
        output: ReplayOutput,
        out: &mut W,
    ) -> Result<ReplaySummary, ReplayError> {
        for line in script {
            let calls = self.step(line)?;
            match output {
                ReplayOutput::Human => {
                    writeln!(out, "[{}] {}", line.line, line.step.label())?;
                    for call in &calls {
                        writeln!(out, "    {}", describe(call))?;
                    }
                }
                ReplayOutput::Json => {
                    for call in calls {
                        let record = ReplayRecord { line: line.line, call };
                        writeln!(out, "{}", to_json(&record))?;
                    }
                }
            }
        }

        let summary = self.summary();
        match output {
            ReplayOutput::Human => {
                writeln!(out, "{} step(s), {} call(s)", summary.steps, summary.calls)?;
                for (cell, state) in &summary.cells {
                    writeln!(out, "  {}: {}", cell, state)?;
                }
            }
            ReplayOutput::Json => writeln!(out, "{}", to_json(&summary))?,
        }
        Ok(summary)
    }

    pub fn summary(&self) -> ReplaySummary {
        ReplaySummary {
            steps: self.steps,
            calls: self.calls,
            cells: self
                .cells
                .iter()
                .map(|(id, controller)| (id.to_string(), controller.focus_state().name()))
                .collect(),
        }
    }

    fn require_mounted(&self, line: usize, cell: &CellId) -> Result<(), ReplayError> {
        if self.cells.contains_key(cell) {
            Ok(())
        } else {
            Err(ReplayError::UnknownCell { line, cell: cell.clone() })
        }
    }

    fn editor(&self, line: usize, cell: &CellId) -> Result<Arc<FakeEditor>, ReplayError> {
        self.require_mounted(line, cell)?;
        self.harness
            .editors
            .editor(cell)
            .ok_or_else(|| ReplayError::NoEditor { line, cell: cell.clone() })
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    // Records hold only strings, numbers and JSON values
    serde_json::to_string(value).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
}

fn describe(call: &Call) -> String {
    match call {
        Call::InitRequested { cell } => format!("init requested by {}", cell),
        Call::FocusMarker { cell, focused } => {
            format!("{} focus marker {}", cell, if *focused { "on" } else { "off" })
        }
        Call::ScrollCell { cell } => format!("{} scrolled into view", cell),
        Call::TaskDeferred => "task deferred".to_string(),
        Call::ScrollActiveElement => "active element scrolled into view".to_string(),
        Call::EditorConstructed { cell, source, revision } => {
            format!("{} editor constructed at revision {} ({} bytes)", cell, revision.0, source.len())
        }
        Call::EditorDisposed { cell } => format!("{} editor disposed", cell),
        Call::EditorFocused { cell } => format!("{} editor focused", cell),
        Call::EditorBlurred { cell } => format!("{} editor blurred", cell),
        Call::EditorInserted { cell, text } => format!("{} editor inserted {:?}", cell, text),
        Call::OverlayUpdated { cell, client, selection } => {
            format!("{} overlay for {} at {}", cell, client, selection.as_value())
        }
        Call::OverlayRemoved { cell, client } => format!("{} overlay for {} removed", cell, client),
        Call::MarkdownCreated { cell, base_url } => {
            format!("{} markdown renderer created (base {})", cell, base_url)
        }
        Call::MarkdownRendered { cell, source } => {
            format!("{} markdown rendered ({} bytes)", cell, source.len())
        }
        Call::SelectionPublished { cell, selection } => {
            format!("session <- {} selection {}", cell, selection.as_value())
        }
    }
}
