//! Headless replay of cell session scripts.
//!
//! Mounts a set of cells against in-memory collaborators, feeds them a
//! script of bus events and simulated user input, and reports every call the
//! cells made to the outside world.

pub mod replay;
pub mod script;

use std::path::PathBuf;

use cellsync_config::SettingsError;
use cellsync_engine::CellError;
use cellsync_protocol::CellId;

pub use replay::{Replay, ReplayOutput, ReplayRecord, ReplaySummary};
pub use script::{parse_script, ScriptLine, Step};

/// Replay failures. All of them map to exit code 1.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("cannot read script {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("line {line}: invalid step: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },
    #[error("cell '{cell}' listed more than once")]
    DuplicateCell { cell: CellId },
    #[error("line {line}: cell '{cell}' is not mounted")]
    UnknownCell { line: usize, cell: CellId },
    #[error("line {line}: cell '{cell}' has no editor yet")]
    NoEditor { line: usize, cell: CellId },
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Cell(#[from] CellError),
    #[error("cannot write output: {0}")]
    Output(#[from] std::io::Error),
}
