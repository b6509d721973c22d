use cellsync_bus::BusError;

/// Errors raised while mounting or refreshing a cell.
///
/// These are configuration errors: a cell without a complete identity must
/// not exist. Protocol races (unknown events, guard violations) are never
/// errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CellError {
    /// Required host attribute is absent.
    #[error("cell element is missing required attribute '{name}'")]
    MissingAttribute { name: String },
    /// Required host attribute is present but blank.
    #[error("cell element attribute '{name}' is empty")]
    EmptyAttribute { name: String },
    /// Bus topic could not be opened with the expected payload type.
    #[error(transparent)]
    Bus(#[from] BusError),
}
