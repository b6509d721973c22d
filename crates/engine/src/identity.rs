//! Cell identity read from the host element.
//!
//! Attributes are the source of truth: identity is read on mount and again on
//! every host re-render.

use cellsync_config::AttributeNames;
use cellsync_protocol::{CellId, CellType};

use crate::error::CellError;
use crate::host::CellHost;

/// Identity of one mounted cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellIdentity {
    pub cell_id: CellId,
    pub cell_type: CellType,
    /// Base path used by the markdown renderer. Not interpreted here.
    pub session_path: String,
}

impl CellIdentity {
    /// Read identity from host attributes. Fails on the first missing attribute.
    pub fn read(host: &dyn CellHost, names: &AttributeNames) -> Result<Self, CellError> {
        let cell_id = required(host, &names.cell_id)?;
        if cell_id.trim().is_empty() {
            return Err(CellError::EmptyAttribute { name: names.cell_id.clone() });
        }

        let raw_type = required(host, &names.cell_type)?;
        let cell_type = CellType::parse(&raw_type)
            .ok_or_else(|| CellError::EmptyAttribute { name: names.cell_type.clone() })?;

        let session_path = required(host, &names.session_path)?;

        Ok(Self {
            cell_id: CellId::from(cell_id),
            cell_type,
            session_path,
        })
    }
}

fn required(host: &dyn CellHost, name: &str) -> Result<String, CellError> {
    host.attribute(name)
        .ok_or_else(|| CellError::MissingAttribute { name: name.to_string() })
}
