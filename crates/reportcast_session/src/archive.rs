//! Report archive layout.
//!
//! ```text
//! reports/<session-id>/manifest.json   {"name": ..., "local_id": ..., "nDeltas": N}
//! reports/<session-id>/<index>.delta   raw bytes of delta <index>, 0..N
//! ```

use bytes::Bytes;
use reportcast_core::{CoreResult, LocalId, SessionId};
use reportcast_log::Delta;
use serde::{Deserialize, Serialize};

/// One file of an exported report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Relative path
    pub path: String,
    /// File content
    pub content: Bytes,
}

/// Manifest describing an exported report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Display name of the report
    pub name: String,
    /// Identifier of the exporting process
    pub local_id: String,
    /// Number of delta files
    #[serde(rename = "nDeltas")]
    pub n_deltas: usize,
}

/// Directory holding a session's files
#[must_use]
pub fn report_dir(id: &SessionId) -> String {
    format!("reports/{}", id)
}

/// Build the entries for a report, manifest first, deltas in log order
///
/// # Errors
///
/// Returns error if the manifest cannot be encoded
pub fn build_entries(
    id: &SessionId,
    name: &str,
    local_id: LocalId,
    deltas: Vec<Delta>,
) -> CoreResult<Vec<ArchiveEntry>> {
    let dir = report_dir(id);
    let manifest = Manifest {
        name: name.to_string(),
        local_id: local_id.to_string(),
        n_deltas: deltas.len(),
    };

    let mut entries = Vec::with_capacity(deltas.len() + 1);
    entries.push(ArchiveEntry {
        path: format!("{}/manifest.json", dir),
        content: Bytes::from(serde_json::to_vec(&manifest)?),
    });
    entries.extend(deltas.into_iter().enumerate().map(|(index, delta)| ArchiveEntry {
        path: format!("{}/{}.delta", dir, index),
        content: delta.payload(),
    }));
    Ok(entries)
}
