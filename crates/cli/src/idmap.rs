//! Parsing of uid/gid mapping specifications.

use std::sync::Arc;

use engine::IdMap;

use crate::error::CliError;

/// Returns the mapping function for a `--uid-map`/`--gid-map` spec.
///
/// `id` maps every id to itself; `current` maps every id to `-1`,
/// which backends interpret as the current user or group.
pub fn parse_id_map(spec: &str) -> Result<IdMap, CliError> {
    match spec {
        "id" => Ok(Arc::new(|id| id)),
        "current" => Ok(Arc::new(|_| -1)),
        other => Err(CliError::Spec(format!("unknown id mapping: {other}"))),
    }
}
