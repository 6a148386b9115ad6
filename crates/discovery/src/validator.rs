use crate::config::DuplicatePolicy;
use crate::error::{DiscoveryError, Result};
use crate::work::RowTable;
use serendipity_protocol::{MatchGroupId, PathRecord, ResolvedPath, RowIndex};
use std::collections::HashSet;

/// Enforce one claim per row index across a match group's paths.
///
/// Paths are scanned in emission order, partitions in the order common,
/// current-unique, peer-unique; the first claim wins. Returns the number
/// of removed occurrences.
pub fn deduplicate(
    match_group_id: MatchGroupId,
    paths: &mut [PathRecord],
    policy: DuplicatePolicy,
) -> Result<usize> {
    let mut seen: HashSet<RowIndex> = HashSet::new();
    let mut removed: Vec<RowIndex> = Vec::new();

    for path in paths.iter_mut() {
        let indices = &mut path.indices;
        for list in [
            &mut indices.common,
            &mut indices.unique_current,
            &mut indices.unique_peer,
        ] {
            list.retain(|row| {
                if seen.insert(*row) {
                    true
                } else {
                    removed.push(*row);
                    false
                }
            });
        }
    }

    if removed.is_empty() {
        log::debug!("Match group {match_group_id}: no duplicate indices");
        return Ok(0);
    }

    match policy {
        DuplicatePolicy::Fail => Err(DiscoveryError::integrity(
            match_group_id,
            format!("row indices claimed more than once: {removed:?}"),
        )),
        DuplicatePolicy::DropLater => {
            log::warn!(
                "Match group {match_group_id}: removed {} duplicate indices {removed:?}",
                removed.len()
            );
            Ok(removed.len())
        }
    }
}

/// Replace row indices with stable item ids.
pub fn remap(path: PathRecord, table: &RowTable) -> Result<ResolvedPath> {
    let resolve = |rows: &[RowIndex]| -> Result<Vec<String>> {
        let ids = rows
            .iter()
            .map(|&row| {
                table.resolve(row).map(str::to_string).ok_or_else(|| {
                    DiscoveryError::integrity(
                        path.match_group_id,
                        format!("row index {row} has no item id"),
                    )
                })
            })
            .collect::<Result<Vec<String>>>()?;
        if ids.len() != rows.len() {
            return Err(DiscoveryError::integrity(
                path.match_group_id,
                format!("remapped {} of {} indices", ids.len(), rows.len()),
            ));
        }
        Ok(ids)
    };

    let common_ids = resolve(&path.indices.common)?;
    let current_ids = resolve(&path.indices.unique_current)?;
    let peer_ids = resolve(&path.indices.unique_peer)?;

    Ok(ResolvedPath {
        current_path_length: current_ids.len() + common_ids.len(),
        peer_path_length: peer_ids.len() + common_ids.len(),
        common_ids,
        current_ids,
        peer_ids,
        record: path,
    })
}

/// Deduplicate then remap one match group's paths.
pub fn finalize(
    match_group_id: MatchGroupId,
    mut paths: Vec<PathRecord>,
    table: &RowTable,
    policy: DuplicatePolicy,
) -> Result<(Vec<ResolvedPath>, usize)> {
    let removed = deduplicate(match_group_id, &mut paths, policy)?;
    let resolved = paths
        .into_iter()
        .map(|path| remap(path, table))
        .collect::<Result<Vec<_>>>()?;
    Ok((resolved, removed))
}
