use serendipity_protocol::RowIndex;
use std::collections::HashSet;

/// Row indices already consumed by an accepted path.
///
/// Owned by exactly one scheduler and passed by value through each step;
/// it only ever grows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    rows: HashSet<RowIndex>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, row: RowIndex) -> bool {
        self.rows.contains(&row)
    }

    /// Returns the set with `rows` added.
    #[must_use]
    pub fn extended(mut self, rows: impl IntoIterator<Item = RowIndex>) -> Self {
        self.rows.extend(rows);
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_superset(&self, other: &ExclusionSet) -> bool {
        self.rows.is_superset(&other.rows)
    }

    /// Sorted copy of the consumed rows.
    pub fn to_sorted_vec(&self) -> Vec<RowIndex> {
        let mut rows: Vec<RowIndex> = self.rows.iter().copied().collect();
        rows.sort_unstable();
        rows
    }
}
