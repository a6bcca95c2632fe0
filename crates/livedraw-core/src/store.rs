// Append-only accumulator of revealed draw results.

use std::collections::HashSet;

use tracing::debug;

use crate::model::{CreatorId, Division, DrawResult};

/// Draw results revealed during one session, in reveal order.
///
/// Each creator appears at most once. Entries are never removed or
/// reordered, so both the sequencer and the reconciliation poller can merge
/// into the same store in any interleaving.
#[derive(Debug, Clone, Default)]
pub struct DrawResultStore {
    results: Vec<DrawResult>,
    seen: HashSet<CreatorId>,
}

impl DrawResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a result. Returns `false` (and changes nothing) if the creator
    /// already has a result.
    pub fn append(&mut self, result: DrawResult) -> bool {
        if !self.seen.insert(result.creator.id) {
            debug!(creator_id = result.creator.id, "ignoring duplicate draw result");
            return false;
        }
        self.results.push(result);
        true
    }

    /// Merge an authoritative result list.
    ///
    /// Results already in the store keep their position; unseen ones are
    /// appended in the order given. Returns how many were added.
    pub fn replace_all<I>(&mut self, results: I) -> usize
    where
        I: IntoIterator<Item = DrawResult>,
    {
        results
            .into_iter()
            .map(|r| self.append(r))
            .filter(|added| *added)
            .count()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DrawResult> {
        self.results.iter()
    }

    /// Group results by division, in the order of `divisions`.
    ///
    /// The returned iterator is lazy and can be cloned to walk the grouping
    /// again. Results whose division is not listed are skipped.
    pub fn group_by_division<'a>(
        &'a self,
        divisions: &'a [Division],
    ) -> impl Iterator<Item = DivisionGroup<'a>> + Clone + 'a {
        divisions.iter().map(move |division| DivisionGroup {
            division,
            results: self
                .results
                .iter()
                .filter(|r| r.division.id == division.id)
                .collect(),
        })
    }
}

impl<'a> IntoIterator for &'a DrawResultStore {
    type Item = &'a DrawResult;
    type IntoIter = std::slice::Iter<'a, DrawResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

/// The results assigned to one division.
#[derive(Debug, Clone)]
pub struct DivisionGroup<'a> {
    pub division: &'a Division,
    pub results: Vec<&'a DrawResult>,
}

impl DivisionGroup<'_> {
    pub fn assigned(&self) -> usize {
        self.results.len()
    }
}
