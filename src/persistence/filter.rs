//! Species visibility filter for presentation reads.

use std::collections::HashSet;

use crate::domain::SpeciesId;

/// Ignore/only lists applied to active encounters.
///
/// Entries match either the numeric species id or the lower-cased species
/// name. When `only` is non-empty, everything not listed is hidden.
#[derive(Debug, Clone, Default)]
pub struct SpeciesFilter {
    ignore: HashSet<String>,
    only: HashSet<String>,
}

impl SpeciesFilter {
    /// Builds a filter from raw ignore and only lists.
    #[must_use]
    pub fn new<I, O>(ignore: I, only: O) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        O: IntoIterator,
        O::Item: AsRef<str>,
    {
        let normalize = |s: &str| s.trim().to_lowercase();
        Self {
            ignore: ignore.into_iter().map(|s| normalize(s.as_ref())).collect(),
            only: only.into_iter().map(|s| normalize(s.as_ref())).collect(),
        }
    }

    /// Returns `true` if an encounter of this species should be shown.
    #[must_use]
    pub fn admits(&self, id: SpeciesId, name: &str) -> bool {
        let id = id.to_string();
        let name = name.to_lowercase();
        let listed = |set: &HashSet<String>| set.contains(&id) || set.contains(&name);
        if listed(&self.ignore) {
            return false;
        }
        self.only.is_empty() || listed(&self.only)
    }
}
