//! Operator notification profile: who gets alerted, and about what.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::domain::SpeciesId;
use crate::error::ScanError;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SpeciesRef {
    Id(SpeciesId),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RawProfile {
    #[serde(default)]
    emails: Vec<String>,
    #[serde(default)]
    interested_pokemons: Vec<SpeciesRef>,
}

/// Species the operator wants alerts for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterestSet(HashSet<SpeciesId>);

impl InterestSet {
    /// Returns `true` if alerts are wanted for this species.
    #[must_use]
    pub fn contains(&self, id: SpeciesId) -> bool {
        self.0.contains(&id)
    }

    /// Number of species of interest.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no species are of interest.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<SpeciesId> for InterestSet {
    fn from_iter<T: IntoIterator<Item = SpeciesId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Alert recipients and species of interest, loaded from `profile.json`.
#[derive(Debug, Clone)]
pub struct Profile {
    /// Fixed recipient list for alert emails.
    pub emails: Vec<String>,
    /// Species that trigger an alert.
    pub interested: InterestSet,
}

impl Profile {
    /// Parses a profile document.
    ///
    /// Interested species may be given as numbers or numeric strings.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Config`] if the document is malformed, either
    /// list is empty, or a species entry is not numeric.
    pub fn from_json(json: &str) -> Result<Self, ScanError> {
        let raw: RawProfile = serde_json::from_str(json)
            .map_err(|e| ScanError::Config(format!("malformed profile: {e}")))?;

        if raw.emails.is_empty() {
            return Err(ScanError::Config("no notification emails in profile".to_string()));
        }
        if raw.interested_pokemons.is_empty() {
            return Err(ScanError::Config("no interested species in profile".to_string()));
        }

        let interested = raw
            .interested_pokemons
            .into_iter()
            .map(|r| match r {
                SpeciesRef::Id(id) => Ok(id),
                SpeciesRef::Text(s) => s
                    .trim()
                    .parse()
                    .map_err(|_| ScanError::Config(format!("invalid species id in profile: {s:?}"))),
            })
            .collect::<Result<InterestSet, _>>()?;

        Ok(Self {
            emails: raw.emails,
            interested,
        })
    }

    /// Reads and parses the profile at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Config`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ScanError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ScanError::Config(format!("reading profile {}: {e}", path.display())))?;
        Self::from_json(&json)
    }
}
