//! Species localization: display names, rarity and types.
//!
//! The species catalog (`pokemon.min.json`) is keyed by species id and
//! written in English. For any other locale, words are passed through a
//! `<locale>.min.json` dictionary; untranslated words fall back to English.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::domain::SpeciesId;

/// One elemental type of a species.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesType {
    /// Localized type name.
    #[serde(rename = "type")]
    pub name: String,
    /// Display color (CSS hex).
    pub color: String,
}

/// Locale-fixed species lookups.
pub trait SpeciesLocalizer: Send + Sync + fmt::Debug {
    /// Localized display name.
    fn name(&self, id: SpeciesId) -> String;
    /// Localized rarity label.
    fn rarity(&self, id: SpeciesId) -> String;
    /// Localized types in catalog order.
    fn types(&self, id: SpeciesId) -> Vec<SpeciesType>;
}

#[derive(Debug, Clone, Deserialize)]
struct SpeciesEntry {
    name: String,
    #[serde(default)]
    rarity: String,
    #[serde(default)]
    types: Vec<SpeciesType>,
}

/// Catalog + dictionary backed [`SpeciesLocalizer`].
///
/// Unknown species resolve to `"#<id>"` with an empty rarity and no types.
#[derive(Debug, Clone, Default)]
pub struct JsonLocalizer {
    species: HashMap<SpeciesId, SpeciesEntry>,
    dictionary: HashMap<String, String>,
}

impl JsonLocalizer {
    /// Builds a localizer from catalog JSON and an optional dictionary JSON.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if either document is malformed.
    pub fn from_json(catalog: &str, dictionary: Option<&str>) -> Result<Self, serde_json::Error> {
        let raw: HashMap<String, SpeciesEntry> = serde_json::from_str(catalog)?;
        let species = raw
            .into_iter()
            .filter_map(|(key, entry)| key.parse::<SpeciesId>().ok().map(|id| (id, entry)))
            .collect();
        let dictionary = match dictionary {
            Some(json) => serde_json::from_str(json)?,
            None => HashMap::new(),
        };
        Ok(Self {
            species,
            dictionary,
        })
    }

    /// Loads the catalog at `catalog_path` and, for non-English locales,
    /// `<locales_dir>/<locale>.min.json`.
    ///
    /// A missing dictionary file is not fatal: a warning is logged and
    /// names stay untranslated.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read or either file is
    /// malformed.
    pub fn load(catalog_path: &Path, locales_dir: &Path, locale: &str) -> anyhow::Result<Self> {
        let catalog = std::fs::read_to_string(catalog_path)
            .with_context(|| format!("reading species catalog {}", catalog_path.display()))?;

        let dictionary = if locale == "en" {
            None
        } else {
            let path = locales_dir.join(format!("{locale}.min.json"));
            match std::fs::read_to_string(&path) {
                Ok(json) => Some(json),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping translations");
                    None
                }
            }
        };

        Self::from_json(&catalog, dictionary.as_deref())
            .with_context(|| format!("parsing localization for locale {locale}"))
    }

    fn translate(&self, word: &str) -> String {
        self.dictionary
            .get(word)
            .cloned()
            .unwrap_or_else(|| word.to_string())
    }
}

impl SpeciesLocalizer for JsonLocalizer {
    fn name(&self, id: SpeciesId) -> String {
        self.species
            .get(&id)
            .map_or_else(|| format!("#{id}"), |s| self.translate(&s.name))
    }

    fn rarity(&self, id: SpeciesId) -> String {
        self.species
            .get(&id)
            .map(|s| self.translate(&s.rarity))
            .unwrap_or_default()
    }

    fn types(&self, id: SpeciesId) -> Vec<SpeciesType> {
        self.species
            .get(&id)
            .map(|s| {
                s.types
                    .iter()
                    .map(|t| SpeciesType {
                        name: self.translate(&t.name),
                        color: t.color.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
