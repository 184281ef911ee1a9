use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::mention::{Gender, Pronouns, RawMention};
use crate::services::normalize::NameNormalizer;

/// Narrative weight of a character. Ordered `Minor < Supporting < Main`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum Importance {
    #[default]
    Minor,
    Supporting,
    Main,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::Minor => "minor",
            Importance::Supporting => "supporting",
            Importance::Main => "main",
        }
    }
}

impl From<String> for Importance {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "main" | "major" | "primary" | "protagonist" | "lead" => Importance::Main,
            "supporting" | "secondary" | "recurring" => Importance::Supporting,
            _ => Importance::Minor,
        }
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical, deduplicated character identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub pronouns: Pronouns,
    /// Other surface forms. Never contains `name` itself.
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub importance: Importance,
    pub confidence: f64,
    /// Chunks this identity was observed in.
    #[serde(default)]
    pub source_chunks: BTreeSet<usize>,
}

impl Character {
    /// Build a character directly from a single mention.
    pub fn from_mention(mention: &RawMention, confidence: f64) -> Self {
        let mut character = Self {
            name: mention.name.trim().to_string(),
            gender: mention.gender_guess,
            pronouns: mention.pronouns.clone(),
            aliases: mention
                .aliases
                .iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
            description: mention.description.trim().to_string(),
            importance: mention.importance.unwrap_or_default(),
            confidence,
            source_chunks: BTreeSet::from([mention.source_chunk]),
        };
        character.enforce_alias_invariant();
        character
    }

    /// Canonical name followed by every alias.
    pub fn all_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    /// Whether `query` names this character, ignoring case, honorifics and punctuation.
    pub fn matches_name(&self, query: &str) -> bool {
        let normalizer = NameNormalizer::default();
        let wanted = normalizer.normalize(query);
        if wanted.is_empty() {
            return false;
        }
        self.all_names()
            .any(|name| name.eq_ignore_ascii_case(query.trim()) || normalizer.normalize(name) == wanted)
    }

    /// Re-express this character as a mention so an incremental pass can
    /// compare new observations against it.
    pub fn to_seed_mention(&self) -> RawMention {
        RawMention {
            name: self.name.clone(),
            gender_guess: self.gender,
            pronouns: self.pronouns.clone(),
            aliases: self.aliases.clone(),
            description: self.description.clone(),
            source_chunk: self.source_chunks.first().copied().unwrap_or_default(),
            importance: Some(self.importance),
        }
    }

    /// Remove the canonical name (and blanks) from the alias set.
    ///
    /// Returns `true` when a correction was necessary.
    pub fn enforce_alias_invariant(&mut self) -> bool {
        let before = self.aliases.len();
        let name = self.name.clone();
        self.aliases
            .retain(|alias| !alias.trim().is_empty() && !alias.trim().eq_ignore_ascii_case(&name));
        before != self.aliases.len()
    }
}

/// Aggregate counts written alongside the character list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryMetadata {
    pub total: usize,
    pub by_gender: BTreeMap<String, usize>,
    pub by_importance: BTreeMap<String, usize>,
    pub generated_at: DateTime<Utc>,
}

impl RegistryMetadata {
    pub fn from_characters(characters: &[Character]) -> Self {
        let mut by_gender = BTreeMap::new();
        let mut by_importance = BTreeMap::new();
        for character in characters {
            *by_gender
                .entry(character.gender.as_str().to_string())
                .or_insert(0) += 1;
            *by_importance
                .entry(character.importance.as_str().to_string())
                .or_insert(0) += 1;
        }
        Self {
            total: characters.len(),
            by_gender,
            by_importance,
            generated_at: Utc::now(),
        }
    }
}

/// Persisted output of a resolution run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub characters: Vec<Character>,
    pub metadata: RegistryMetadata,
}

impl RegistryRecord {
    pub fn new(characters: Vec<Character>) -> Self {
        let metadata = RegistryMetadata::from_characters(&characters);
        Self {
            characters,
            metadata,
        }
    }
}
