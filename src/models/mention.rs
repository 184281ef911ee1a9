use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::models::character::Importance;

/// Gender as guessed by extraction.
///
/// Deserialization is lenient: extractor output varies in spelling, and any
/// unrecognized value becomes `Unknown` rather than failing the chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum Gender {
    Male,
    Female,
    Nonbinary,
    Neutral,
    #[default]
    Unknown,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Nonbinary => "nonbinary",
            Gender::Neutral => "neutral",
            Gender::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Gender::Unknown)
    }
}

impl From<String> for Gender {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "male" | "m" | "man" | "boy" => Gender::Male,
            "female" | "f" | "woman" | "girl" => Gender::Female,
            "nonbinary" | "non-binary" | "non_binary" | "nb" | "enby" => Gender::Nonbinary,
            "neutral" | "none" | "n/a" => Gender::Neutral,
            _ => Gender::Unknown,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pronoun set keyed by grammatical role ("subject", "object", "possessive", ...).
pub type Pronouns = BTreeMap<String, String>;

/// One character observation extracted from a single text chunk.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMention {
    pub name: String,
    #[serde(default, alias = "gender")]
    pub gender_guess: Gender,
    #[serde(default)]
    pub pronouns: Pronouns,
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source_chunk: usize,
    /// Importance as judged by the extractor, when it offered one.
    #[serde(default)]
    pub importance: Option<Importance>,
}

impl RawMention {
    /// Create a bare mention with only a name and chunk index.
    pub fn new(name: impl Into<String>, source_chunk: usize) -> Self {
        Self {
            name: name.into(),
            gender_guess: Gender::Unknown,
            pronouns: Pronouns::new(),
            aliases: BTreeSet::new(),
            description: String::new(),
            source_chunk,
            importance: None,
        }
    }

    pub fn with_gender(mut self, gender: Gender) -> Self {
        self.gender_guess = gender;
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn with_pronoun(mut self, role: impl Into<String>, pronoun: impl Into<String>) -> Self {
        self.pronouns.insert(role.into(), pronoun.into());
        self
    }
}
