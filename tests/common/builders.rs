//! Fluent builders for test fixtures.
//!
//! Keep test setup short: `MentionBuilder::new("Huck", 1).alias("Huckleberry").build()`.

use dramatis::models::{Gender, Importance, RawMention};

/// Builder for a single extracted mention.
pub struct MentionBuilder {
    mention: RawMention,
}

impl MentionBuilder {
    /// Start a mention of `name` found in chunk `chunk`.
    pub fn new(name: &str, chunk: usize) -> Self {
        Self {
            mention: RawMention::new(name, chunk),
        }
    }

    /// Add an alias the extractor reported alongside the name.
    pub fn alias(mut self, alias: &str) -> Self {
        self.mention = self.mention.with_alias(alias);
        self
    }

    pub fn gender(mut self, gender: Gender) -> Self {
        self.mention = self.mention.with_gender(gender);
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.mention = self.mention.with_description(description);
        self
    }

    pub fn importance(mut self, importance: Importance) -> Self {
        self.mention = self.mention.with_importance(importance);
        self
    }

    pub fn pronoun(mut self, role: &str, pronoun: &str) -> Self {
        self.mention = self.mention.with_pronoun(role, pronoun);
        self
    }

    pub fn build(self) -> RawMention {
        self.mention
    }
}

/// Mentions for `chunks`, one bare mention per name, stamped with the chunk index.
pub fn chunked(chunks: &[&[&str]]) -> Vec<Vec<RawMention>> {
    chunks
        .iter()
        .enumerate()
        .map(|(chunk, names)| {
            names
                .iter()
                .map(|name| MentionBuilder::new(name, chunk).build())
                .collect()
        })
        .collect()
}

/// The opening chapters of Huckleberry Finn, three chunks of mentions.
pub fn huck_finn_chunks() -> Vec<Vec<RawMention>> {
    vec![
        vec![
            MentionBuilder::new("Huckleberry Finn", 0)
                .gender(Gender::Male)
                .importance(Importance::Main)
                .description("narrator, son of the town drunkard")
                .build(),
            MentionBuilder::new("Tom Sawyer", 0)
                .gender(Gender::Male)
                .description("Huck's friend, leader of the gang")
                .build(),
            MentionBuilder::new("Jim", 0).gender(Gender::Male).build(),
        ],
        vec![
            MentionBuilder::new("Huck", 1).pronoun("subject", "he").build(),
            MentionBuilder::new("Miss Watson", 1)
                .gender(Gender::Female)
                .build(),
            MentionBuilder::new("Widow Douglas", 1)
                .gender(Gender::Female)
                .description("adopted Huck and tries to sivilize him")
                .build(),
        ],
        vec![
            MentionBuilder::new("Huckleberry", 2).build(),
            MentionBuilder::new("Tom", 2).build(),
            MentionBuilder::new("Aunt Polly", 2)
                .gender(Gender::Female)
                .build(),
        ],
    ]
}
