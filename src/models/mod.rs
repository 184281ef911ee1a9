pub mod character;
pub mod mention;

pub use character::{Character, Importance, RegistryMetadata, RegistryRecord};
pub use mention::{Gender, Pronouns, RawMention};
