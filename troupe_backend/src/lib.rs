pub mod activation;
pub mod auto_mode;
pub mod character_card;
pub mod chat;
pub mod completion;
pub mod config;
pub mod error;
pub mod events;
pub mod generation;
pub mod group;
pub mod registry;
pub mod runtime;
pub mod sequencer;

pub use error::GroupError;

/// Stable identifier of a character in the external registry.
pub type CharacterId = String;

/// Identifier of a group chat.
pub type GroupId = String;
