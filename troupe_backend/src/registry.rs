//! Lookup into the externally-owned character list.
//!
//! Groups only store character ids. Everything else about a character (its
//! display name, how chatty it is, whether it still exists) comes from a
//! [`CharacterRegistry`].

use crate::character_card::ParsedCharacter;

pub trait CharacterRegistry: Send + Sync {
    /// Position of the character in the registry, or `None` if it was deleted.
    fn resolve_member_index(&self, id: &str) -> Option<usize>;

    fn display_name(&self, id: &str) -> Option<String>;

    /// Validated talkativeness in `[0, 1]`, `None` when the card has none.
    fn talkativeness(&self, id: &str) -> Option<f32>;
}

/// In-memory registry backed by parsed character cards.
#[derive(Debug, Clone, Default)]
pub struct CharacterBook {
    characters: Vec<ParsedCharacter>,
}

impl CharacterBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cards<I>(cards: I) -> Self
    where
        I: IntoIterator<Item = ParsedCharacter>,
    {
        let mut book = Self::new();
        for card in cards {
            book.insert(card);
        }
        book
    }

    /// Insert or replace (by id) a character.
    pub fn insert(&mut self, character: ParsedCharacter) {
        match self.characters.iter_mut().find(|c| c.id == character.id) {
            Some(existing) => *existing = character,
            None => self.characters.push(character),
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<ParsedCharacter> {
        let index = self.resolve_member_index(id)?;
        Some(self.characters.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<&ParsedCharacter> {
        self.characters.iter().find(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParsedCharacter> {
        self.characters.iter()
    }
}

impl CharacterRegistry for CharacterBook {
    fn resolve_member_index(&self, id: &str) -> Option<usize> {
        self.characters.iter().position(|c| c.id == id)
    }

    fn display_name(&self, id: &str) -> Option<String> {
        self.get(id).map(|c| c.name.clone())
    }

    fn talkativeness(&self, id: &str) -> Option<f32> {
        self.get(id).and_then(|c| c.talkativeness)
    }
}

#[cfg(test)]
pub(crate) fn test_character(id: &str, name: &str, talkativeness: Option<f32>) -> ParsedCharacter {
    ParsedCharacter {
        id: id.to_string(),
        name: name.to_string(),
        description: String::new(),
        personality: String::new(),
        scenario: String::new(),
        talkativeness,
    }
}
