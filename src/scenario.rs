//! Scenario files for the driver: who exists, who is in the group, what was said.
//!
//! ```toml
//! input = "Hi everyone"
//!
//! [group]
//! name = "Tavern"
//! members = ["alice.png", "bob.png"]
//! activation_strategy = "natural"
//!
//! [[characters]]
//! card = "cards/alice.json"
//!
//! [[characters]]
//! name = "Bob"
//! avatar = "bob.png"
//! talkativeness = 0.2
//! lines = ["Hm.", "Not now."]
//!
//! [[chat]]
//! name = "You"
//! is_user = true
//! text = "Anyone here?"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use troupe_backend::character_card::{
    character_from_v2, parse_character_card, ParsedCharacter, TavernAICardV2, TavernAIData,
};
use troupe_backend::chat::ChatMessage;
use troupe_backend::group::{ActivationStrategy, Group};
use troupe_backend::registry::CharacterBook;
use troupe_backend::CharacterId;

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    #[serde(default)]
    input: Option<String>,
    group: ScenarioGroup,
    #[serde(default)]
    characters: Vec<ScenarioCharacter>,
    #[serde(default)]
    chat: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ScenarioGroup {
    name: String,
    #[serde(default)]
    members: Vec<CharacterId>,
    #[serde(default)]
    disabled_members: Vec<CharacterId>,
    #[serde(default)]
    activation_strategy: ActivationStrategy,
    #[serde(default)]
    allow_self_responses: bool,
}

/// Either a card file on disk or an inline character.
#[derive(Debug, Deserialize)]
struct ScenarioCharacter {
    #[serde(default)]
    card: Option<PathBuf>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    talkativeness: Option<f64>,
    /// Canned replies for the scripted generator.
    #[serde(default)]
    lines: Vec<String>,
}

pub struct Scenario {
    pub book: CharacterBook,
    pub group: Group,
    pub chat: Vec<ChatMessage>,
    pub input: Option<String>,
    pub lines: HashMap<CharacterId, Vec<String>>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario from {:?}", path))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let scenario = Self::parse(&contents, base_dir)
            .with_context(|| format!("Failed to load scenario {:?}", path))?;
        tracing::info!(
            "Loaded scenario {:?}: {} character(s), {} member(s), {} message(s)",
            path,
            scenario.book.len(),
            scenario.group.members.len(),
            scenario.chat.len()
        );
        Ok(scenario)
    }

    /// Parse scenario text. Card paths resolve relative to `base_dir`.
    pub fn parse(contents: &str, base_dir: &Path) -> Result<Self> {
        let file: ScenarioFile = toml::from_str(contents).context("Invalid scenario TOML")?;

        let mut book = CharacterBook::new();
        let mut lines = HashMap::new();
        for (i, entry) in file.characters.into_iter().enumerate() {
            let character = load_character(&entry, base_dir)
                .with_context(|| format!("Character #{} is invalid", i + 1))?;
            if !entry.lines.is_empty() {
                lines.insert(character.id.clone(), entry.lines);
            }
            book.insert(character);
        }

        let mut group = Group::new(file.group.name, file.group.members);
        group.activation_strategy = file.group.activation_strategy;
        group.allow_self_responses = file.group.allow_self_responses;
        for id in &file.group.disabled_members {
            group.set_member_enabled(id, false);
        }
        for id in &group.members {
            if book.get(id).is_none() {
                tracing::warn!("Group member {} has no character card; it will never speak", id);
            }
        }

        Ok(Self {
            book,
            group,
            chat: file.chat,
            input: file.input.filter(|text| !text.trim().is_empty()),
            lines,
        })
    }
}

fn load_character(entry: &ScenarioCharacter, base_dir: &Path) -> Result<ParsedCharacter> {
    if let Some(card_path) = &entry.card {
        let path = base_dir.join(card_path);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read character card {:?}", path))?;
        let (mut character, format) = parse_character_card(&content)?;
        tracing::debug!("Parsed {} card for {}", format, character.name);
        // The scenario can pin the id when the card does not carry an avatar.
        if let Some(avatar) = entry.avatar.as_ref().filter(|a| !a.trim().is_empty()) {
            character.id = avatar.clone();
        }
        return Ok(character);
    }

    let Some(name) = entry.name.clone() else {
        bail!("needs either `card` or `name`");
    };
    let mut extensions = Map::new();
    if let Some(talkativeness) = entry.talkativeness {
        extensions.insert("talkativeness".to_string(), Value::from(talkativeness));
    }

    Ok(character_from_v2(TavernAICardV2 {
        spec: "chara_card_v2".to_string(),
        spec_version: "2.0".to_string(),
        data: TavernAIData {
            name,
            description: String::new(),
            personality: String::new(),
            scenario: String::new(),
            first_mes: String::new(),
            tags: Vec::new(),
            creator: String::new(),
            extensions,
        },
        avatar: entry.avatar.clone(),
    }))
}
