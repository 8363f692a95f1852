use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// TavernAI Character Card V2 format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TavernAICardV2 {
    pub spec: String,
    pub spec_version: String,
    pub data: TavernAIData,
    /// Avatar file name; front ends use it as the character's stable id.
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TavernAIData {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub scenario: String,
    #[serde(default)]
    pub first_mes: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub extensions: Map<String, Value>,
}

/// Pre-V2 cards keep everything at the top level.
#[derive(Debug, Clone, Deserialize)]
struct TavernAICardV1 {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    personality: String,
    #[serde(default)]
    scenario: String,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    talkativeness: Option<Value>,
}

/// Unified character representation
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCharacter {
    pub id: String,
    pub name: String,
    pub description: String,
    pub personality: String,
    pub scenario: String,
    /// Already validated: finite and within `[0, 1]`. `None` means "use the default".
    pub talkativeness: Option<f32>,
}

/// Parse a character card from text. Tries V2 JSON, then V1 JSON, then Boostyle.
pub fn parse_character_card(content: &str) -> Result<(ParsedCharacter, String)> {
    if let Ok(parsed) = parse_tavernai_v2(content) {
        return Ok((parsed, "tavernai_v2".to_string()));
    }

    if let Ok(parsed) = parse_tavernai_v1(content) {
        return Ok((parsed, "tavernai_v1".to_string()));
    }

    if let Ok(parsed) = parse_boostyle_format(content) {
        return Ok((parsed, "boostyle".to_string()));
    }

    anyhow::bail!("Unable to parse character card - unknown or unsupported format")
}

/// Parse TavernAI V2 format
pub fn parse_tavernai_v2(content: &str) -> Result<ParsedCharacter> {
    let card: TavernAICardV2 =
        serde_json::from_str(content).context("Failed to parse as TavernAI V2 JSON")?;
    Ok(character_from_v2(card))
}

pub fn character_from_v2(card: TavernAICardV2) -> ParsedCharacter {
    let talkativeness = card
        .data
        .extensions
        .get("talkativeness")
        .and_then(talkativeness_from_value);
    let id = card
        .avatar
        .filter(|avatar| !avatar.trim().is_empty())
        .unwrap_or_else(|| card.data.name.clone());

    ParsedCharacter {
        id,
        name: card.data.name,
        description: card.data.description,
        personality: card.data.personality,
        scenario: card.data.scenario,
        talkativeness,
    }
}

fn parse_tavernai_v1(content: &str) -> Result<ParsedCharacter> {
    let card: TavernAICardV1 =
        serde_json::from_str(content).context("Failed to parse as TavernAI V1 JSON")?;
    if card.name.trim().is_empty() {
        anyhow::bail!("TavernAI V1 card has an empty name");
    }

    let id = card
        .avatar
        .filter(|avatar| !avatar.trim().is_empty())
        .unwrap_or_else(|| card.name.clone());

    Ok(ParsedCharacter {
        id,
        talkativeness: card.talkativeness.as_ref().and_then(talkativeness_from_value),
        name: card.name,
        description: card.description,
        personality: card.personality,
        scenario: card.scenario,
    })
}

/// Parse Boostyle format (plain text with labeled sections)
fn parse_boostyle_format(content: &str) -> Result<ParsedCharacter> {
    // Name: Alice
    // Personality: kind, intelligent, creative
    // Talkativeness: 0.8

    let mut name = String::new();
    let mut personality = String::new();
    let mut description = String::new();
    let mut scenario = String::new();
    let mut talkativeness = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(value) = line.strip_prefix("Name:") {
            name = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("Personality:") {
            personality = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("Description:") {
            description = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("Scenario:") {
            scenario = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("Talkativeness:") {
            talkativeness = talkativeness_from_value(&Value::String(value.trim().to_string()));
        }
    }

    if name.is_empty() {
        anyhow::bail!("Boostyle format parsing failed: no name found");
    }

    Ok(ParsedCharacter {
        id: name.clone(),
        name,
        description,
        personality,
        scenario,
        talkativeness,
    })
}

/// Cards store talkativeness either as a number or as a numeric string.
pub fn talkativeness_from_value(value: &Value) -> Option<f32> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    if !raw.is_finite() {
        return None;
    }
    Some(raw.clamp(0.0, 1.0) as f32)
}
