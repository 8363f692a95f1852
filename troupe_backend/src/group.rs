use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::{CharacterId, GroupId};

/// How a group decides who speaks on a plain turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationStrategy {
    /// Mentions first, then a talkativeness roll per member.
    #[default]
    Natural,
    /// Every enabled member, in stored order.
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub members: Vec<CharacterId>,
    #[serde(default)]
    pub disabled_members: Vec<CharacterId>,
    #[serde(default)]
    pub activation_strategy: ActivationStrategy,
    #[serde(default)]
    pub allow_self_responses: bool,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub chat_metadata: Map<String, Value>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn new(name: impl Into<String>, members: Vec<CharacterId>) -> Self {
        let mut group = Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            members: Vec::new(),
            disabled_members: Vec::new(),
            activation_strategy: ActivationStrategy::default(),
            allow_self_responses: false,
            avatar_url: None,
            chat_metadata: Map::new(),
            created_at: Utc::now(),
        };
        for member in members {
            group.add_member(member);
        }
        group
    }

    /// Returns `false` if the character was already a member.
    pub fn add_member(&mut self, id: impl Into<CharacterId>) -> bool {
        let id = id.into();
        if self.members.contains(&id) {
            return false;
        }
        self.members.push(id);
        true
    }

    pub fn remove_member(&mut self, id: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != id);
        self.disabled_members.retain(|m| m != id);
        self.members.len() != before
    }

    pub fn set_member_enabled(&mut self, id: &str, enabled: bool) {
        if enabled {
            self.disabled_members.retain(|m| m != id);
        } else if !self.disabled_members.iter().any(|m| m == id) {
            self.disabled_members.push(id.to_string());
        }
    }

    /// Swap a member with its neighbour. Moving past either end is a no-op.
    pub fn move_member(&mut self, id: &str, direction: MoveDirection) -> bool {
        let Some(index) = self.members.iter().position(|m| m == id) else {
            return false;
        };
        let target = match direction {
            MoveDirection::Up if index > 0 => index - 1,
            MoveDirection::Down if index + 1 < self.members.len() => index + 1,
            _ => return false,
        };
        self.members.swap(index, target);
        true
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.members.iter().any(|m| m == id) && !self.disabled_members.iter().any(|m| m == id)
    }

    /// Members in stored order, skipping disabled ones.
    pub fn enabled_members(&self) -> Vec<CharacterId> {
        self.members
            .iter()
            .filter(|m| !self.disabled_members.contains(m))
            .cloned()
            .collect()
    }
}

/// Authoritative in-memory copy of the open groups. Saving them is someone else's job.
#[derive(Default)]
pub struct GroupStore {
    groups: RwLock<HashMap<GroupId, Group>>,
}

impl GroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_group(&self, name: &str, members: Vec<CharacterId>) -> Group {
        let group = Group::new(name, members);
        tracing::info!(
            "Created group '{}' ({}) with {} member(s)",
            group.name,
            group.id,
            group.members.len()
        );
        self.insert(group.clone()).await;
        group
    }

    /// Insert or replace a group, e.g. one loaded by the caller from disk.
    pub async fn insert(&self, group: Group) {
        self.groups.write().await.insert(group.id.clone(), group);
    }

    pub async fn get(&self, id: &str) -> Option<Group> {
        self.groups.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<Group> {
        let mut groups: Vec<Group> = self.groups.read().await.values().cloned().collect();
        groups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        groups
    }

    /// Apply an edit to a group and return the updated copy.
    pub async fn update<F>(&self, id: &str, edit: F) -> Option<Group>
    where
        F: FnOnce(&mut Group),
    {
        let mut groups = self.groups.write().await;
        let group = groups.get_mut(id)?;
        edit(group);
        Some(group.clone())
    }

    pub async fn delete(&self, id: &str) -> Option<Group> {
        self.groups.write().await.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<CharacterId> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn new_group_drops_duplicate_members() {
        let group = Group::new("Tavern", ids(&["a", "b", "a"]));
        assert_eq!(group.members, ids(&["a", "b"]));
        assert_eq!(group.activation_strategy, ActivationStrategy::Natural);
        assert!(!group.allow_self_responses);
    }

    #[test]
    fn disabling_and_removing_members() {
        let mut group = Group::new("Tavern", ids(&["a", "b", "c"]));
        group.set_member_enabled("b", false);
        group.set_member_enabled("b", false);
        assert_eq!(group.disabled_members, ids(&["b"]));
        assert_eq!(group.enabled_members(), ids(&["a", "c"]));
        assert!(!group.is_enabled("b"));

        assert!(group.remove_member("b"));
        assert!(group.disabled_members.is_empty());
        assert!(!group.remove_member("b"));
    }

    #[test]
    fn move_member_stops_at_edges() {
        let mut group = Group::new("Tavern", ids(&["a", "b", "c"]));
        assert!(!group.move_member("a", MoveDirection::Up));
        assert!(group.move_member("a", MoveDirection::Down));
        assert_eq!(group.members, ids(&["b", "a", "c"]));
        assert!(!group.move_member("c", MoveDirection::Down));
        assert!(!group.move_member("zzz", MoveDirection::Up));
    }

    #[test]
    fn strategy_serializes_lowercase() {
        let mut group = Group::new("Tavern", ids(&["a"]));
        group.activation_strategy = ActivationStrategy::List;
        let json = serde_json::to_value(&group).unwrap();
        assert_eq!(json["activation_strategy"], "list");
    }

    #[tokio::test]
    async fn store_update_and_delete() {
        let store = GroupStore::new();
        let group = store.create_group("Tavern", ids(&["a", "b"])).await;

        let updated = store
            .update(&group.id, |g| g.allow_self_responses = true)
            .await
            .unwrap();
        assert!(updated.allow_self_responses);
        assert!(store.get(&group.id).await.unwrap().allow_self_responses);

        assert_eq!(store.list().await.len(), 1);
        assert!(store.delete(&group.id).await.is_some());
        assert!(store.get(&group.id).await.is_none());
        assert!(store.update(&group.id, |_| {}).await.is_none());
    }
}
