//! Entities, the shared lexicon, and identifier emission rules.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Prefix of reserved identifiers meaning "recognized but not normalized".
pub const UNKNOWN_ID_PREFIX: &str = "UNKNOWN:";

/// Reserved identifier for the non-entity state.
pub const NON_ENTITY_ID: &str = "NONE";

/// A normalization target.
///
/// Entities are immutable and shared out of the [`Lexicon`] via `Arc`; no
/// code mutates an entity after the lexicon is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Primary identifier (e.g. "MESH:D003920").
    pub primary_identifier: String,
    /// Canonical name.
    pub primary_name: String,
    /// Entity class this entity belongs to.
    pub entity_class: String,
    /// Alias identifiers.
    pub alias_identifiers: Vec<String>,
}

impl Entity {
    /// Create an entity.
    #[must_use]
    pub fn new(
        primary_identifier: impl Into<String>,
        primary_name: impl Into<String>,
        entity_class: impl Into<String>,
    ) -> Self {
        Self {
            primary_identifier: primary_identifier.into(),
            primary_name: primary_name.into(),
            entity_class: entity_class.into(),
            alias_identifiers: Vec::new(),
        }
    }

    /// Add alias identifiers.
    #[must_use]
    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.alias_identifiers = aliases;
        self
    }

    /// Whether this entity's primary identifier is a reserved sentinel.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        is_sentinel_id(&self.primary_identifier)
    }
}

/// Whether `id` is one of the reserved sentinel identifiers.
#[must_use]
pub fn is_sentinel_id(id: &str) -> bool {
    id == NON_ENTITY_ID || id.starts_with(UNKNOWN_ID_PREFIX)
}

/// Join rule for emitted identifier sets, uniform across all wire formats.
///
/// Collects distinct primary identifiers, excludes sentinels, sorts
/// lexicographically, and joins with `|`. Returns `None` when the exclusion
/// empties the set — callers must then omit the field entirely rather than
/// emit it empty.
#[must_use]
pub fn join_identifiers(entities: &[Arc<Entity>]) -> Option<String> {
    let mut ids: Vec<&str> = entities
        .iter()
        .map(|e| e.primary_identifier.as_str())
        .filter(|id| !is_sentinel_id(id))
        .collect();
    if ids.is_empty() {
        return None;
    }
    ids.sort_unstable();
    ids.dedup();
    Some(ids.join("|"))
}

/// Shared entity lexicon, owner of all [`Entity`] values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lexicon {
    by_id: HashMap<String, Arc<Entity>>,
    by_class: HashMap<String, Vec<Arc<Entity>>>,
    non_entity: Arc<Entity>,
    unknown_by_class: HashMap<String, Arc<Entity>>,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::new()
    }
}

impl Lexicon {
    /// Create an empty lexicon with the reserved non-entity state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            by_class: HashMap::new(),
            non_entity: Arc::new(Entity::new(NON_ENTITY_ID, "non-entity", "")),
            unknown_by_class: HashMap::new(),
        }
    }

    /// Insert an entity; its primary and alias identifiers become resolvable.
    pub fn insert(&mut self, entity: Entity) {
        let class = entity.entity_class.clone();
        let shared = Arc::new(entity);
        self.by_id
            .insert(shared.primary_identifier.clone(), Arc::clone(&shared));
        for alias in &shared.alias_identifiers {
            self.by_id.entry(alias.clone()).or_insert_with(|| Arc::clone(&shared));
        }
        self.by_class.entry(class).or_default().push(shared);
    }

    /// Register an entity class, creating its unknown-state placeholder.
    pub fn register_class(&mut self, class: &str) {
        self.unknown_by_class.entry(class.to_string()).or_insert_with(|| {
            Arc::new(Entity::new(
                format!("{UNKNOWN_ID_PREFIX}{class}"),
                "unknown",
                class,
            ))
        });
        self.by_class.entry(class.to_string()).or_default();
    }

    /// Resolve an identifier (primary or alias).
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<Entity>> {
        self.by_id.get(id)
    }

    /// The reserved non-entity state.
    #[must_use]
    pub fn non_entity(&self) -> &Arc<Entity> {
        &self.non_entity
    }

    /// The unknown-state placeholder for `class`.
    ///
    /// Falls back to the non-entity state for an unregistered class.
    #[must_use]
    pub fn unknown_for(&self, class: &str) -> Arc<Entity> {
        self.unknown_by_class
            .get(class)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.non_entity))
    }

    /// All entities of `class`.
    #[must_use]
    pub fn entities_of_class(&self, class: &str) -> &[Arc<Entity>] {
        self.by_class.get(class).map_or(&[], Vec::as_slice)
    }

    /// Number of entities (by primary identifier).
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_class.values().map(Vec::len).sum()
    }

    /// Whether the lexicon holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arc(id: &str) -> Arc<Entity> {
        Arc::new(Entity::new(id, "name", "Disease"))
    }

    #[test]
    fn join_excludes_sentinels_and_sorts() {
        let entities = vec![
            arc("MESH:D002"),
            arc(NON_ENTITY_ID),
            arc("MESH:D001"),
            arc("UNKNOWN:Disease"),
        ];
        assert_eq!(join_identifiers(&entities).as_deref(), Some("MESH:D001|MESH:D002"));
    }

    #[test]
    fn join_omits_when_only_sentinels_remain() {
        let entities = vec![arc("UNKNOWN:Disease")];
        assert_eq!(join_identifiers(&entities), None);
        assert_eq!(join_identifiers(&[]), None);
    }

    #[test]
    fn join_dedups_identifiers() {
        let entities = vec![arc("MESH:D001"), arc("MESH:D001")];
        assert_eq!(join_identifiers(&entities).as_deref(), Some("MESH:D001"));
    }

    #[test]
    fn lexicon_resolves_aliases() {
        let mut lexicon = Lexicon::new();
        lexicon.register_class("Disease");
        lexicon.insert(
            Entity::new("MESH:D003920", "diabetes mellitus", "Disease")
                .with_aliases(vec!["OMIM:222100".into()]),
        );
        assert_eq!(
            lexicon.get("OMIM:222100").unwrap().primary_identifier,
            "MESH:D003920"
        );
        assert_eq!(lexicon.entities_of_class("Disease").len(), 1);
    }

    #[test]
    fn unknown_placeholder_is_sentinel() {
        let mut lexicon = Lexicon::new();
        lexicon.register_class("Chemical");
        let unknown = lexicon.unknown_for("Chemical");
        assert!(unknown.is_sentinel());
        assert_eq!(unknown.primary_identifier, "UNKNOWN:Chemical");
    }
}
