use crate::model::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A schema-typed, versioned record with arbitrary JSON properties.
///
/// `linked_entities` is never persisted; it is populated in memory by the
/// link hydrator. `reference_value` is the resolved display value of the
/// schema's canonical REFERENCE field, computed by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: Id,
    pub organization_id: Id,
    pub entity_type: String,
    pub schema_id: Id,
    /// Dot-segmented materialized path locating the entity in its hierarchy.
    pub path: String,
    pub properties: HashMap<String, serde_json::Value>,
    pub version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_entities: Vec<Entity>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(
        organization_id: Id,
        entity_type: &str,
        schema_id: Id,
        path: &str,
        properties: HashMap<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: crate::model::generate_id(),
            organization_id,
            entity_type: entity_type.to_string(),
            schema_id,
            path: path.to_string(),
            properties,
            version: 1,
            reference_value: None,
            linked_entities: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a resolved child, skipping ids that are already linked.
    pub fn attach_linked(&mut self, child: Entity) {
        if self.linked_entities.iter().any(|e| e.id == child.id) {
            return;
        }
        self.linked_entities.push(child);
    }
}

/// A resolved hierarchy view around one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityHierarchy {
    pub current: Entity,
    pub ancestors: Vec<Entity>,
    pub children: Vec<Entity>,
    pub siblings: Vec<Entity>,
}

/// Path of the parent node, or `None` for a root path.
pub fn path_parent(path: &str) -> Option<&str> {
    path.rsplit_once('.').map(|(parent, _)| parent)
}

/// True when `ancestor` is a strict, segment-aligned prefix of `descendant`.
///
/// Alignment matters: `a.b` is an ancestor of `a.b.c` but not of `a.bx`.
pub fn is_path_ancestor(ancestor: &str, descendant: &str) -> bool {
    if ancestor.is_empty() || descendant.len() <= ancestor.len() {
        return false;
    }
    descendant.starts_with(ancestor) && descendant.as_bytes()[ancestor.len()] == b'.'
}

/// True when the two paths share a parent and differ in their last segment.
pub fn are_path_siblings(a: &str, b: &str) -> bool {
    a != b && path_parent(a) == path_parent(b)
}
