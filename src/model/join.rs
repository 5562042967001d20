use crate::model::{Entity, FieldType, Id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinType {
    /// Pair left entities with the right entities their join field points at.
    Reference,
    /// Cartesian product of the two filtered sides.
    Cross,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinSide {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A predicate against one property of the entities on one join side.
///
/// Exactly which clause applies is decided in order: `exists`, then
/// `in_array`, then `value` equality. An empty filter matches everything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyFilter {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub in_array: Vec<String>,
}

impl PropertyFilter {
    pub fn equals(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: Some(value.to_string()),
            exists: None,
            in_array: Vec::new(),
        }
    }

    pub fn exists(key: &str, exists: bool) -> Self {
        Self {
            key: key.to_string(),
            value: None,
            exists: Some(exists),
            in_array: Vec::new(),
        }
    }

    pub fn one_of(key: &str, values: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            value: None,
            exists: None,
            in_array: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSortCriterion {
    pub side: JoinSide,
    pub key: String,
    pub direction: SortDirection,
}

/// A persisted, named join between two entity types of one organization.
///
/// For REFERENCE joins `join_field` holds the canonical (schema-cased) name
/// of the left-side field and `join_field_type` its validated kind; both are
/// absent for CROSS joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinDefinition {
    pub id: Id,
    pub organization_id: Id,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub join_type: JoinType,
    pub left_entity_type: String,
    pub right_entity_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_field_type: Option<FieldType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub left_filters: Vec<PropertyFilter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub right_filters: Vec<PropertyFilter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort_criteria: Vec<JoinSortCriterion>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a join definition. Validation and canonicalization of
/// the join field happen in the join engine, not here.
#[derive(Debug, Clone, Deserialize)]
pub struct NewJoinDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub join_type: JoinType,
    pub left_entity_type: String,
    pub right_entity_type: String,
    #[serde(default)]
    pub join_field: Option<String>,
    #[serde(default)]
    pub left_filters: Vec<PropertyFilter>,
    #[serde(default)]
    pub right_filters: Vec<PropertyFilter>,
    #[serde(default)]
    pub sort_criteria: Vec<JoinSortCriterion>,
}

/// Partial update: only present fields are applied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinDefinitionUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub join_type: Option<JoinType>,
    #[serde(default)]
    pub join_field: Option<String>,
    #[serde(default)]
    pub left_filters: Option<Vec<PropertyFilter>>,
    #[serde(default)]
    pub right_filters: Option<Vec<PropertyFilter>>,
    #[serde(default)]
    pub sort_criteria: Option<Vec<JoinSortCriterion>>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// Per-execution options merged with the persisted definition. Extra filters
/// narrow the sides further; sort criteria are appended after the stored
/// ones, so the stored sort stays primary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinExecutionOptions {
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default)]
    pub extra_left_filters: Vec<PropertyFilter>,
    #[serde(default)]
    pub extra_right_filters: Vec<PropertyFilter>,
    #[serde(default)]
    pub sort_criteria: Option<Vec<JoinSortCriterion>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinEdge {
    pub left: Entity,
    pub right: Entity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub total_count: usize,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinConnection {
    pub edges: Vec<JoinEdge>,
    pub page_info: PageInfo,
}
