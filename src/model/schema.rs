use crate::model::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The type of a field in an entity schema.
///
/// `Reference` marks the canonical cross-entity reference string; only the
/// first field with this type counts as the canonical business key for the
/// schema. `EntityReference`, `EntityReferenceArray` and `EntityId` hold
/// opaque entity identifiers. The target entity type of any reference-like
/// field can be declared via `FieldDefinition::reference_entity_type`, but
/// the association is optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Json,
    FileReference,
    Geometry,
    Timeseries,
    Reference,
    EntityReference,
    EntityReferenceArray,
    EntityId,
}

impl FieldType {
    /// Fields that hold opaque entity identifiers directly.
    pub fn is_direct_reference(&self) -> bool {
        matches!(
            self,
            FieldType::EntityReference | FieldType::EntityReferenceArray | FieldType::EntityId
        )
    }

    /// Any field that links to another entity, by id or by business key.
    pub fn is_reference_like(&self) -> bool {
        self.is_direct_reference() || matches!(self, FieldType::Reference)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Target entity type when the field holds a relationship
    /// (ENTITY_REFERENCE, ENTITY_REFERENCE_ARRAY, ENTITY_ID or REFERENCE).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_entity_type: Option<String>,
}

impl FieldDefinition {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            required: false,
            description: None,
            reference_entity_type: None,
        }
    }

    pub fn with_target(mut self, entity_type: &str) -> Self {
        self.reference_entity_type = Some(entity_type.to_string());
        self
    }

    /// Declared target type, if the declaration is non-blank.
    pub fn declared_target(&self) -> Option<&str> {
        self.reference_entity_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaStatus {
    Active,
    Deprecated,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub id: Id,
    pub organization_id: Id,
    pub name: String,
    pub version: i64,
    pub status: SchemaStatus,
    pub fields: Vec<FieldDefinition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntitySchema {
    pub fn new(organization_id: Id, name: &str, fields: Vec<FieldDefinition>) -> Self {
        let now = Utc::now();
        Self {
            id: crate::model::generate_id(),
            organization_id,
            name: name.to_string(),
            version: 1,
            status: SchemaStatus::Active,
            fields,
            created_at: now,
            updated_at: now,
        }
    }

    /// Find a field by name, case-insensitively.
    pub fn find_field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// The canonical business-key reference field: the first REFERENCE-typed
    /// field declared by the schema, if any.
    pub fn reference_field(&self) -> Option<&FieldDefinition> {
        self.fields
            .iter()
            .find(|f| f.field_type == FieldType::Reference)
    }
}
