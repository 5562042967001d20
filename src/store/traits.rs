use crate::model::{
    Entity, EntitySchema, Id, JoinDefinition, JoinEdge, JoinExecutionOptions, NewJoinDefinition,
};
use anyhow::Result;
use async_trait::async_trait;

/// Storage operations on entities.
///
/// All operations are scoped to an organization; implementations must never
/// return entities belonging to another tenant.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get_entity(&self, organization_id: &Id, id: &Id) -> Result<Option<Entity>>;

    /// Fetch a batch of entities by id. The result carries whatever was
    /// found, in no guaranteed order; callers re-associate by id.
    async fn get_entities_by_ids(&self, organization_id: &Id, ids: &[Id]) -> Result<Vec<Entity>>;

    /// Fetch entities of one type whose canonical reference value is in
    /// `values`. The entity type is matched case-insensitively.
    async fn list_by_references(
        &self,
        organization_id: &Id,
        entity_type: &str,
        reference_field: &str,
        values: &[String],
    ) -> Result<Vec<Entity>>;

    async fn ancestors_of(&self, organization_id: &Id, path: &str) -> Result<Vec<Entity>>;
    async fn descendants_of(&self, organization_id: &Id, path: &str) -> Result<Vec<Entity>>;
    async fn children_of(&self, organization_id: &Id, path: &str) -> Result<Vec<Entity>>;
    async fn siblings_of(&self, organization_id: &Id, path: &str) -> Result<Vec<Entity>>;

    /// Execute a validated join definition with execution options already
    /// merged in. Returns the requested page of edges plus the total number
    /// of edges before pagination.
    async fn execute_join(
        &self,
        definition: &JoinDefinition,
        options: &JoinExecutionOptions,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<JoinEdge>, usize)>;

    async fn upsert_entity(&self, entity: Entity) -> Result<Entity>;
}

/// Storage operations on entity schemas.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Look up the active schema for an entity type name, case-insensitively.
    async fn get_schema_by_name(
        &self,
        organization_id: &Id,
        name: &str,
    ) -> Result<Option<EntitySchema>>;

    async fn get_schema_by_id(&self, organization_id: &Id, id: &Id)
        -> Result<Option<EntitySchema>>;

    async fn upsert_schema(&self, schema: EntitySchema) -> Result<EntitySchema>;
}

/// Storage operations on persisted join definitions.
#[async_trait]
pub trait JoinStore: Send + Sync {
    async fn get_join_definition(
        &self,
        organization_id: &Id,
        id: &Id,
    ) -> Result<Option<JoinDefinition>>;

    async fn list_join_definitions(&self, organization_id: &Id) -> Result<Vec<JoinDefinition>>;

    async fn insert_join_definition(
        &self,
        organization_id: &Id,
        new_definition: &NewJoinDefinition,
        join_field: Option<String>,
        join_field_type: Option<crate::model::FieldType>,
    ) -> Result<JoinDefinition>;

    async fn update_join_definition(&self, definition: JoinDefinition) -> Result<JoinDefinition>;

    /// Delete a definition; returns whether anything was removed.
    async fn delete_join_definition(&self, organization_id: &Id, id: &Id) -> Result<bool>;
}

/// Combined store interface used by the API layer.
pub trait Store: EntityStore + SchemaStore + JoinStore {}

impl<T: EntityStore + SchemaStore + JoinStore> Store for T {}
