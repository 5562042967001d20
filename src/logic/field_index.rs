use crate::model::Id;
use crate::store::SchemaStore;
use anyhow::Result;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Process-wide cache of each entity type's canonical reference field.
///
/// Both outcomes are cached: a type whose schema declares no REFERENCE field
/// (or has no schema at all) is remembered as `None` so repeated misses do
/// not hit the store. Entries key on the exact organization id and the
/// lowercased type name.
#[derive(Default)]
pub struct SchemaFieldIndex {
    entries: RwLock<HashMap<(Id, String), Option<String>>>,
}

impl SchemaFieldIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the reference field name for an entity type, consulting the
    /// store only on a cache miss.
    pub async fn reference_field_for<S: SchemaStore>(
        &self,
        store: &S,
        organization_id: &Id,
        entity_type: &str,
    ) -> Result<Option<String>> {
        let key = (organization_id.clone(), entity_type.to_lowercase());
        if let Some(cached) = self.entries.read().get(&key) {
            return Ok(cached.clone());
        }

        let field = store
            .get_schema_by_name(organization_id, entity_type)
            .await?
            .and_then(|schema| schema.reference_field().map(|f| f.name.clone()));

        self.entries.write().insert(key, field.clone());
        Ok(field)
    }

    /// Drop the cached entry for one entity type, forcing a re-read after a
    /// schema change.
    pub fn invalidate(&self, organization_id: &Id, entity_type: &str) {
        self.entries
            .write()
            .remove(&(organization_id.clone(), entity_type.to_lowercase()));
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
