use crate::logic::errors::ErrorBag;
use crate::logic::field_index::SchemaFieldIndex;
use crate::logic::loader::LoaderScope;
use crate::model::{collect_link_identifiers, Entity, EntitySchema, Id, LinkIdentifier};
use crate::store::Store;
use anyhow::Result;
use itertools::Itertools;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves the linked entities of a batch of parents in one pass.
///
/// Id links go through the scope's batching loader; business-key links are
/// grouped per target type and fetched with one `list_by_references` call
/// each. Failures are collected per link rather than aborting the batch, so
/// parents keep every link that did resolve.
pub struct LinkHydrator<S: Store> {
    store: Arc<S>,
    field_index: Arc<SchemaFieldIndex>,
    self_type_fallback: bool,
}

impl<S: Store> LinkHydrator<S> {
    pub fn new(store: Arc<S>, field_index: Arc<SchemaFieldIndex>) -> Self {
        Self {
            store,
            field_index,
            self_type_fallback: true,
        }
    }

    /// Disable falling back to the parent's own type for reference fields
    /// that declare no target.
    pub fn without_self_type_fallback(mut self) -> Self {
        self.self_type_fallback = false;
        self
    }

    /// Populate `linked_entities` on every parent. Parents are mutated
    /// best-effort; the returned bag holds every link that failed, so
    /// callers choose between surfacing a combined error and serving the
    /// partial result.
    pub async fn hydrate_batch(
        &self,
        scope: &LoaderScope<S>,
        parents: &mut [Entity],
    ) -> ErrorBag {
        let organization_id = scope.organization_id().clone();
        let mut bag = ErrorBag::new();

        // Parents that already carry links are left untouched, but they and
        // their children still seed the cache so sibling parents' links
        // resolve without a fetch.
        for parent in parents.iter() {
            scope.prime(parent);
            for child in &parent.linked_entities {
                scope.prime(child);
            }
        }

        // One schema lookup per distinct parent type for the whole batch.
        let mut schemas: HashMap<String, Option<EntitySchema>> = HashMap::new();
        for parent in parents.iter() {
            if !parent.linked_entities.is_empty() {
                continue;
            }
            let type_key = parent.entity_type.to_lowercase();
            if schemas.contains_key(&type_key) {
                continue;
            }
            match self
                .store
                .get_schema_by_name(&organization_id, &parent.entity_type)
                .await
            {
                Ok(schema) => {
                    schemas.insert(type_key, schema);
                }
                Err(err) => {
                    bag.push(format!(
                        "schema lookup for {} failed: {err}",
                        parent.entity_type
                    ));
                    schemas.insert(type_key, None);
                }
            }
        }

        let per_parent: Vec<Vec<LinkIdentifier>> = parents
            .iter()
            .map(|parent| {
                if !parent.linked_entities.is_empty() {
                    return Vec::new();
                }
                let schema = schemas
                    .get(&parent.entity_type.to_lowercase())
                    .and_then(|s| s.as_ref());
                collect_link_identifiers(parent, schema, self.self_type_fallback)
            })
            .collect();

        let unique: Vec<LinkIdentifier> = per_parent
            .iter()
            .flatten()
            .unique_by(|link| link.cache_key())
            .cloned()
            .collect();

        let mut resolved: HashMap<String, Entity> = HashMap::new();

        let id_keys: Vec<Id> = unique
            .iter()
            .filter_map(|link| match link {
                LinkIdentifier::ById { id } => Some(id.clone()),
                LinkIdentifier::ByReference { .. } => None,
            })
            .collect();
        for (key, result) in id_keys.iter().zip(scope.load_many(&id_keys).await) {
            match result {
                Ok(Some(entity)) => {
                    resolved.insert(format!("id:{key}"), entity);
                }
                Ok(None) => {}
                Err(err) => bag.push(format!("loading linked entity {key} failed: {err}")),
            }
        }

        let by_type = unique
            .iter()
            .filter_map(|link| match link {
                LinkIdentifier::ByReference {
                    value,
                    target_entity_type,
                } => Some((target_entity_type.to_lowercase(), value.clone())),
                LinkIdentifier::ById { .. } => None,
            })
            .into_group_map();
        for (type_key, values) in by_type {
            match self
                .resolve_reference_group(scope, &organization_id, &type_key, &values)
                .await
            {
                Ok(found) => resolved.extend(found),
                Err(err) => bag.push(format!(
                    "resolving {type_key} references {values:?} failed: {err}"
                )),
            }
        }

        for (parent, links) in parents.iter_mut().zip(per_parent) {
            for link in links {
                match resolved.get(&link.cache_key()) {
                    Some(child) => parent.attach_linked(child.clone()),
                    None => bag.push(format!("linked entity not found: {}", link.cache_key())),
                }
            }
        }

        bag
    }

    /// Resolve one lazily-requested parent and its links. Load failures are
    /// fatal; link failures land in the returned bag.
    pub async fn resolve_linked_entities(
        &self,
        scope: &LoaderScope<S>,
        entity_id: &Id,
    ) -> Result<Option<(Entity, ErrorBag)>> {
        let Some(entity) = scope.load(entity_id).await? else {
            return Ok(None);
        };
        let mut batch = [entity];
        let bag = self.hydrate_batch(scope, &mut batch).await;
        let [entity] = batch;
        Ok(Some((entity, bag)))
    }

    /// Resolve a caller-supplied id list, preserving order and returning
    /// `None` for ids that do not exist. Found entities are hydrated one
    /// level deep.
    pub async fn resolve_by_ids(
        &self,
        scope: &LoaderScope<S>,
        ids: &[Id],
    ) -> Result<(Vec<Option<Entity>>, ErrorBag)> {
        let mut found = Vec::new();
        let mut slots: Vec<Option<usize>> = Vec::with_capacity(ids.len());
        for (id, result) in ids.iter().zip(scope.load_many(ids).await) {
            match result {
                Ok(Some(entity)) => {
                    slots.push(Some(found.len()));
                    found.push(entity);
                }
                Ok(None) => slots.push(None),
                Err(err) => {
                    return Err(anyhow::anyhow!("loading entity {id} failed: {err}"));
                }
            }
        }
        let bag = self.hydrate_batch(scope, &mut found).await;
        let mut found = found.into_iter().map(Some).collect::<Vec<_>>();
        Ok((
            slots
                .into_iter()
                .map(|slot| slot.and_then(|i| found[i].take()))
                .collect(),
            bag,
        ))
    }

    async fn resolve_reference_group(
        &self,
        scope: &LoaderScope<S>,
        organization_id: &Id,
        type_key: &str,
        values: &[String],
    ) -> Result<HashMap<String, Entity>> {
        let Some(field) = self
            .field_index
            .reference_field_for(self.store.as_ref(), organization_id, type_key)
            .await?
        else {
            anyhow::bail!("entity type {type_key} has no reference field");
        };

        let entities = self
            .store
            .list_by_references(organization_id, type_key, &field, values)
            .await?;

        let mut found = HashMap::new();
        for entity in entities {
            scope.prime(&entity);
            let Some(value) = entity.properties.get(&field).and_then(|v| v.as_str()) else {
                continue;
            };
            found.insert(format!("ref:{type_key}:{value}"), entity);
        }
        Ok(found)
    }
}
