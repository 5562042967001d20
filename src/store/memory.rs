use crate::model::{
    are_path_siblings, is_path_ancestor, path_parent, Entity, EntitySchema, FieldType, Id,
    JoinDefinition, JoinEdge, JoinExecutionOptions, JoinSide, JoinSortCriterion, JoinType,
    NewJoinDefinition, PropertyFilter, SchemaStatus, SortDirection,
};
use crate::store::traits::{EntityStore, JoinStore, SchemaStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Default)]
struct Inner {
    entities: HashMap<Id, Entity>,
    schemas: Vec<EntitySchema>,
    joins: HashMap<Id, JoinDefinition>,
}

/// In-memory store backing tests, seeding and local development.
///
/// Every id-batch fetch is recorded so tests can assert how the loader
/// coalesced requests.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    batch_log: RwLock<Vec<Vec<Id>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `get_entities_by_ids` call observed so far, in order.
    pub fn batch_fetches(&self) -> Vec<Vec<Id>> {
        self.batch_log.read().clone()
    }

    pub fn clear_batch_log(&self) {
        self.batch_log.write().clear();
    }

    fn schema_for(&self, organization_id: &Id, entity_type: &str) -> Option<EntitySchema> {
        let inner = self.inner.read();
        inner
            .schemas
            .iter()
            .find(|s| {
                s.organization_id == *organization_id
                    && s.status == SchemaStatus::Active
                    && s.name.eq_ignore_ascii_case(entity_type)
            })
            .cloned()
    }

    fn entities_where<F>(&self, organization_id: &Id, predicate: F) -> Vec<Entity>
    where
        F: Fn(&Entity) -> bool,
    {
        let inner = self.inner.read();
        let mut found: Vec<Entity> = inner
            .entities
            .values()
            .filter(|e| e.organization_id == *organization_id && predicate(e))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.id.cmp(&b.id)));
        found
    }
}

fn property_as_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Values a reference-like property contributes to join matching, for both
/// scalar and array shapes.
fn property_values(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => {
            items.iter().filter_map(property_as_string).collect()
        }
        other => property_as_string(other).into_iter().collect(),
    }
}

pub(crate) fn matches_filter(entity: &Entity, filter: &PropertyFilter) -> bool {
    let value = entity.properties.get(&filter.key);

    if let Some(required) = filter.exists {
        let present = value.is_some_and(|v| !v.is_null());
        if present != required {
            return false;
        }
    }

    if !filter.in_array.is_empty() {
        let Some(value) = value else { return false };
        let candidates = property_values(value);
        if !candidates.iter().any(|c| filter.in_array.contains(c)) {
            return false;
        }
    }

    if let Some(expected) = &filter.value {
        let Some(value) = value else { return false };
        match property_as_string(value) {
            Some(actual) if actual == *expected => {}
            _ => return false,
        }
    }

    true
}

fn matches_all(entity: &Entity, filters: &[PropertyFilter]) -> bool {
    filters.iter().all(|f| matches_filter(entity, f))
}

fn compare_values(a: Option<&serde_json::Value>, b: Option<&serde_json::Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
                return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            }
            match (a.as_str(), b.as_str()) {
                (Some(x), Some(y)) => x.cmp(y),
                _ => a.to_string().cmp(&b.to_string()),
            }
        }
    }
}

fn sort_edges(edges: &mut [JoinEdge], criteria: &[JoinSortCriterion]) {
    edges.sort_by(|a, b| {
        for criterion in criteria {
            let (x, y) = match criterion.side {
                JoinSide::Left => (&a.left, &b.left),
                JoinSide::Right => (&a.right, &b.right),
            };
            let mut ord = compare_values(
                x.properties.get(&criterion.key),
                y.properties.get(&criterion.key),
            );
            if criterion.direction == SortDirection::Desc {
                ord = ord.reverse();
            }
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get_entity(&self, organization_id: &Id, id: &Id) -> Result<Option<Entity>> {
        let inner = self.inner.read();
        Ok(inner
            .entities
            .get(id)
            .filter(|e| e.organization_id == *organization_id)
            .cloned())
    }

    async fn get_entities_by_ids(&self, organization_id: &Id, ids: &[Id]) -> Result<Vec<Entity>> {
        self.batch_log.write().push(ids.to_vec());
        let inner = self.inner.read();
        Ok(ids
            .iter()
            .filter_map(|id| inner.entities.get(id))
            .filter(|e| e.organization_id == *organization_id)
            .cloned()
            .collect())
    }

    async fn list_by_references(
        &self,
        organization_id: &Id,
        entity_type: &str,
        reference_field: &str,
        values: &[String],
    ) -> Result<Vec<Entity>> {
        Ok(self.entities_where(organization_id, |e| {
            e.entity_type.eq_ignore_ascii_case(entity_type)
                && e.properties
                    .get(reference_field)
                    .and_then(property_as_string)
                    .is_some_and(|v| values.contains(&v))
        }))
    }

    async fn ancestors_of(&self, organization_id: &Id, path: &str) -> Result<Vec<Entity>> {
        Ok(self.entities_where(organization_id, |e| is_path_ancestor(&e.path, path)))
    }

    async fn descendants_of(&self, organization_id: &Id, path: &str) -> Result<Vec<Entity>> {
        Ok(self.entities_where(organization_id, |e| is_path_ancestor(path, &e.path)))
    }

    async fn children_of(&self, organization_id: &Id, path: &str) -> Result<Vec<Entity>> {
        Ok(self.entities_where(organization_id, |e| path_parent(&e.path) == Some(path)))
    }

    async fn siblings_of(&self, organization_id: &Id, path: &str) -> Result<Vec<Entity>> {
        Ok(self.entities_where(organization_id, |e| are_path_siblings(&e.path, path)))
    }

    async fn execute_join(
        &self,
        definition: &JoinDefinition,
        options: &JoinExecutionOptions,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<JoinEdge>, usize)> {
        let left: Vec<Entity> = self
            .entities_where(&definition.organization_id, |e| {
                e.entity_type
                    .eq_ignore_ascii_case(&definition.left_entity_type)
            })
            .into_iter()
            .filter(|e| matches_all(e, &definition.left_filters))
            .filter(|e| matches_all(e, &options.extra_left_filters))
            .collect();
        let right: Vec<Entity> = self
            .entities_where(&definition.organization_id, |e| {
                e.entity_type
                    .eq_ignore_ascii_case(&definition.right_entity_type)
            })
            .into_iter()
            .filter(|e| matches_all(e, &definition.right_filters))
            .filter(|e| matches_all(e, &options.extra_right_filters))
            .collect();

        let mut edges = Vec::new();
        match definition.join_type {
            JoinType::Cross => {
                for l in &left {
                    for r in &right {
                        edges.push(JoinEdge {
                            left: l.clone(),
                            right: r.clone(),
                        });
                    }
                }
            }
            JoinType::Reference => {
                let field = definition
                    .join_field
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("reference join has no join field"))?;
                for l in &left {
                    let Some(raw) = l.properties.get(field) else {
                        continue;
                    };
                    let pointers = property_values(raw);
                    for r in &right {
                        let hit = pointers.iter().any(|p| {
                            *p == r.id || r.reference_value.as_deref() == Some(p.as_str())
                        });
                        if hit {
                            edges.push(JoinEdge {
                                left: l.clone(),
                                right: r.clone(),
                            });
                        }
                    }
                }
            }
        }

        // Stored criteria sort first; execution criteria break the ties.
        let mut criteria = definition.sort_criteria.clone();
        if let Some(extra) = &options.sort_criteria {
            criteria.extend(extra.iter().cloned());
        }
        if !criteria.is_empty() {
            sort_edges(&mut edges, &criteria);
        }

        let total = edges.len();
        let page = edges
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn upsert_entity(&self, mut entity: Entity) -> Result<Entity> {
        // The canonical reference value is denormalized at write time.
        entity.reference_value = self
            .schema_for(&entity.organization_id, &entity.entity_type)
            .and_then(|s| s.reference_field().map(|f| f.name.clone()))
            .and_then(|field| entity.properties.get(&field).and_then(property_as_string));
        entity.updated_at = Utc::now();
        let mut inner = self.inner.write();
        inner.entities.insert(entity.id.clone(), entity.clone());
        Ok(entity)
    }
}

#[async_trait]
impl SchemaStore for MemoryStore {
    async fn get_schema_by_name(
        &self,
        organization_id: &Id,
        name: &str,
    ) -> Result<Option<EntitySchema>> {
        Ok(self.schema_for(organization_id, name))
    }

    async fn get_schema_by_id(
        &self,
        organization_id: &Id,
        id: &Id,
    ) -> Result<Option<EntitySchema>> {
        let inner = self.inner.read();
        Ok(inner
            .schemas
            .iter()
            .find(|s| s.organization_id == *organization_id && s.id == *id)
            .cloned())
    }

    async fn upsert_schema(&self, schema: EntitySchema) -> Result<EntitySchema> {
        let mut inner = self.inner.write();
        inner.schemas.retain(|s| s.id != schema.id);
        inner.schemas.push(schema.clone());
        Ok(schema)
    }
}

#[async_trait]
impl JoinStore for MemoryStore {
    async fn get_join_definition(
        &self,
        organization_id: &Id,
        id: &Id,
    ) -> Result<Option<JoinDefinition>> {
        let inner = self.inner.read();
        Ok(inner
            .joins
            .get(id)
            .filter(|j| j.organization_id == *organization_id)
            .cloned())
    }

    async fn list_join_definitions(&self, organization_id: &Id) -> Result<Vec<JoinDefinition>> {
        let inner = self.inner.read();
        let mut joins: Vec<JoinDefinition> = inner
            .joins
            .values()
            .filter(|j| j.organization_id == *organization_id)
            .cloned()
            .collect();
        joins.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(joins)
    }

    async fn insert_join_definition(
        &self,
        organization_id: &Id,
        new_definition: &NewJoinDefinition,
        join_field: Option<String>,
        join_field_type: Option<FieldType>,
    ) -> Result<JoinDefinition> {
        let now = Utc::now();
        let definition = JoinDefinition {
            id: crate::model::generate_id(),
            organization_id: organization_id.clone(),
            name: new_definition.name.trim().to_string(),
            description: new_definition.description.clone(),
            join_type: new_definition.join_type,
            left_entity_type: new_definition.left_entity_type.trim().to_string(),
            right_entity_type: new_definition.right_entity_type.trim().to_string(),
            join_field,
            join_field_type,
            left_filters: new_definition.left_filters.clone(),
            right_filters: new_definition.right_filters.clone(),
            sort_criteria: new_definition.sort_criteria.clone(),
            created_at: now,
            updated_at: now,
        };
        let mut inner = self.inner.write();
        inner
            .joins
            .insert(definition.id.clone(), definition.clone());
        Ok(definition)
    }

    async fn update_join_definition(&self, mut definition: JoinDefinition) -> Result<JoinDefinition> {
        definition.updated_at = Utc::now();
        let mut inner = self.inner.write();
        inner
            .joins
            .insert(definition.id.clone(), definition.clone());
        Ok(definition)
    }

    async fn delete_join_definition(&self, organization_id: &Id, id: &Id) -> Result<bool> {
        let mut inner = self.inner.write();
        match inner.joins.get(id) {
            Some(j) if j.organization_id == *organization_id => {
                inner.joins.remove(id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldDefinition;

    async fn store_with_schema() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .upsert_schema(EntitySchema::new(
                "org-1".to_string(),
                "Component",
                vec![
                    FieldDefinition::new("tag", FieldType::Reference),
                    FieldDefinition::new("status", FieldType::String),
                ],
            ))
            .await
            .unwrap();
        store
    }

    fn component(path: &str, tag: &str, status: &str) -> Entity {
        Entity::new(
            "org-1".to_string(),
            "Component",
            "schema-1".to_string(),
            path,
            HashMap::from([
                ("tag".to_string(), serde_json::json!(tag)),
                ("status".to_string(), serde_json::json!(status)),
            ]),
        )
    }

    #[tokio::test]
    async fn upsert_denormalizes_reference_value() {
        let store = store_with_schema().await;
        let saved = store
            .upsert_entity(component("plant.a", "CMP-1", "active"))
            .await
            .unwrap();
        assert_eq!(saved.reference_value.as_deref(), Some("CMP-1"));
    }

    #[tokio::test]
    async fn hierarchy_queries_are_segment_aligned() {
        let store = store_with_schema().await;
        for (path, tag) in [
            ("plant", "P"),
            ("plant.line1", "L1"),
            ("plant.line1.cell1", "C1"),
            ("plant.line10", "L10"),
        ] {
            store
                .upsert_entity(component(path, tag, "active"))
                .await
                .unwrap();
        }
        let ancestors = store
            .ancestors_of(&"org-1".to_string(), "plant.line1.cell1")
            .await
            .unwrap();
        let paths: Vec<&str> = ancestors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["plant", "plant.line1"]);

        let descendants = store
            .descendants_of(&"org-1".to_string(), "plant.line1")
            .await
            .unwrap();
        assert_eq!(descendants.len(), 1);
        assert_eq!(descendants[0].path, "plant.line1.cell1");

        let siblings = store
            .siblings_of(&"org-1".to_string(), "plant.line1")
            .await
            .unwrap();
        let paths: Vec<&str> = siblings.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["plant.line10"]);
    }

    #[tokio::test]
    async fn batch_fetch_is_tenant_scoped_and_logged() {
        let store = store_with_schema().await;
        let mine = store
            .upsert_entity(component("plant.a", "A", "active"))
            .await
            .unwrap();
        let mut foreign = component("plant.b", "B", "active");
        foreign.organization_id = "org-2".to_string();
        let foreign = store.upsert_entity(foreign).await.unwrap();

        let got = store
            .get_entities_by_ids(&"org-1".to_string(), &[mine.id.clone(), foreign.id])
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, mine.id);
        assert_eq!(store.batch_fetches().len(), 1);
    }

    #[test]
    fn filters_check_exists_membership_and_equality() {
        let entity = component("plant.a", "CMP-1", "active");
        assert!(matches_filter(&entity, &PropertyFilter::exists("status", true)));
        assert!(!matches_filter(&entity, &PropertyFilter::exists("missing", true)));
        assert!(matches_filter(&entity, &PropertyFilter::exists("missing", false)));
        assert!(matches_filter(
            &entity,
            &PropertyFilter::one_of("status", &["active", "retired"])
        ));
        assert!(matches_filter(&entity, &PropertyFilter::equals("tag", "CMP-1")));
        assert!(!matches_filter(&entity, &PropertyFilter::equals("tag", "CMP-2")));
    }

    #[test]
    fn array_properties_match_by_intersection() {
        let mut entity = component("plant.a", "CMP-1", "active");
        entity.properties.insert(
            "labels".to_string(),
            serde_json::json!(["critical", "rotating"]),
        );
        assert!(matches_filter(
            &entity,
            &PropertyFilter::one_of("labels", &["rotating"])
        ));
        assert!(!matches_filter(
            &entity,
            &PropertyFilter::one_of("labels", &["static"])
        ));
    }
}
