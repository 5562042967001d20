use crate::model::{
    FieldType, Id, JoinConnection, JoinDefinition, JoinDefinitionUpdate, JoinExecutionOptions,
    JoinType, NewJoinDefinition, PageInfo,
};
use crate::store::Store;
use anyhow::{bail, Context, Result};
use std::sync::Arc;

pub const DEFAULT_JOIN_LIMIT: i64 = 25;

/// Validates, persists and executes join definitions.
pub struct JoinEngine<S: Store> {
    store: Arc<S>,
}

impl<S: Store> JoinEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Validate and persist a new join definition.
    ///
    /// For REFERENCE joins the join field is resolved case-insensitively
    /// against the left schema and stored under its canonical name together
    /// with its kind. CROSS joins take no join field.
    pub async fn create(
        &self,
        organization_id: &Id,
        new_definition: NewJoinDefinition,
    ) -> Result<JoinDefinition> {
        if new_definition.name.trim().is_empty() {
            bail!("join name must not be empty");
        }
        if new_definition.left_entity_type.trim().is_empty()
            || new_definition.right_entity_type.trim().is_empty()
        {
            bail!("both entity types must be set");
        }

        let (join_field, join_field_type) = match new_definition.join_type {
            JoinType::Reference => {
                let requested = new_definition
                    .join_field
                    .as_deref()
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .context("a REFERENCE join requires a join field")?;
                let field = self
                    .validate_join_field(
                        organization_id,
                        &new_definition.left_entity_type,
                        &new_definition.right_entity_type,
                        requested,
                    )
                    .await?;
                (Some(field.0), Some(field.1))
            }
            JoinType::Cross => {
                if new_definition
                    .join_field
                    .as_deref()
                    .is_some_and(|f| !f.trim().is_empty())
                {
                    bail!("a CROSS join takes no join field");
                }
                self.require_schema(organization_id, &new_definition.left_entity_type)
                    .await?;
                self.require_schema(organization_id, &new_definition.right_entity_type)
                    .await?;
                (None, None)
            }
        };

        self.store
            .insert_join_definition(organization_id, &new_definition, join_field, join_field_type)
            .await
    }

    /// Apply a partial update; absent fields keep their stored value.
    pub async fn update(
        &self,
        organization_id: &Id,
        id: &Id,
        patch: JoinDefinitionUpdate,
    ) -> Result<Option<JoinDefinition>> {
        let Some(mut definition) = self.store.get_join_definition(organization_id, id).await?
        else {
            return Ok(None);
        };

        if let Some(name) = patch.name {
            if name.trim().is_empty() {
                bail!("join name must not be empty");
            }
            definition.name = name.trim().to_string();
        }
        if let Some(description) = patch.description {
            definition.description = Some(description);
        }

        let switched = patch
            .join_type
            .is_some_and(|join_type| join_type != definition.join_type);
        if let Some(join_type) = patch.join_type {
            definition.join_type = join_type;
        }
        match definition.join_type {
            JoinType::Cross => {
                if patch
                    .join_field
                    .as_deref()
                    .is_some_and(|f| !f.trim().is_empty())
                {
                    bail!("a CROSS join takes no join field");
                }
                definition.join_field = None;
                definition.join_field_type = None;
            }
            JoinType::Reference => {
                let requested = patch
                    .join_field
                    .as_deref()
                    .map(str::trim)
                    .filter(|f| !f.is_empty());
                match requested {
                    Some(requested) => {
                        let (canonical, kind) = self
                            .validate_join_field(
                                organization_id,
                                &definition.left_entity_type,
                                &definition.right_entity_type,
                                requested,
                            )
                            .await?;
                        definition.join_field = Some(canonical);
                        definition.join_field_type = Some(kind);
                    }
                    None if switched || definition.join_field.is_none() => {
                        bail!("a REFERENCE join requires a join field");
                    }
                    None => {}
                }
            }
        }
        if let Some(filters) = patch.left_filters {
            definition.left_filters = filters;
        }
        if let Some(filters) = patch.right_filters {
            definition.right_filters = filters;
        }
        if let Some(criteria) = patch.sort_criteria {
            definition.sort_criteria = criteria;
        }

        Ok(Some(self.store.update_join_definition(definition).await?))
    }

    pub async fn get(&self, organization_id: &Id, id: &Id) -> Result<Option<JoinDefinition>> {
        self.store.get_join_definition(organization_id, id).await
    }

    pub async fn list(&self, organization_id: &Id) -> Result<Vec<JoinDefinition>> {
        self.store.list_join_definitions(organization_id).await
    }

    pub async fn delete(&self, organization_id: &Id, id: &Id) -> Result<bool> {
        self.store.delete_join_definition(organization_id, id).await
    }

    /// Execute a stored join. Returns `None` when no definition exists under
    /// the id. An unset or non-positive limit falls back to the default and
    /// negative offsets clamp to zero.
    pub async fn execute(
        &self,
        organization_id: &Id,
        id: &Id,
        options: JoinExecutionOptions,
    ) -> Result<Option<JoinConnection>> {
        let Some(definition) = self.store.get_join_definition(organization_id, id).await? else {
            return Ok(None);
        };

        let limit = match options.pagination.limit {
            Some(limit) if limit > 0 => limit,
            _ => DEFAULT_JOIN_LIMIT,
        };
        let offset = options.pagination.offset.unwrap_or(0).max(0);

        let (edges, total_count) = self
            .store
            .execute_join(&definition, &options, limit, offset)
            .await?;

        let page_info = PageInfo {
            total_count,
            has_next_page: offset as usize + edges.len() < total_count,
            has_previous_page: offset > 0,
        };
        Ok(Some(JoinConnection { edges, page_info }))
    }

    async fn require_schema(
        &self,
        organization_id: &Id,
        entity_type: &str,
    ) -> Result<crate::model::EntitySchema> {
        self.store
            .get_schema_by_name(organization_id, entity_type)
            .await?
            .with_context(|| format!("no schema found for entity type {entity_type}"))
    }

    async fn validate_join_field(
        &self,
        organization_id: &Id,
        left_entity_type: &str,
        right_entity_type: &str,
        requested: &str,
    ) -> Result<(String, FieldType)> {
        let schema = self.require_schema(organization_id, left_entity_type).await?;
        let field = schema.find_field(requested).with_context(|| {
            format!("field {requested} does not exist on {left_entity_type}")
        })?;
        if !field.field_type.is_direct_reference() {
            bail!(
                "field {} on {left_entity_type} is not a reference field",
                field.name
            );
        }
        if let Some(target) = field.declared_target() {
            if !target.eq_ignore_ascii_case(right_entity_type) {
                bail!(
                    "field {} references {target}, not {right_entity_type}",
                    field.name
                );
            }
        }
        Ok((field.name.clone(), field.field_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Entity, EntitySchema, FieldDefinition, JoinSide, JoinSortCriterion, Pagination,
        SortDirection,
    };
    use crate::store::{EntityStore, MemoryStore, SchemaStore};
    use std::collections::HashMap;

    fn new_join(join_type: JoinType, join_field: Option<&str>) -> NewJoinDefinition {
        NewJoinDefinition {
            name: "components by team".to_string(),
            description: None,
            join_type,
            left_entity_type: "Component".to_string(),
            right_entity_type: "Team".to_string(),
            join_field: join_field.map(str::to_string),
            left_filters: Vec::new(),
            right_filters: Vec::new(),
            sort_criteria: Vec::new(),
        }
    }

    async fn engine() -> (Arc<MemoryStore>, JoinEngine<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_schema(EntitySchema::new(
                "org-1".to_string(),
                "Team",
                vec![FieldDefinition::new("code", FieldType::Reference)],
            ))
            .await
            .unwrap();
        store
            .upsert_schema(EntitySchema::new(
                "org-1".to_string(),
                "Component",
                vec![
                    FieldDefinition::new("name", FieldType::String),
                    FieldDefinition::new("ownerTeam", FieldType::EntityReference)
                        .with_target("Team"),
                ],
            ))
            .await
            .unwrap();
        (store.clone(), JoinEngine::new(store))
    }

    #[tokio::test]
    async fn create_canonicalizes_the_join_field() {
        let (_, engine) = engine().await;
        let definition = engine
            .create(
                &"org-1".to_string(),
                new_join(JoinType::Reference, Some("OWNERTEAM")),
            )
            .await
            .unwrap();
        assert_eq!(definition.join_field.as_deref(), Some("ownerTeam"));
        assert_eq!(definition.join_field_type, Some(FieldType::EntityReference));
    }

    #[tokio::test]
    async fn create_rejects_non_reference_fields() {
        let (_, engine) = engine().await;
        let err = engine
            .create(
                &"org-1".to_string(),
                new_join(JoinType::Reference, Some("name")),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a reference field"));
    }

    #[tokio::test]
    async fn create_rejects_a_target_type_mismatch() {
        let (_, engine) = engine().await;
        let mut new_definition = new_join(JoinType::Reference, Some("ownerTeam"));
        new_definition.right_entity_type = "Assembly".to_string();
        let err = engine
            .create(&"org-1".to_string(), new_definition)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("references Team"));
    }

    #[tokio::test]
    async fn create_requires_a_join_field_for_reference_joins() {
        let (_, engine) = engine().await;
        let err = engine
            .create(&"org-1".to_string(), new_join(JoinType::Reference, None))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("requires a join field"));
    }

    #[tokio::test]
    async fn cross_joins_reject_a_join_field() {
        let (_, engine) = engine().await;
        let err = engine
            .create(
                &"org-1".to_string(),
                new_join(JoinType::Cross, Some("ownerTeam")),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("takes no join field"));
    }

    #[tokio::test]
    async fn update_patches_only_present_fields() {
        let (_, engine) = engine().await;
        let org = "org-1".to_string();
        let created = engine
            .create(&org, new_join(JoinType::Reference, Some("ownerTeam")))
            .await
            .unwrap();

        let updated = engine
            .update(
                &org,
                &created.id,
                JoinDefinitionUpdate {
                    description: Some("ownership mapping".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, created.name);
        assert_eq!(updated.description.as_deref(), Some("ownership mapping"));
        assert_eq!(updated.join_field, created.join_field);
    }

    #[tokio::test]
    async fn switching_to_cross_clears_the_join_field() {
        let (_, engine) = engine().await;
        let org = "org-1".to_string();
        let created = engine
            .create(&org, new_join(JoinType::Reference, Some("ownerTeam")))
            .await
            .unwrap();

        let updated = engine
            .update(
                &org,
                &created.id,
                JoinDefinitionUpdate {
                    join_type: Some(JoinType::Cross),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.join_type, JoinType::Cross);
        assert_eq!(updated.join_field, None);
        assert_eq!(updated.join_field_type, None);
    }

    #[tokio::test]
    async fn switching_to_reference_requires_a_join_field() {
        let (_, engine) = engine().await;
        let org = "org-1".to_string();
        let created = engine
            .create(&org, new_join(JoinType::Cross, None))
            .await
            .unwrap();

        let err = engine
            .update(
                &org,
                &created.id,
                JoinDefinitionUpdate {
                    join_type: Some(JoinType::Reference),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("requires a join field"));

        let updated = engine
            .update(
                &org,
                &created.id,
                JoinDefinitionUpdate {
                    join_type: Some(JoinType::Reference),
                    join_field: Some("ownerTeam".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.join_type, JoinType::Reference);
        assert_eq!(updated.join_field.as_deref(), Some("ownerTeam"));
    }

    #[tokio::test]
    async fn executing_an_unknown_definition_is_none() {
        let (_, engine) = engine().await;
        let result = engine
            .execute(
                &"org-1".to_string(),
                &crate::model::generate_id(),
                JoinExecutionOptions::default(),
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    async fn seed_cross_fixture(store: &MemoryStore) {
        // 7 components x 5 teams: 35 edges.
        for i in 0..7 {
            store
                .upsert_entity(Entity::new(
                    "org-1".to_string(),
                    "Component",
                    "schema".to_string(),
                    &format!("plant.c{i}"),
                    HashMap::from([("name".to_string(), serde_json::json!(format!("c{i}")))]),
                ))
                .await
                .unwrap();
        }
        for i in 0..5 {
            store
                .upsert_entity(Entity::new(
                    "org-1".to_string(),
                    "Team",
                    "schema".to_string(),
                    &format!("org.t{i}"),
                    HashMap::from([("code".to_string(), serde_json::json!(format!("T-{i}")))]),
                ))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn pagination_defaults_and_boundaries() {
        let (store, engine) = engine().await;
        let org = "org-1".to_string();
        seed_cross_fixture(&store).await;
        let definition = engine
            .create(&org, new_join(JoinType::Cross, None))
            .await
            .unwrap();

        // Default limit, first page.
        let page = engine
            .execute(&org, &definition.id, JoinExecutionOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(page.edges.len(), 25);
        assert_eq!(page.page_info.total_count, 35);
        assert!(page.page_info.has_next_page);
        assert!(!page.page_info.has_previous_page);

        // Second page is the remainder.
        let page = engine
            .execute(
                &org,
                &definition.id,
                JoinExecutionOptions {
                    pagination: Pagination {
                        limit: None,
                        offset: Some(25),
                    },
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(page.edges.len(), 10);
        assert!(!page.page_info.has_next_page);
        assert!(page.page_info.has_previous_page);

        // Non-positive limit falls back, negative offset clamps.
        let page = engine
            .execute(
                &org,
                &definition.id,
                JoinExecutionOptions {
                    pagination: Pagination {
                        limit: Some(0),
                        offset: Some(-10),
                    },
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(page.edges.len(), 25);
        assert!(!page.page_info.has_previous_page);
    }

    #[tokio::test]
    async fn has_next_page_tracks_the_total_past_the_window() {
        let (store, engine) = engine().await;
        let org = "org-1".to_string();
        seed_cross_fixture(&store).await;
        let definition = engine
            .create(&org, new_join(JoinType::Cross, None))
            .await
            .unwrap();
        let window = Pagination {
            limit: Some(10),
            offset: Some(20),
        };

        // 35 edges: a full page remains past offset 30.
        let page = engine
            .execute(
                &org,
                &definition.id,
                JoinExecutionOptions {
                    pagination: window,
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(page.edges.len(), 10);
        assert!(page.page_info.has_next_page);

        // Narrow the left side to 5 components: 25 edges, the window covers
        // the tail.
        let page = engine
            .execute(
                &org,
                &definition.id,
                JoinExecutionOptions {
                    pagination: window,
                    extra_left_filters: vec![crate::model::PropertyFilter::one_of(
                        "name",
                        &["c0", "c1", "c2", "c3", "c4"],
                    )],
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(page.page_info.total_count, 25);
        assert_eq!(page.edges.len(), 5);
        assert!(!page.page_info.has_next_page);
    }

    #[tokio::test]
    async fn execution_sort_is_appended_after_the_stored_criteria() {
        let (store, engine) = engine().await;
        let org = "org-1".to_string();
        seed_cross_fixture(&store).await;
        let mut new_definition = new_join(JoinType::Cross, None);
        new_definition.sort_criteria = vec![JoinSortCriterion {
            side: JoinSide::Left,
            key: "name".to_string(),
            direction: SortDirection::Asc,
        }];
        let definition = engine.create(&org, new_definition).await.unwrap();

        let page = engine
            .execute(
                &org,
                &definition.id,
                JoinExecutionOptions {
                    pagination: Pagination {
                        limit: Some(5),
                        offset: None,
                    },
                    sort_criteria: Some(vec![JoinSortCriterion {
                        side: JoinSide::Right,
                        key: "code".to_string(),
                        direction: SortDirection::Desc,
                    }]),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        // The stored left-ascending sort stays primary; the execution
        // criterion only orders edges that tie on it.
        assert_eq!(
            page.edges[0].left.properties["name"],
            serde_json::json!("c0")
        );
        assert_eq!(
            page.edges[0].right.properties["code"],
            serde_json::json!("T-4")
        );
        assert_eq!(
            page.edges[4].right.properties["code"],
            serde_json::json!("T-0")
        );
    }

    #[tokio::test]
    async fn cross_joins_require_schemas_on_both_sides() {
        let (_, engine) = engine().await;
        let mut new_definition = new_join(JoinType::Cross, None);
        new_definition.left_entity_type = "Widget".to_string();
        let err = engine
            .create(&"org-1".to_string(), new_definition)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no schema found"));
    }

    #[tokio::test]
    async fn execution_filters_narrow_both_sides() {
        let (store, engine) = engine().await;
        let org = "org-1".to_string();
        seed_cross_fixture(&store).await;
        let definition = engine
            .create(&org, new_join(JoinType::Cross, None))
            .await
            .unwrap();

        let page = engine
            .execute(
                &org,
                &definition.id,
                JoinExecutionOptions {
                    extra_left_filters: vec![crate::model::PropertyFilter::equals("name", "c1")],
                    extra_right_filters: vec![crate::model::PropertyFilter::one_of(
                        "code",
                        &["T-0", "T-1"],
                    )],
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(page.page_info.total_count, 2);
        assert!(!page.page_info.has_next_page);
    }
}
