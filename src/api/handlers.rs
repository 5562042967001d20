use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::logic::{HierarchyResolver, JoinEngine, LinkHydrator, LoaderScope, SchemaFieldIndex};
use crate::model::{
    Entity, EntityHierarchy, Id, JoinConnection, JoinDefinition, JoinDefinitionUpdate,
    JoinExecutionOptions, NewJoinDefinition,
};
use crate::store::Store;

/// Shared state handed to every handler. The loader scope itself is built
/// per request; only the store, the field index and the batching settings
/// live for the process.
pub struct AppState<S> {
    pub store: Arc<S>,
    pub field_index: Arc<SchemaFieldIndex>,
    pub batch_window: Duration,
    pub max_batch_size: usize,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            field_index: self.field_index.clone(),
            batch_window: self.batch_window,
            max_batch_size: self.max_batch_size,
        }
    }
}

impl<S: Store> AppState<S> {
    pub fn scope(&self, organization_id: &Id) -> LoaderScope<S> {
        LoaderScope::new(
            self.store.clone(),
            organization_id.clone(),
            self.batch_window,
            self.max_batch_size,
        )
    }

    pub fn hydrator(&self) -> LinkHydrator<S> {
        LinkHydrator::new(self.store.clone(), self.field_index.clone())
    }
}

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub ids: Vec<Id>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal_error(err: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(&err.to_string())),
    )
}

fn not_found(message: &str) -> ApiError {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::new(message)))
}

fn bad_request(err: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(&err.to_string())),
    )
}

pub async fn get_linked_entities<S: Store>(
    State(state): State<AppState<S>>,
    Path((org_id, entity_id)): Path<(Id, Id)>,
) -> Result<Json<Entity>, ApiError> {
    let scope = state.scope(&org_id);
    match state
        .hydrator()
        .resolve_linked_entities(&scope, &entity_id)
        .await
    {
        Ok(Some((entity, bag))) => {
            if !bag.is_empty() {
                log::warn!(
                    "partial link resolution for entity {entity_id}: {}",
                    bag.messages().join("; ")
                );
            }
            Ok(Json(entity))
        }
        Ok(None) => Err(not_found("Entity not found")),
        Err(e) => Err(internal_error(e)),
    }
}

pub async fn resolve_entities<S: Store>(
    State(state): State<AppState<S>>,
    Path(org_id): Path<Id>,
    RequestJson(request): RequestJson<ResolveRequest>,
) -> Result<Json<Vec<Option<Entity>>>, ApiError> {
    let scope = state.scope(&org_id);
    match state.hydrator().resolve_by_ids(&scope, &request.ids).await {
        Ok((entities, bag)) => {
            if !bag.is_empty() {
                log::warn!(
                    "partial link resolution for {} ids: {}",
                    request.ids.len(),
                    bag.messages().join("; ")
                );
            }
            Ok(Json(entities))
        }
        Err(e) => Err(internal_error(e)),
    }
}

pub async fn get_hierarchy<S: Store>(
    State(state): State<AppState<S>>,
    Path((org_id, entity_id)): Path<(Id, Id)>,
) -> Result<Json<EntityHierarchy>, ApiError> {
    let scope = state.scope(&org_id);
    if require_entity(&scope, &entity_id).await?.is_none() {
        return Err(not_found("Entity not found"));
    }
    let resolver = HierarchyResolver::new(state.store.clone());
    match resolver.hierarchy(&scope, &entity_id).await {
        Ok((hierarchy, bag)) => {
            if !bag.is_empty() {
                log::warn!(
                    "partial hierarchy for entity {entity_id}: {}",
                    bag.messages().join("; ")
                );
            }
            Ok(Json(hierarchy))
        }
        Err(e) => Err(internal_error(e)),
    }
}

pub async fn get_ancestors<S: Store>(
    State(state): State<AppState<S>>,
    Path((org_id, entity_id)): Path<(Id, Id)>,
) -> Result<Json<ListResponse<Entity>>, ApiError> {
    let scope = state.scope(&org_id);
    if require_entity(&scope, &entity_id).await?.is_none() {
        return Err(not_found("Entity not found"));
    }
    let resolver = HierarchyResolver::new(state.store.clone());
    match resolver.ancestors(&scope, &entity_id).await {
        Ok(items) => {
            let total = items.len();
            Ok(Json(ListResponse { items, total }))
        }
        Err(e) => Err(internal_error(e)),
    }
}

pub async fn get_descendants<S: Store>(
    State(state): State<AppState<S>>,
    Path((org_id, entity_id)): Path<(Id, Id)>,
) -> Result<Json<ListResponse<Entity>>, ApiError> {
    let scope = state.scope(&org_id);
    if require_entity(&scope, &entity_id).await?.is_none() {
        return Err(not_found("Entity not found"));
    }
    let resolver = HierarchyResolver::new(state.store.clone());
    match resolver.descendants(&scope, &entity_id).await {
        Ok(items) => {
            let total = items.len();
            Ok(Json(ListResponse { items, total }))
        }
        Err(e) => Err(internal_error(e)),
    }
}

pub async fn get_children<S: Store>(
    State(state): State<AppState<S>>,
    Path((org_id, entity_id)): Path<(Id, Id)>,
) -> Result<Json<ListResponse<Entity>>, ApiError> {
    let scope = state.scope(&org_id);
    if require_entity(&scope, &entity_id).await?.is_none() {
        return Err(not_found("Entity not found"));
    }
    let resolver = HierarchyResolver::new(state.store.clone());
    match resolver.children(&scope, &entity_id).await {
        Ok(items) => {
            let total = items.len();
            Ok(Json(ListResponse { items, total }))
        }
        Err(e) => Err(internal_error(e)),
    }
}

pub async fn get_siblings<S: Store>(
    State(state): State<AppState<S>>,
    Path((org_id, entity_id)): Path<(Id, Id)>,
) -> Result<Json<ListResponse<Entity>>, ApiError> {
    let scope = state.scope(&org_id);
    if require_entity(&scope, &entity_id).await?.is_none() {
        return Err(not_found("Entity not found"));
    }
    let resolver = HierarchyResolver::new(state.store.clone());
    match resolver.siblings(&scope, &entity_id).await {
        Ok(items) => {
            let total = items.len();
            Ok(Json(ListResponse { items, total }))
        }
        Err(e) => Err(internal_error(e)),
    }
}

async fn require_entity<S: Store>(
    scope: &LoaderScope<S>,
    entity_id: &Id,
) -> Result<Option<Entity>, ApiError> {
    scope.load(entity_id).await.map_err(internal_error)
}

pub async fn create_join<S: Store>(
    State(state): State<AppState<S>>,
    Path(org_id): Path<Id>,
    RequestJson(new_definition): RequestJson<NewJoinDefinition>,
) -> Result<(StatusCode, Json<JoinDefinition>), ApiError> {
    let engine = JoinEngine::new(state.store.clone());
    match engine.create(&org_id, new_definition).await {
        Ok(definition) => Ok((StatusCode::CREATED, Json(definition))),
        Err(e) => Err(bad_request(e)),
    }
}

pub async fn list_joins<S: Store>(
    State(state): State<AppState<S>>,
    Path(org_id): Path<Id>,
) -> Result<Json<ListResponse<JoinDefinition>>, ApiError> {
    let engine = JoinEngine::new(state.store.clone());
    match engine.list(&org_id).await {
        Ok(items) => {
            let total = items.len();
            Ok(Json(ListResponse { items, total }))
        }
        Err(e) => Err(internal_error(e)),
    }
}

pub async fn get_join<S: Store>(
    State(state): State<AppState<S>>,
    Path((org_id, join_id)): Path<(Id, Id)>,
) -> Result<Json<JoinDefinition>, ApiError> {
    let engine = JoinEngine::new(state.store.clone());
    match engine.get(&org_id, &join_id).await {
        Ok(Some(definition)) => Ok(Json(definition)),
        Ok(None) => Err(not_found("Join definition not found")),
        Err(e) => Err(internal_error(e)),
    }
}

pub async fn update_join<S: Store>(
    State(state): State<AppState<S>>,
    Path((org_id, join_id)): Path<(Id, Id)>,
    RequestJson(patch): RequestJson<JoinDefinitionUpdate>,
) -> Result<Json<JoinDefinition>, ApiError> {
    let engine = JoinEngine::new(state.store.clone());
    match engine.update(&org_id, &join_id, patch).await {
        Ok(Some(definition)) => Ok(Json(definition)),
        Ok(None) => Err(not_found("Join definition not found")),
        Err(e) => Err(bad_request(e)),
    }
}

pub async fn delete_join<S: Store>(
    State(state): State<AppState<S>>,
    Path((org_id, join_id)): Path<(Id, Id)>,
) -> Result<StatusCode, ApiError> {
    let engine = JoinEngine::new(state.store.clone());
    match engine.delete(&org_id, &join_id).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(not_found("Join definition not found")),
        Err(e) => Err(internal_error(e)),
    }
}

pub async fn execute_join<S: Store>(
    State(state): State<AppState<S>>,
    Path((org_id, join_id)): Path<(Id, Id)>,
    RequestJson(options): RequestJson<JoinExecutionOptions>,
) -> Result<Json<JoinConnection>, ApiError> {
    let engine = JoinEngine::new(state.store.clone());
    match engine.execute(&org_id, &join_id, options).await {
        Ok(Some(connection)) => Ok(Json(connection)),
        Ok(None) => Err(not_found("Join definition not found")),
        Err(e) => Err(internal_error(e)),
    }
}
