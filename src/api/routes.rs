use axum::{
    routing::{get, post},
    Router,
};

use crate::api::handlers::{self, AppState};
use crate::store::Store;

pub fn create_router<S: Store + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Entity resolution
        .route(
            "/organizations/:org_id/entities/resolve",
            post(handlers::resolve_entities::<S>),
        )
        .route(
            "/organizations/:org_id/entities/:entity_id/linked-entities",
            get(handlers::get_linked_entities::<S>),
        )
        // Hierarchy views
        .route(
            "/organizations/:org_id/entities/:entity_id/hierarchy",
            get(handlers::get_hierarchy::<S>),
        )
        .route(
            "/organizations/:org_id/entities/:entity_id/ancestors",
            get(handlers::get_ancestors::<S>),
        )
        .route(
            "/organizations/:org_id/entities/:entity_id/descendants",
            get(handlers::get_descendants::<S>),
        )
        .route(
            "/organizations/:org_id/entities/:entity_id/children",
            get(handlers::get_children::<S>),
        )
        .route(
            "/organizations/:org_id/entities/:entity_id/siblings",
            get(handlers::get_siblings::<S>),
        )
        // Join definitions
        .route(
            "/organizations/:org_id/joins",
            get(handlers::list_joins::<S>).post(handlers::create_join::<S>),
        )
        .route(
            "/organizations/:org_id/joins/:join_id",
            get(handlers::get_join::<S>)
                .patch(handlers::update_join::<S>)
                .delete(handlers::delete_join::<S>),
        )
        .route(
            "/organizations/:org_id/joins/:join_id/execute",
            post(handlers::execute_join::<S>),
        )
}
