use crate::logic::errors::ErrorBag;
use crate::logic::loader::LoaderScope;
use crate::model::{Entity, EntityHierarchy, Id};
use crate::store::EntityStore;
use anyhow::Result;
use std::sync::Arc;

/// Resolves the ancestry neighborhood of an entity from its materialized
/// path.
///
/// The full hierarchy view fetches its categories concurrently; a failing
/// category is reported in the error bag and left empty instead of failing
/// the whole view. Every resolved relative is primed into the scope so later
/// link hydration does not refetch it.
pub struct HierarchyResolver<S: EntityStore> {
    store: Arc<S>,
}

impl<S: EntityStore> HierarchyResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn hierarchy(
        &self,
        scope: &LoaderScope<S>,
        entity_id: &Id,
    ) -> Result<(EntityHierarchy, ErrorBag)> {
        let current = self.require(scope, entity_id).await?;
        let organization_id = scope.organization_id();
        let mut bag = ErrorBag::new();

        let (ancestors, children, siblings) = tokio::join!(
            self.store.ancestors_of(organization_id, &current.path),
            self.store.children_of(organization_id, &current.path),
            self.store.siblings_of(organization_id, &current.path),
        );
        let ancestors = Self::unwrap_category(ancestors, "ancestors", &mut bag);
        let children = Self::unwrap_category(children, "children", &mut bag);
        let siblings = Self::unwrap_category(siblings, "siblings", &mut bag);

        for relative in ancestors.iter().chain(&children).chain(&siblings) {
            scope.prime(relative);
        }

        Ok((
            EntityHierarchy {
                current,
                ancestors,
                children,
                siblings,
            },
            bag,
        ))
    }

    pub async fn ancestors(&self, scope: &LoaderScope<S>, entity_id: &Id) -> Result<Vec<Entity>> {
        let current = self.require(scope, entity_id).await?;
        self.primed(scope, self.store.ancestors_of(scope.organization_id(), &current.path).await?)
    }

    pub async fn descendants(&self, scope: &LoaderScope<S>, entity_id: &Id) -> Result<Vec<Entity>> {
        let current = self.require(scope, entity_id).await?;
        self.primed(scope, self.store.descendants_of(scope.organization_id(), &current.path).await?)
    }

    pub async fn children(&self, scope: &LoaderScope<S>, entity_id: &Id) -> Result<Vec<Entity>> {
        let current = self.require(scope, entity_id).await?;
        self.primed(scope, self.store.children_of(scope.organization_id(), &current.path).await?)
    }

    pub async fn siblings(&self, scope: &LoaderScope<S>, entity_id: &Id) -> Result<Vec<Entity>> {
        let current = self.require(scope, entity_id).await?;
        self.primed(scope, self.store.siblings_of(scope.organization_id(), &current.path).await?)
    }

    async fn require(&self, scope: &LoaderScope<S>, entity_id: &Id) -> Result<Entity> {
        scope
            .load(entity_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("entity {entity_id} not found"))
    }

    fn primed(&self, scope: &LoaderScope<S>, entities: Vec<Entity>) -> Result<Vec<Entity>> {
        for entity in &entities {
            scope.prime(entity);
        }
        Ok(entities)
    }

    fn unwrap_category(
        result: Result<Vec<Entity>>,
        category: &str,
        bag: &mut ErrorBag,
    ) -> Vec<Entity> {
        match result {
            Ok(entities) => entities,
            Err(err) => {
                bag.push(format!("resolving {category} failed: {err}"));
                Vec::new()
            }
        }
    }
}
