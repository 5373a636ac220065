use std::sync::Arc;
use tracing::instrument;

use crate::models::{
    AuthenticatedUser, CreateStoreRequest, CreateStoreServiceRequest, Role, ServiceError,
    ServiceResult, Store, StoreListResponse, StoreService, UpdateStoreRequest, Validate,
};
use crate::repositories::StoreRepository;
use crate::services::insert_with_fresh_id;

/// Store directory: browsing for everyone, management for owners and admins
pub struct StoreDirectory {
    repository: Arc<dyn StoreRepository>,
}

impl StoreDirectory {
    pub fn new(repository: Arc<dyn StoreRepository>) -> Self {
        Self { repository }
    }

    /// Active stores, optionally narrowed by a search term
    #[instrument(skip(self))]
    pub async fn list_stores(&self, search: Option<&str>) -> ServiceResult<StoreListResponse> {
        let mut stores: Vec<Store> = self
            .repository
            .find_all(true)
            .await?
            .into_iter()
            .filter(|store| search.map_or(true, |term| store.matches_search(term)))
            .collect();
        stores.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

        let total_count = stores.len();
        crate::info_with_trace!("Found {} stores matching criteria", total_count);

        Ok(StoreListResponse {
            stores,
            total_count,
        })
    }

    /// Deactivated stores are only visible to their owner and admins
    #[instrument(skip(self, viewer))]
    pub async fn get_store(
        &self,
        id: &str,
        viewer: Option<&AuthenticatedUser>,
    ) -> ServiceResult<Store> {
        let store = self.find_store(id).await?;
        if !store.is_active && !viewer.is_some_and(|user| user.can_act_for(&store.owner_id)) {
            return Err(ServiceError::StoreNotFound { id: id.to_string() });
        }
        Ok(store)
    }

    async fn find_store(&self, id: &str) -> ServiceResult<Store> {
        if id.trim().is_empty() {
            return Err(ServiceError::ValidationError {
                message: "Store ID cannot be empty".to_string(),
            });
        }

        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::StoreNotFound { id: id.to_string() })
    }

    #[instrument(skip(self))]
    pub async fn stores_for_owner(&self, owner_id: &str) -> ServiceResult<Vec<Store>> {
        let mut stores = self.repository.find_by_owner(owner_id).await?;
        stores.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(stores)
    }

    #[instrument(skip(self, owner, request), fields(owner = %owner.user_id))]
    pub async fn create_store(
        &self,
        owner: &AuthenticatedUser,
        request: CreateStoreRequest,
    ) -> ServiceResult<Store> {
        if !matches!(owner.role, Role::Supplier | Role::Admin) {
            return Err(ServiceError::forbidden(
                "Only suppliers can register stores",
            ));
        }
        request.validate()?;

        let store = insert_with_fresh_id(Store::new(owner.user_id.clone(), request), |store| {
            self.repository.create(store)
        })
        .await?;

        crate::info_with_trace!(store_id = %store.id, "Store created");
        Ok(store)
    }

    #[instrument(skip(self, actor, request), fields(actor = %actor.user_id))]
    pub async fn update_store(
        &self,
        actor: &AuthenticatedUser,
        id: &str,
        request: UpdateStoreRequest,
    ) -> ServiceResult<Store> {
        request.validate()?;

        let mut store = self.owned_store(actor, id).await?;
        store.update(request);
        let store = self.repository.update(store).await?;

        crate::info_with_trace!(store_id = %store.id, "Store updated");
        Ok(store)
    }

    /// Soft delete; existing orders keep pointing at the store
    #[instrument(skip(self, actor), fields(actor = %actor.user_id))]
    pub async fn delete_store(&self, actor: &AuthenticatedUser, id: &str) -> ServiceResult<()> {
        self.owned_store(actor, id).await?;
        self.repository.soft_delete(id).await?;

        crate::info_with_trace!(store_id = %id, "Store deactivated");
        Ok(())
    }

    #[instrument(skip(self, actor, request), fields(actor = %actor.user_id))]
    pub async fn add_service(
        &self,
        actor: &AuthenticatedUser,
        store_id: &str,
        request: CreateStoreServiceRequest,
    ) -> ServiceResult<StoreService> {
        request.validate()?;

        let mut store = self.owned_store(actor, store_id).await?;
        let service = store.add_service(request);
        self.repository.update(store).await?;

        crate::info_with_trace!(store_id = %store_id, service_id = %service.id, "Service offering added");
        Ok(service)
    }

    #[instrument(skip(self, actor), fields(actor = %actor.user_id))]
    pub async fn remove_service(
        &self,
        actor: &AuthenticatedUser,
        store_id: &str,
        service_id: &str,
    ) -> ServiceResult<()> {
        let mut store = self.owned_store(actor, store_id).await?;
        if !store.remove_service(service_id) {
            return Err(ServiceError::ServiceOfferingNotFound {
                store_id: store_id.to_string(),
                service_id: service_id.to_string(),
            });
        }
        self.repository.update(store).await?;

        crate::info_with_trace!(store_id = %store_id, service_id = %service_id, "Service offering removed");
        Ok(())
    }

    async fn owned_store(&self, actor: &AuthenticatedUser, id: &str) -> ServiceResult<Store> {
        let store = self.find_store(id).await?;
        if !actor.can_act_for(&store.owner_id) {
            crate::warn_with_trace!(store_id = %id, "Store change rejected for non-owner");
            return Err(ServiceError::forbidden(
                "Only the store owner can manage this store",
            ));
        }
        Ok(store)
    }
}
