use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{instrument, Instrument};

use crate::models::{
    AuthenticatedUser, CreateOrderRequest, OrderListResponse, OrderStatus, OrderedService,
    RepositoryError, Role, ServiceError, ServiceOrder, ServiceResult, UpdateOrderStatusRequest,
    User, Validate,
};
use crate::repositories::{OrderRepository, StoreRepository, UserRepository};
use crate::services::{insert_with_fresh_id, NotificationService};

/// How far back a customer's recently updated orders stay in their feed
const RECENT_UPDATE_WINDOW_DAYS: i64 = 7;

/// Booking lifecycle: creation, role-filtered reads and status transitions
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    stores: Arc<dyn StoreRepository>,
    users: Arc<dyn UserRepository>,
    notifier: Arc<NotificationService>,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        stores: Arc<dyn StoreRepository>,
        users: Arc<dyn UserRepository>,
        notifier: Arc<NotificationService>,
    ) -> Self {
        Self {
            orders,
            stores,
            users,
            notifier,
        }
    }

    #[instrument(skip(self, actor, request), fields(actor = %actor.user_id, store_id = %request.store_id))]
    pub async fn create_order(
        &self,
        actor: &AuthenticatedUser,
        request: CreateOrderRequest,
    ) -> ServiceResult<ServiceOrder> {
        if !matches!(actor.role, Role::Customer | Role::Admin) {
            return Err(ServiceError::forbidden("Only customers can book services"));
        }
        request.validate()?;

        let store = self
            .stores
            .find_by_id(&request.store_id)
            .await?
            .ok_or_else(|| ServiceError::StoreNotFound {
                id: request.store_id.clone(),
            })?;

        if !store.is_active {
            return Err(ServiceError::StoreInactive { id: store.id });
        }

        let services = request
            .service_ids
            .iter()
            .map(|service_id| {
                store
                    .find_service(service_id)
                    .map(OrderedService::from)
                    .ok_or_else(|| ServiceError::ServiceOfferingNotFound {
                        store_id: store.id.clone(),
                        service_id: service_id.clone(),
                    })
            })
            .collect::<ServiceResult<Vec<_>>>()?;

        let order = ServiceOrder::new(
            actor.user_id.clone(),
            &store,
            services,
            request.scheduled_at,
            request.notes,
        );
        let order = insert_with_fresh_id(order, |order| self.orders.create(order)).await?;

        crate::info_with_trace!(
            order_id = %order.id,
            total_price = %order.total_price,
            total_duration_minutes = order.total_duration_minutes,
            "Order created"
        );

        self.notify(order.clone(), BookingChange::Created);

        Ok(order)
    }

    /// Orders visible to the actor, earliest appointment first
    #[instrument(skip(self, actor), fields(actor = %actor.user_id, role = %actor.role))]
    pub async fn list_orders(
        &self,
        actor: &AuthenticatedUser,
        status: Option<OrderStatus>,
    ) -> ServiceResult<OrderListResponse> {
        let mut orders: Vec<ServiceOrder> = self
            .visible_orders(actor)
            .await?
            .into_iter()
            .filter(|order| status.map_or(true, |status| order.status == status))
            .collect();
        orders.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at));

        let total_count = orders.len();
        crate::info_with_trace!("Found {} orders", total_count);

        Ok(OrderListResponse {
            orders,
            total_count,
        })
    }

    #[instrument(skip(self, actor), fields(actor = %actor.user_id))]
    pub async fn get_order(&self, actor: &AuthenticatedUser, id: &str) -> ServiceResult<ServiceOrder> {
        let order = self
            .orders
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound { id: id.to_string() })?;

        if !actor.is_admin() && !order.is_participant(&actor.user_id) {
            return Err(ServiceError::forbidden(
                "Only the customer or the store owner can view this order",
            ));
        }

        Ok(order)
    }

    #[instrument(
        skip(self, actor, request),
        fields(actor = %actor.user_id, order_id = %id, status = %request.status)
    )]
    pub async fn update_status(
        &self,
        actor: &AuthenticatedUser,
        id: &str,
        request: UpdateOrderStatusRequest,
    ) -> ServiceResult<ServiceOrder> {
        request.validate()?;

        let order = self.get_order(actor, id).await?;
        let previous = order.status;

        if !previous.can_transition_to(request.status) {
            return Err(ServiceError::InvalidStatusTransition {
                from: previous,
                to: request.status,
            });
        }

        if request.status == OrderStatus::Completed
            && !actor.is_admin()
            && actor.user_id != order.store_owner_id
        {
            return Err(ServiceError::forbidden(
                "Only the store owner can complete an order",
            ));
        }

        let updated = match self
            .orders
            .update_status(id, previous, request.status, request.reason)
            .await
        {
            Ok(updated) => updated,
            Err(RepositoryError::ConditionalCheckFailed { .. }) => {
                // Another writer moved the order first
                let current = self
                    .orders
                    .find_by_id(id)
                    .await?
                    .map_or(previous, |order| order.status);
                crate::warn_with_trace!(current = %current, "Order status changed concurrently");
                return Err(ServiceError::InvalidStatusTransition {
                    from: current,
                    to: request.status,
                });
            }
            Err(e) => return Err(e.into()),
        };

        crate::info_with_trace!(from = %previous, to = %updated.status, "Order status updated");

        self.notify(
            updated.clone(),
            BookingChange::StatusChanged {
                previous,
                changed_by: actor.user_id.clone(),
            },
        );

        Ok(updated)
    }

    /// Orders needing the actor's attention, most recently updated first
    #[instrument(skip(self, actor), fields(actor = %actor.user_id, role = %actor.role))]
    pub async fn notifications(&self, actor: &AuthenticatedUser) -> ServiceResult<Vec<ServiceOrder>> {
        let recent_cutoff = Utc::now() - Duration::days(RECENT_UPDATE_WINDOW_DAYS);

        let mut orders: Vec<ServiceOrder> = self
            .visible_orders(actor)
            .await?
            .into_iter()
            .filter(|order| match actor.role {
                Role::Customer => {
                    order.status == OrderStatus::Pending || order.updated_at >= recent_cutoff
                }
                Role::Supplier | Role::Admin => order.status == OrderStatus::Pending,
            })
            .collect();
        orders.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Ok(orders)
    }

    async fn visible_orders(&self, actor: &AuthenticatedUser) -> ServiceResult<Vec<ServiceOrder>> {
        let orders = match actor.role {
            Role::Customer => self.orders.find_by_customer(&actor.user_id).await?,
            Role::Supplier => self.orders.find_by_store_owner(&actor.user_id).await?,
            Role::Admin => self.orders.find_all().await?,
        };
        Ok(orders)
    }

    /// Fan-out runs on its own task; the response never waits on the mail
    /// relay or the event bus.
    fn notify(&self, order: ServiceOrder, change: BookingChange) {
        let users = Arc::clone(&self.users);
        let notifier = Arc::clone(&self.notifier);

        tokio::spawn(
            async move {
                let customer = lookup_user(users.as_ref(), &order.customer_id).await;
                let owner = lookup_user(users.as_ref(), &order.store_owner_id).await;

                match change {
                    BookingChange::Created => {
                        notifier
                            .order_created(&order, customer.as_ref(), owner.as_ref())
                            .await;
                    }
                    BookingChange::StatusChanged {
                        previous,
                        changed_by,
                    } => {
                        notifier
                            .order_status_changed(
                                &order,
                                previous,
                                &changed_by,
                                customer.as_ref(),
                                owner.as_ref(),
                            )
                            .await;
                    }
                }
            }
            .instrument(tracing::Span::current()),
        );
    }
}

enum BookingChange {
    Created,
    StatusChanged {
        previous: OrderStatus,
        changed_by: String,
    },
}

/// Lookups that fail only cost the corresponding email
async fn lookup_user(users: &dyn UserRepository, id: &str) -> Option<User> {
    match users.find_by_id(id).await {
        Ok(user) => user,
        Err(e) => {
            crate::warn_with_trace!(user_id = %id, error = %e, "Could not load user for notification");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateStoreRequest, CreateStoreServiceRequest, RegisterRequest, Store};
    use crate::services::mailer::{EmailMessage, Mailer, MailerError};
    use async_trait::async_trait;
    use mockall::{mock, predicate::*};
    use rust_decimal_macros::dec;

    mock! {
        TestOrderRepository {}

        #[async_trait]
        impl OrderRepository for TestOrderRepository {
            async fn create(&self, order: ServiceOrder) -> Result<ServiceOrder, RepositoryError>;
            async fn find_by_id(&self, id: &str) -> Result<Option<ServiceOrder>, RepositoryError>;
            async fn find_by_customer(&self, customer_id: &str) -> Result<Vec<ServiceOrder>, RepositoryError>;
            async fn find_by_store_owner(&self, owner_id: &str) -> Result<Vec<ServiceOrder>, RepositoryError>;
            async fn find_all(&self) -> Result<Vec<ServiceOrder>, RepositoryError>;
            async fn update_status(
                &self,
                id: &str,
                expected: OrderStatus,
                new_status: OrderStatus,
                reason: Option<String>,
            ) -> Result<ServiceOrder, RepositoryError>;
        }
    }

    mock! {
        TestStoreRepository {}

        #[async_trait]
        impl StoreRepository for TestStoreRepository {
            async fn find_all(&self, active_only: bool) -> Result<Vec<Store>, RepositoryError>;
            async fn find_by_id(&self, id: &str) -> Result<Option<Store>, RepositoryError>;
            async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Store>, RepositoryError>;
            async fn create(&self, store: Store) -> Result<Store, RepositoryError>;
            async fn update(&self, store: Store) -> Result<Store, RepositoryError>;
            async fn soft_delete(&self, id: &str) -> Result<(), RepositoryError>;
        }
    }

    mock! {
        TestUserRepository {}

        #[async_trait]
        impl UserRepository for TestUserRepository {
            async fn find_by_id(&self, id: &str) -> Result<Option<User>, RepositoryError>;
            async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
            async fn create(&self, user: User) -> Result<User, RepositoryError>;
            async fn update(&self, user: User) -> Result<User, RepositoryError>;
            async fn find_all(&self) -> Result<Vec<User>, RepositoryError>;
        }
    }

    const CUSTOMER: &str = "Ucust0001";
    const OWNER: &str = "Uowner001";

    fn actor(user_id: &str, role: Role) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: user_id.to_string(),
            role,
        }
    }

    fn test_store() -> Store {
        let mut store = Store::new(
            OWNER.to_string(),
            CreateStoreRequest {
                name: "Shear Joy".to_string(),
                address: "12 Market Street".to_string(),
                description: None,
                phone: None,
                services: vec![
                    CreateStoreServiceRequest {
                        name: "Haircut".to_string(),
                        price: dec!(25.00),
                        duration_minutes: 30,
                    },
                    CreateStoreServiceRequest {
                        name: "Beard Trim".to_string(),
                        price: dec!(12.50),
                        duration_minutes: 15,
                    },
                ],
            },
        );
        store.id = "Sstore001".to_string();
        store
    }

    fn test_order(status: OrderStatus) -> ServiceOrder {
        let store = test_store();
        let services = store.services.iter().map(OrderedService::from).collect();
        let mut order = ServiceOrder::new(
            CUSTOMER.to_string(),
            &store,
            services,
            Utc::now() + Duration::days(2),
            None,
        );
        order.id = "Oorder001".to_string();
        order.status = status;
        order
    }

    fn quiet_users() -> MockTestUserRepository {
        let mut users = MockTestUserRepository::new();
        users.expect_find_by_id().returning(|_| Ok(None));
        users
    }

    fn service(
        orders: MockTestOrderRepository,
        stores: MockTestStoreRepository,
        users: MockTestUserRepository,
    ) -> OrderService {
        OrderService::new(
            Arc::new(orders),
            Arc::new(stores),
            Arc::new(users),
            Arc::new(NotificationService::disabled()),
        )
    }

    fn create_request(service_ids: Vec<String>) -> CreateOrderRequest {
        CreateOrderRequest {
            store_id: "Sstore001".to_string(),
            service_ids,
            scheduled_at: Utc::now() + Duration::days(1),
            notes: Some("Window seat".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_order_snapshots_services_and_totals() {
        let store = test_store();
        let service_ids: Vec<String> = store.services.iter().map(|s| s.id.clone()).collect();

        let mut stores = MockTestStoreRepository::new();
        stores
            .expect_find_by_id()
            .with(eq("Sstore001".to_string()))
            .returning(move |_| Ok(Some(store.clone())));

        let mut orders = MockTestOrderRepository::new();
        orders.expect_create().times(1).returning(|order| Ok(order));

        let service = service(orders, stores, quiet_users());
        let order = service
            .create_order(&actor(CUSTOMER, Role::Customer), create_request(service_ids))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.customer_id, CUSTOMER);
        assert_eq!(order.store_owner_id, OWNER);
        assert_eq!(order.store_name, "Shear Joy");
        assert_eq!(order.services.len(), 2);
        assert_eq!(order.total_price, dec!(37.50));
        assert_eq!(order.total_duration_minutes, 45);
    }

    #[tokio::test]
    async fn test_create_order_rejects_suppliers() {
        let service = service(
            MockTestOrderRepository::new(),
            MockTestStoreRepository::new(),
            MockTestUserRepository::new(),
        );

        let result = service
            .create_order(
                &actor(OWNER, Role::Supplier),
                create_request(vec!["Vabc12345".to_string()]),
            )
            .await;
        assert!(matches!(result, Err(ServiceError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn test_create_order_unknown_service() {
        let store = test_store();
        let mut stores = MockTestStoreRepository::new();
        stores
            .expect_find_by_id()
            .returning(move |_| Ok(Some(store.clone())));
        let mut orders = MockTestOrderRepository::new();
        orders.expect_create().times(0);

        let service = service(orders, stores, MockTestUserRepository::new());
        let result = service
            .create_order(
                &actor(CUSTOMER, Role::Customer),
                create_request(vec!["Vmissing1".to_string()]),
            )
            .await;

        assert!(matches!(
            result,
            Err(ServiceError::ServiceOfferingNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_order_inactive_store() {
        let mut store = test_store();
        store.soft_delete();
        let service_id = store.services[0].id.clone();

        let mut stores = MockTestStoreRepository::new();
        stores
            .expect_find_by_id()
            .returning(move |_| Ok(Some(store.clone())));

        let service = service(
            MockTestOrderRepository::new(),
            stores,
            MockTestUserRepository::new(),
        );
        let result = service
            .create_order(&actor(CUSTOMER, Role::Customer), create_request(vec![service_id]))
            .await;

        assert!(matches!(result, Err(ServiceError::StoreInactive { .. })));
    }

    #[tokio::test]
    async fn test_list_orders_is_role_filtered_and_sorted() {
        let mut later = test_order(OrderStatus::Pending);
        later.scheduled_at = Utc::now() + Duration::days(5);
        let sooner = test_order(OrderStatus::Completed);

        let mut orders = MockTestOrderRepository::new();
        orders
            .expect_find_by_store_owner()
            .with(eq(OWNER.to_string()))
            .times(2)
            .returning(move |_| Ok(vec![later.clone(), sooner.clone()]));
        orders.expect_find_by_customer().times(0);
        orders.expect_find_all().times(0);

        let service = service(orders, MockTestStoreRepository::new(), quiet_users());
        let supplier = actor(OWNER, Role::Supplier);

        let all = service.list_orders(&supplier, None).await.unwrap();
        assert_eq!(all.total_count, 2);
        assert_eq!(all.orders[0].status, OrderStatus::Completed);

        let pending = service
            .list_orders(&supplier, Some(OrderStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.total_count, 1);
    }

    #[tokio::test]
    async fn test_get_order_forbidden_for_strangers() {
        let mut orders = MockTestOrderRepository::new();
        orders
            .expect_find_by_id()
            .returning(|_| Ok(Some(test_order(OrderStatus::Pending))));

        let service = service(orders, MockTestStoreRepository::new(), quiet_users());

        assert!(service
            .get_order(&actor(CUSTOMER, Role::Customer), "Oorder001")
            .await
            .is_ok());
        assert!(service
            .get_order(&actor("Uadmin001", Role::Admin), "Oorder001")
            .await
            .is_ok());
        assert!(matches!(
            service
                .get_order(&actor("Ustranger", Role::Customer), "Oorder001")
                .await,
            Err(ServiceError::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn test_customer_cannot_complete_order() {
        let mut orders = MockTestOrderRepository::new();
        orders
            .expect_find_by_id()
            .returning(|_| Ok(Some(test_order(OrderStatus::Pending))));
        orders.expect_update_status().times(0);

        let service = service(orders, MockTestStoreRepository::new(), quiet_users());
        let result = service
            .update_status(
                &actor(CUSTOMER, Role::Customer),
                "Oorder001",
                UpdateOrderStatusRequest {
                    status: OrderStatus::Completed,
                    reason: None,
                },
            )
            .await;

        assert!(matches!(result, Err(ServiceError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn test_customer_cancels_with_reason() {
        let mut orders = MockTestOrderRepository::new();
        orders
            .expect_find_by_id()
            .returning(|_| Ok(Some(test_order(OrderStatus::Pending))));
        orders
            .expect_update_status()
            .with(
                eq("Oorder001".to_string()),
                eq(OrderStatus::Pending),
                eq(OrderStatus::Cancelled),
                eq(Some("Feeling unwell".to_string())),
            )
            .times(1)
            .returning(|_, _, status, reason| {
                let mut order = test_order(OrderStatus::Pending);
                order.apply_status(status, reason);
                Ok(order)
            });

        let service = service(orders, MockTestStoreRepository::new(), quiet_users());
        let order = service
            .update_status(
                &actor(CUSTOMER, Role::Customer),
                "Oorder001",
                UpdateOrderStatusRequest {
                    status: OrderStatus::Cancelled,
                    reason: Some("Feeling unwell".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.cancellation_reason.as_deref(), Some("Feeling unwell"));
    }

    #[tokio::test]
    async fn test_terminal_orders_cannot_transition() {
        let mut orders = MockTestOrderRepository::new();
        orders
            .expect_find_by_id()
            .returning(|_| Ok(Some(test_order(OrderStatus::Completed))));
        orders.expect_update_status().times(0);

        let service = service(orders, MockTestStoreRepository::new(), quiet_users());
        let result = service
            .update_status(
                &actor(OWNER, Role::Supplier),
                "Oorder001",
                UpdateOrderStatusRequest {
                    status: OrderStatus::Cancelled,
                    reason: None,
                },
            )
            .await;

        assert!(matches!(
            result,
            Err(ServiceError::InvalidStatusTransition {
                from: OrderStatus::Completed,
                to: OrderStatus::Cancelled,
            })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_transition_loses() {
        let mut orders = MockTestOrderRepository::new();
        let mut reads = 0;
        orders.expect_find_by_id().times(2).returning(move |_| {
            reads += 1;
            let status = if reads == 1 {
                OrderStatus::Pending
            } else {
                OrderStatus::Cancelled
            };
            Ok(Some(test_order(status)))
        });
        orders.expect_update_status().times(1).returning(|_, _, _, _| {
            Err(RepositoryError::ConditionalCheckFailed {
                message: "status changed".to_string(),
            })
        });

        let service = service(orders, MockTestStoreRepository::new(), quiet_users());
        let result = service
            .update_status(
                &actor(OWNER, Role::Supplier),
                "Oorder001",
                UpdateOrderStatusRequest {
                    status: OrderStatus::Completed,
                    reason: None,
                },
            )
            .await;

        assert!(matches!(
            result,
            Err(ServiceError::InvalidStatusTransition {
                from: OrderStatus::Cancelled,
                to: OrderStatus::Completed,
            })
        ));
    }

    #[tokio::test]
    async fn test_notifications_per_role() {
        let pending = test_order(OrderStatus::Pending);
        let mut recent = test_order(OrderStatus::Completed);
        recent.id = "Orecent01".to_string();
        let mut stale = test_order(OrderStatus::Cancelled);
        stale.id = "Ostale001".to_string();
        stale.updated_at = Utc::now() - Duration::days(30);

        let customer_orders = vec![pending.clone(), recent.clone(), stale.clone()];
        let owner_orders = customer_orders.clone();

        let mut orders = MockTestOrderRepository::new();
        orders
            .expect_find_by_customer()
            .returning(move |_| Ok(customer_orders.clone()));
        orders
            .expect_find_by_store_owner()
            .returning(move |_| Ok(owner_orders.clone()));

        let service = service(orders, MockTestStoreRepository::new(), quiet_users());

        let customer_feed = service
            .notifications(&actor(CUSTOMER, Role::Customer))
            .await
            .unwrap();
        let ids: Vec<&str> = customer_feed.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"Oorder001"));
        assert!(ids.contains(&"Orecent01"));

        let supplier_feed = service
            .notifications(&actor(OWNER, Role::Supplier))
            .await
            .unwrap();
        assert_eq!(supplier_feed.len(), 1);
        assert_eq!(supplier_feed[0].status, OrderStatus::Pending);
    }

    struct StalledMailer {
        started: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl Mailer for StalledMailer {
        async fn send(&self, _message: &EmailMessage) -> Result<(), MailerError> {
            self.started.notify_one();
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_create_order_does_not_wait_for_mail_relay() {
        let store = test_store();
        let service_ids: Vec<String> = store.services.iter().map(|s| s.id.clone()).collect();

        let mut stores = MockTestStoreRepository::new();
        stores
            .expect_find_by_id()
            .returning(move |_| Ok(Some(store.clone())));

        let mut orders = MockTestOrderRepository::new();
        orders.expect_create().times(1).returning(|order| Ok(order));

        let mut users = MockTestUserRepository::new();
        users.expect_find_by_id().returning(|id| {
            let mut user = User::new(
                RegisterRequest {
                    name: "Pat".to_string(),
                    email: "pat@example.com".to_string(),
                    password: "unused-password".to_string(),
                    role: Role::Customer,
                    phone: None,
                },
                "hash".to_string(),
            );
            user.id = id.to_string();
            Ok(Some(user))
        });

        let started = Arc::new(tokio::sync::Notify::new());
        let notifier = NotificationService::new(
            Some(Arc::new(StalledMailer {
                started: started.clone(),
            })),
            3,
        );
        let service = OrderService::new(
            Arc::new(orders),
            Arc::new(stores),
            Arc::new(users),
            Arc::new(notifier),
        );

        let order = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            service.create_order(&actor(CUSTOMER, Role::Customer), create_request(service_ids)),
        )
        .await
        .expect("booking must not wait on email delivery")
        .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);

        tokio::time::timeout(std::time::Duration::from_secs(5), started.notified())
            .await
            .expect("fan-out still runs in the background");
    }
}
