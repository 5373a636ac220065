use chrono::{Duration as ChronoDuration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

use cutmate::models::{
    AuthenticatedUser, CreateOrderRequest, CreateStoreRequest, CreateStoreServiceRequest,
    OrderedService, Role, ServiceOrder, Store,
};
use cutmate::repositories::{OrderRepository, StoreRepository};
use cutmate::services::{NotificationService, OrderService, StoreDirectory};

#[path = "../tests/common/memory.rs"]
mod memory;

use memory::{MemoryOrderRepository, MemoryStoreRepository, MemoryUserRepository};

const OWNER_COUNT: usize = 10;

fn owner_id(i: usize) -> String {
    format!("U{:08}", i % OWNER_COUNT)
}

fn customer(i: usize) -> AuthenticatedUser {
    AuthenticatedUser {
        user_id: format!("C{:08}", i),
        role: Role::Customer,
    }
}

fn sample_store(i: usize) -> Store {
    Store::new(
        owner_id(i),
        CreateStoreRequest {
            name: format!("Benchmark Salon {}", i),
            address: format!("{} Benchmark Avenue", i + 1),
            description: Some("Cuts, colour and styling".to_string()),
            phone: None,
            services: vec![
                CreateStoreServiceRequest {
                    name: "Haircut".to_string(),
                    price: dec!(25.00),
                    duration_minutes: 30,
                },
                CreateStoreServiceRequest {
                    name: "Colour".to_string(),
                    price: dec!(60.50),
                    duration_minutes: 90,
                },
            ],
        },
    )
}

struct Fixture {
    service: OrderService,
    stores: Vec<Store>,
}

/// `size` stores spread over a few owners, each with one pending order
fn fixture(rt: &Runtime, size: usize) -> Fixture {
    let store_repo = Arc::new(MemoryStoreRepository::default());
    let order_repo = Arc::new(MemoryOrderRepository::default());

    let stores = rt.block_on(async {
        let mut stores = Vec::with_capacity(size);
        for i in 0..size {
            let store = store_repo.create(sample_store(i)).await.unwrap();
            let services = store.services.iter().map(OrderedService::from).collect();
            let order = ServiceOrder::new(
                customer(i % 50).user_id,
                &store,
                services,
                Utc::now() + ChronoDuration::days((i % 30) as i64 + 1),
                None,
            );
            order_repo.create(order).await.unwrap();
            stores.push(store);
        }
        stores
    });

    let service = OrderService::new(
        order_repo,
        store_repo,
        Arc::new(MemoryUserRepository::default()),
        Arc::new(NotificationService::disabled()),
    );

    Fixture { service, stores }
}

fn bench_order_create(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("order_create");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(5));

    let fixture = fixture(&rt, 100);
    let store = &fixture.stores[0];
    let service_ids: Vec<String> = store.services.iter().map(|s| s.id.clone()).collect();

    group.bench_function("two_services", |b| {
        b.iter(|| {
            rt.block_on(async {
                let request = CreateOrderRequest {
                    store_id: store.id.clone(),
                    service_ids: service_ids.clone(),
                    scheduled_at: Utc::now() + ChronoDuration::days(3),
                    notes: Some("Benchmark booking".to_string()),
                };
                black_box(
                    fixture
                        .service
                        .create_order(&customer(1), request)
                        .await
                        .unwrap(),
                )
            })
        });
    });

    group.finish();
}

fn bench_role_filtered_reads(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("order_role_filtered_reads");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(5));

    for dataset_size in [100, 500, 1000].iter() {
        let fixture = fixture(&rt, *dataset_size);
        let supplier = AuthenticatedUser {
            user_id: owner_id(0),
            role: Role::Supplier,
        };
        let admin = AuthenticatedUser {
            user_id: "A00000001".to_string(),
            role: Role::Admin,
        };

        group.bench_with_input(
            BenchmarkId::new("supplier_list", dataset_size),
            dataset_size,
            |b, _| {
                b.iter(|| {
                    rt.block_on(async {
                        black_box(fixture.service.list_orders(&supplier, None).await.unwrap())
                    })
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("customer_notifications", dataset_size),
            dataset_size,
            |b, _| {
                b.iter(|| {
                    rt.block_on(async {
                        black_box(fixture.service.notifications(&customer(7)).await.unwrap())
                    })
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("admin_list", dataset_size),
            dataset_size,
            |b, _| {
                b.iter(|| {
                    rt.block_on(async {
                        black_box(fixture.service.list_orders(&admin, None).await.unwrap())
                    })
                });
            },
        );
    }

    group.finish();
}

fn bench_store_search(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("store_search");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(5));

    for dataset_size in [100, 1000].iter() {
        let repository = Arc::new(MemoryStoreRepository::default());
        rt.block_on(async {
            for i in 0..*dataset_size {
                repository.create(sample_store(i)).await.unwrap();
            }
        });
        let directory = StoreDirectory::new(repository);

        group.bench_with_input(
            BenchmarkId::new("search_term", dataset_size),
            dataset_size,
            |b, _| {
                b.iter(|| {
                    rt.block_on(async {
                        black_box(directory.list_stores(Some("salon 4")).await.unwrap())
                    })
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_order_create,
    bench_role_filtered_reads,
    bench_store_search
);
criterion_main!(benches);
