// Repositories module - data access layer

mod dynamodb;
pub mod order_repository;
pub mod quiz_repository;
pub mod store_repository;
pub mod table_manager;
pub mod user_repository;

pub use order_repository::{DynamoDbOrderRepository, OrderRepository};
pub use quiz_repository::{DynamoDbQuizRepository, QuizRepository};
pub use store_repository::{DynamoDbStoreRepository, StoreRepository};
pub use table_manager::{TableManager, TableNames};
pub use user_repository::{DynamoDbUserRepository, UserRepository};
