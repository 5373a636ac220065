//! In-memory repositories backing the test server and benchmarks.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cutmate::models::{
    OrderStatus, Quiz, QuizCategory, QuizQuestion, RepositoryError, RepositoryResult,
    ServiceOrder, Store, User,
};
use cutmate::repositories::{OrderRepository, QuizRepository, StoreRepository, UserRepository};

#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<HashMap<String, User>>,
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_id(&self, id: &str) -> RepositoryResult<Option<User>> {
        Ok(self.users.lock().unwrap().get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn create(&self, user: User) -> RepositoryResult<User> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|existing| existing.email == user.email) {
            return Err(RepositoryError::ConstraintViolation {
                message: format!("email {} is already registered", user.email),
            });
        }
        if users.contains_key(&user.id) {
            return Err(RepositoryError::ConditionalCheckFailed {
                message: format!("user {} exists", user.id),
            });
        }
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn update(&self, user: User) -> RepositoryResult<User> {
        let mut users = self.users.lock().unwrap();
        if !users.contains_key(&user.id) {
            return Err(RepositoryError::NotFound);
        }
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn find_all(&self) -> RepositoryResult<Vec<User>> {
        Ok(self.users.lock().unwrap().values().cloned().collect())
    }
}

#[derive(Default)]
pub struct MemoryStoreRepository {
    stores: Mutex<HashMap<String, Store>>,
}

#[async_trait]
impl StoreRepository for MemoryStoreRepository {
    async fn find_all(&self, active_only: bool) -> RepositoryResult<Vec<Store>> {
        Ok(self
            .stores
            .lock()
            .unwrap()
            .values()
            .filter(|store| !active_only || store.is_active)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: &str) -> RepositoryResult<Option<Store>> {
        Ok(self.stores.lock().unwrap().get(id).cloned())
    }

    async fn find_by_owner(&self, owner_id: &str) -> RepositoryResult<Vec<Store>> {
        Ok(self
            .stores
            .lock()
            .unwrap()
            .values()
            .filter(|store| store.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn create(&self, store: Store) -> RepositoryResult<Store> {
        self.stores
            .lock()
            .unwrap()
            .insert(store.id.clone(), store.clone());
        Ok(store)
    }

    async fn update(&self, store: Store) -> RepositoryResult<Store> {
        let mut stores = self.stores.lock().unwrap();
        if !stores.contains_key(&store.id) {
            return Err(RepositoryError::NotFound);
        }
        stores.insert(store.id.clone(), store.clone());
        Ok(store)
    }

    async fn soft_delete(&self, id: &str) -> RepositoryResult<()> {
        let mut stores = self.stores.lock().unwrap();
        let store = stores.get_mut(id).ok_or(RepositoryError::NotFound)?;
        store.soft_delete();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryOrderRepository {
    orders: Mutex<HashMap<String, ServiceOrder>>,
}

#[async_trait]
impl OrderRepository for MemoryOrderRepository {
    async fn create(&self, mut order: ServiceOrder) -> RepositoryResult<ServiceOrder> {
        order.refresh_derived_fields();
        self.orders
            .lock()
            .unwrap()
            .insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn find_by_id(&self, id: &str) -> RepositoryResult<Option<ServiceOrder>> {
        Ok(self.orders.lock().unwrap().get(id).cloned())
    }

    async fn find_by_customer(&self, customer_id: &str) -> RepositoryResult<Vec<ServiceOrder>> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .values()
            .filter(|order| order.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn find_by_store_owner(&self, owner_id: &str) -> RepositoryResult<Vec<ServiceOrder>> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .values()
            .filter(|order| order.store_owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn find_all(&self) -> RepositoryResult<Vec<ServiceOrder>> {
        Ok(self.orders.lock().unwrap().values().cloned().collect())
    }

    async fn update_status(
        &self,
        id: &str,
        expected: OrderStatus,
        new_status: OrderStatus,
        reason: Option<String>,
    ) -> RepositoryResult<ServiceOrder> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if order.status != expected {
            return Err(RepositoryError::ConditionalCheckFailed {
                message: format!("order {} is {}", id, order.status),
            });
        }
        order.apply_status(new_status, reason);
        Ok(order.clone())
    }
}

#[derive(Default)]
pub struct MemoryQuizRepository {
    questions: Mutex<Vec<QuizQuestion>>,
    quizzes: Mutex<HashMap<String, Quiz>>,
}

#[async_trait]
impl QuizRepository for MemoryQuizRepository {
    async fn find_questions(&self, category: QuizCategory) -> RepositoryResult<Vec<QuizQuestion>> {
        Ok(self
            .questions
            .lock()
            .unwrap()
            .iter()
            .filter(|question| question.category == category)
            .cloned()
            .collect())
    }

    async fn save_question(&self, question: QuizQuestion) -> RepositoryResult<QuizQuestion> {
        self.questions.lock().unwrap().push(question.clone());
        Ok(question)
    }

    async fn create_quiz(&self, quiz: Quiz) -> RepositoryResult<Quiz> {
        self.quizzes
            .lock()
            .unwrap()
            .insert(quiz.id.clone(), quiz.clone());
        Ok(quiz)
    }

    async fn find_quiz(&self, id: &str) -> RepositoryResult<Option<Quiz>> {
        Ok(self.quizzes.lock().unwrap().get(id).cloned())
    }

    async fn find_quizzes_by_user(&self, user_id: &str) -> RepositoryResult<Vec<Quiz>> {
        Ok(self
            .quizzes
            .lock()
            .unwrap()
            .values()
            .filter(|quiz| quiz.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn save_feedback(
        &self,
        id: &str,
        feedback: &str,
        generated_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let mut quizzes = self.quizzes.lock().unwrap();
        let quiz = quizzes.get_mut(id).ok_or(RepositoryError::NotFound)?;
        quiz.feedback = Some(feedback.to_string());
        quiz.feedback_generated_at = Some(generated_at);
        Ok(())
    }
}
