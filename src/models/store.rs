use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::generate_id;

/// A salon or service provider listed in the directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub id: String,
    pub name: String,
    pub address: String,
    pub owner_id: String,
    pub description: Option<String>,
    pub phone: Option<String>,
    pub services: Vec<StoreService>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A bookable offering of a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreService {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStoreRequest {
    pub name: String,
    pub address: String,
    pub description: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub services: Vec<CreateStoreServiceRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateStoreRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStoreServiceRequest {
    pub name: String,
    pub price: Decimal,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreListQuery {
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreListResponse {
    pub stores: Vec<Store>,
    pub total_count: usize,
}

impl Store {
    pub fn new(owner_id: String, request: CreateStoreRequest) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id('S'),
            name: request.name.trim().to_string(),
            address: request.address.trim().to_string(),
            owner_id,
            description: request.description,
            phone: request.phone,
            services: request.services.into_iter().map(StoreService::new).collect(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update(&mut self, request: UpdateStoreRequest) {
        if let Some(name) = request.name {
            self.name = name.trim().to_string();
        }
        if let Some(address) = request.address {
            self.address = address.trim().to_string();
        }
        if let Some(description) = request.description {
            self.description = Some(description);
        }
        if let Some(phone) = request.phone {
            self.phone = Some(phone);
        }
        if let Some(is_active) = request.is_active {
            self.is_active = is_active;
        }
        self.updated_at = Utc::now();
    }

    pub fn soft_delete(&mut self) {
        self.is_active = false;
        self.updated_at = Utc::now();
    }

    pub fn add_service(&mut self, request: CreateStoreServiceRequest) -> StoreService {
        let service = StoreService::new(request);
        self.services.push(service.clone());
        self.updated_at = Utc::now();
        service
    }

    /// Returns false when no offering with that id exists
    pub fn remove_service(&mut self, service_id: &str) -> bool {
        let before = self.services.len();
        self.services.retain(|s| s.id != service_id);
        let removed = self.services.len() != before;
        if removed {
            self.updated_at = Utc::now();
        }
        removed
    }

    pub fn find_service(&self, service_id: &str) -> Option<&StoreService> {
        self.services.iter().find(|s| s.id == service_id)
    }

    /// Case-insensitive match on name, address or any offering name
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        self.name.to_lowercase().contains(&term)
            || self.address.to_lowercase().contains(&term)
            || self
                .services
                .iter()
                .any(|s| s.name.to_lowercase().contains(&term))
    }
}

impl StoreService {
    pub fn new(request: CreateStoreServiceRequest) -> Self {
        Self {
            id: generate_id('V'),
            name: request.name.trim().to_string(),
            price: request.price,
            duration_minutes: request.duration_minutes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn create_request() -> CreateStoreRequest {
        CreateStoreRequest {
            name: "Shear Joy".to_string(),
            address: "12 Market Street".to_string(),
            description: Some("Neighbourhood salon".to_string()),
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
        }
    }

    #[test]
    fn test_store_creation() {
        let store = Store::new("Uowner001".to_string(), create_request());

        assert!(store.id.starts_with('S'));
        assert_eq!(store.owner_id, "Uowner001");
        assert_eq!(store.services.len(), 2);
        assert!(store.services.iter().all(|s| s.id.starts_with('V')));
        assert!(store.is_active);
    }

    #[test]
    fn test_add_and_remove_service() {
        let mut store = Store::new("Uowner001".to_string(), create_request());
        let added = store.add_service(CreateStoreServiceRequest {
            name: "Colour".to_string(),
            price: dec!(80.00),
            duration_minutes: 90,
        });

        assert_eq!(store.services.len(), 3);
        assert_eq!(store.find_service(&added.id), Some(&added));

        assert!(store.remove_service(&added.id));
        assert!(!store.remove_service(&added.id));
        assert_eq!(store.services.len(), 2);
    }

    #[test]
    fn test_matches_search() {
        let store = Store::new("Uowner001".to_string(), create_request());

        assert!(store.matches_search("shear"));
        assert!(store.matches_search("MARKET"));
        assert!(store.matches_search("beard"));
        assert!(store.matches_search(""));
        assert!(!store.matches_search("nails"));
    }

    #[test]
    fn test_update_and_soft_delete() {
        let mut store = Store::new("Uowner001".to_string(), create_request());
        store.update(UpdateStoreRequest {
            name: Some(" New Name ".to_string()),
            ..Default::default()
        });
        assert_eq!(store.name, "New Name");
        assert_eq!(store.address, "12 Market Street");

        store.soft_delete();
        assert!(!store.is_active);
    }
}
