use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{generate_id, Role};

/// Registered account. The password hash is an argon2 PHC string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public view of a user, without credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default = "default_register_role")]
    pub role: Role,
    pub phone: Option<String>,
}

fn default_register_role() -> Role {
    Role::Customer
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

/// Issued on successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserResponse,
}

/// JWT claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Identity of the caller, taken from a verified access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// True for the given user or any admin
    pub fn can_act_for(&self, user_id: &str) -> bool {
        self.is_admin() || self.user_id == user_id
    }
}

impl User {
    pub fn new(request: RegisterRequest, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id('U'),
            name: request.name.trim().to_string(),
            email: normalize_email(&request.email),
            password_hash,
            role: request.role,
            phone: request
                .phone
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_role(&mut self, role: Role) {
        self.role = role;
        self.updated_at = Utc::now();
    }
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            phone: user.phone,
            created_at: user.created_at,
        }
    }
}

/// Emails are stored and looked up trimmed and lower-cased
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_request() -> RegisterRequest {
        RegisterRequest {
            name: "  Dana Lee ".to_string(),
            email: " Dana@Example.COM ".to_string(),
            password: "correct-horse".to_string(),
            role: Role::Customer,
            phone: Some("   ".to_string()),
        }
    }

    #[test]
    fn test_user_creation_normalizes_fields() {
        let user = User::new(register_request(), "hash".to_string());

        assert!(user.id.starts_with('U'));
        assert_eq!(user.id.len(), 9);
        assert_eq!(user.name, "Dana Lee");
        assert_eq!(user.email, "dana@example.com");
        assert_eq!(user.phone, None);
        assert_eq!(user.created_at, user.updated_at);
    }

    #[test]
    fn test_user_response_hides_password_hash() {
        let user = User::new(register_request(), "secret-hash".to_string());
        let response: UserResponse = user.into();

        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(json.contains("\"role\":1"));
    }

    #[test]
    fn test_register_request_defaults_to_customer() {
        let json = r#"{"name":"A","email":"a@b.co","password":"password1"}"#;
        let request: RegisterRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.role, Role::Customer);
    }
}
