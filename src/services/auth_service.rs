use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use tracing::instrument;

use crate::models::{
    normalize_email, AuthToken, AuthenticatedUser, Claims, LoginRequest, RegisterRequest,
    RepositoryError, Role, ServiceError, ServiceResult, User, UserResponse, Validate,
};
use crate::repositories::UserRepository;
use crate::services::insert_with_fresh_id;

/// Token signing settings
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_ttl_hours: u32,
}

/// Registration, password login and access-token verification
pub struct AuthService {
    repository: Arc<dyn UserRepository>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: Duration,
}

impl AuthService {
    pub fn new(repository: Arc<dyn UserRepository>, settings: AuthSettings) -> Self {
        Self {
            repository,
            encoding_key: EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
            token_ttl: Duration::hours(i64::from(settings.token_ttl_hours.max(1))),
        }
    }

    #[instrument(skip(self, request), fields(email = %request.email, role = %request.role))]
    pub async fn register(&self, request: RegisterRequest) -> ServiceResult<User> {
        request.validate()?;
        self.create_user(request).await
    }

    /// Make sure an admin account exists for `email`, creating it or
    /// promoting the existing user. Used at startup.
    #[instrument(skip(self, password))]
    pub async fn ensure_admin(&self, name: &str, email: &str, password: &str) -> ServiceResult<User> {
        if let Some(mut user) = self.repository.find_by_email(&normalize_email(email)).await? {
            if user.role.is_admin() {
                return Ok(user);
            }
            user.set_role(Role::Admin);
            crate::info_with_trace!(user_id = %user.id, "Promoting bootstrap user to admin");
            return Ok(self.repository.update(user).await?);
        }

        let request = RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            role: Role::Customer,
            phone: None,
        };
        request.validate()?;

        let mut user = self.create_user(request).await?;
        user.set_role(Role::Admin);
        Ok(self.repository.update(user).await?)
    }

    async fn create_user(&self, request: RegisterRequest) -> ServiceResult<User> {
        let email = normalize_email(&request.email);
        if self.repository.find_by_email(&email).await?.is_some() {
            crate::warn_with_trace!("Registration rejected, email already in use");
            return Err(ServiceError::EmailAlreadyRegistered { email });
        }

        let password_hash = hash_password(&request.password)?;
        let user = match insert_with_fresh_id(User::new(request, password_hash), |user| {
            self.repository.create(user)
        })
        .await
        {
            Ok(user) => user,
            Err(RepositoryError::ConstraintViolation { .. }) => {
                crate::warn_with_trace!("Registration rejected, email claimed concurrently");
                return Err(ServiceError::EmailAlreadyRegistered { email });
            }
            Err(e) => return Err(e.into()),
        };

        crate::info_with_trace!(user_id = %user.id, "User registered");
        Ok(user)
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: LoginRequest) -> ServiceResult<AuthToken> {
        request.validate()?;

        let user = self
            .repository
            .find_by_email(&normalize_email(&request.email))
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !verify_password(&request.password, &user.password_hash) {
            crate::warn_with_trace!(user_id = %user.id, "Login rejected, wrong password");
            return Err(ServiceError::InvalidCredentials);
        }

        let token = self.issue_token(&user)?;
        crate::info_with_trace!(user_id = %user.id, "User logged in");
        Ok(token)
    }

    pub fn issue_token(&self, user: &User) -> ServiceResult<AuthToken> {
        let issued_at = Utc::now();
        let expires_at = issued_at + self.token_ttl;
        let claims = Claims {
            sub: user.id.clone(),
            role: user.role,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Configuration {
                message: format!("Failed to sign access token: {}", e),
            })?;

        Ok(AuthToken {
            access_token,
            token_type: "Bearer".to_string(),
            expires_at: Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .unwrap_or(expires_at),
            user: UserResponse::from(user.clone()),
        })
    }

    /// Check signature and expiry; any failure is `Unauthorized`
    pub fn verify_token(&self, token: &str) -> ServiceResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| ServiceError::unauthorized(format!("Invalid access token: {}", e)))
    }

    /// Verify the token, then resolve the caller against the stored account.
    /// The stored role wins over the role claim, so role changes and
    /// removed accounts apply to tokens that are already issued.
    pub async fn authenticate(&self, token: &str) -> ServiceResult<AuthenticatedUser> {
        let claims = self.verify_token(token)?;

        let user = self
            .repository
            .find_by_id(&claims.sub)
            .await?
            .ok_or_else(|| ServiceError::unauthorized("Account no longer exists"))?;

        if user.role != claims.role {
            crate::info_with_trace!(
                user_id = %user.id,
                token_role = %claims.role,
                role = %user.role,
                "Access token role is stale, using stored role"
            );
        }

        Ok(AuthenticatedUser {
            user_id: user.id,
            role: user.role,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, id: &str) -> ServiceResult<User> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::UserNotFound { id: id.to_string() })
    }

    #[instrument(skip(self, actor), fields(actor = %actor.user_id))]
    pub async fn list_users(&self, actor: &AuthenticatedUser) -> ServiceResult<Vec<User>> {
        require_admin(actor)?;

        let mut users = self.repository.find_all().await?;
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    #[instrument(skip(self, actor), fields(actor = %actor.user_id))]
    pub async fn update_role(
        &self,
        actor: &AuthenticatedUser,
        user_id: &str,
        role: Role,
    ) -> ServiceResult<User> {
        require_admin(actor)?;

        let mut user = self.get_user(user_id).await?;
        user.set_role(role);
        let user = self.repository.update(user).await?;

        crate::info_with_trace!(user_id = %user.id, role = %user.role, "User role updated");
        Ok(user)
    }
}

pub(crate) fn require_admin(actor: &AuthenticatedUser) -> ServiceResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::forbidden("Administrator role required"))
    }
}

fn hash_password(password: &str) -> ServiceResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServiceError::Configuration {
            message: format!("Failed to hash password: {}", e),
        })
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}
