use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashSet;

use super::{
    CreateOrderRequest, CreateStoreRequest, CreateStoreServiceRequest, LoginRequest,
    RegisterRequest, Role, SubmitQuizRequest, UpdateOrderStatusRequest, UpdateStoreRequest,
    ValidationError, ValidationResult,
};

/// Trait for validating input models
pub trait Validate {
    fn validate(&self) -> ValidationResult<()>;
}

/// Validation constants
pub const MAX_USER_NAME_LENGTH: usize = 100;
pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;
pub const MAX_STORE_NAME_LENGTH: usize = 120;
pub const MIN_ADDRESS_LENGTH: usize = 5;
pub const MAX_ADDRESS_LENGTH: usize = 300;
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;
pub const MAX_SERVICE_NAME_LENGTH: usize = 100;
pub const MIN_PRICE: Decimal = Decimal::from_parts(1, 0, 0, false, 2); // 0.01
pub const MAX_PRICE: Decimal = Decimal::from_parts(999999, 0, 0, false, 2); // 9999.99
pub const MIN_DURATION_MINUTES: u32 = 5;
pub const MAX_DURATION_MINUTES: u32 = 600;
pub const MAX_SERVICES_PER_ORDER: usize = 10;
pub const MAX_NOTES_LENGTH: usize = 500;
pub const MAX_REASON_LENGTH: usize = 500;
pub const MAX_QUIZ_ANSWERS: usize = 20;
pub const MAX_ANSWER_LENGTH: usize = 500;

impl Validate for RegisterRequest {
    fn validate(&self) -> ValidationResult<()> {
        validate_user_name(&self.name)?;
        validate_email(&self.email)?;
        validate_password(&self.password)?;
        if self.role == Role::Admin {
            return Err(ValidationError::InvalidValue {
                field: "role".to_string(),
                value: self.role.as_tag().to_string(),
                reason: "Administrators cannot self-register".to_string(),
            });
        }
        Ok(())
    }
}

impl Validate for LoginRequest {
    fn validate(&self) -> ValidationResult<()> {
        if self.email.trim().is_empty() {
            return Err(ValidationError::RequiredField {
                field: "email".to_string(),
            });
        }
        if self.password.is_empty() {
            return Err(ValidationError::RequiredField {
                field: "password".to_string(),
            });
        }
        Ok(())
    }
}

impl Validate for CreateStoreRequest {
    fn validate(&self) -> ValidationResult<()> {
        validate_store_name(&self.name)?;
        validate_address(&self.address)?;
        validate_description(&self.description)?;
        for service in &self.services {
            service.validate()?;
        }
        Ok(())
    }
}

impl Validate for UpdateStoreRequest {
    fn validate(&self) -> ValidationResult<()> {
        if let Some(name) = &self.name {
            validate_store_name(name)?;
        }
        if let Some(address) = &self.address {
            validate_address(address)?;
        }
        validate_description(&self.description)?;
        Ok(())
    }
}

impl Validate for CreateStoreServiceRequest {
    fn validate(&self) -> ValidationResult<()> {
        validate_length("service_name", &self.name, 1, MAX_SERVICE_NAME_LENGTH)?;
        validate_price(&self.price)?;
        validate_duration(self.duration_minutes)?;
        Ok(())
    }
}

impl Validate for CreateOrderRequest {
    fn validate(&self) -> ValidationResult<()> {
        validate_prefixed_id("store_id", &self.store_id, 'S')?;

        if self.service_ids.is_empty() {
            return Err(ValidationError::RequiredField {
                field: "service_ids".to_string(),
            });
        }

        if self.service_ids.len() > MAX_SERVICES_PER_ORDER {
            return Err(ValidationError::OutOfRange {
                field: "service_ids".to_string(),
                min: "1".to_string(),
                max: MAX_SERVICES_PER_ORDER.to_string(),
                value: self.service_ids.len().to_string(),
            });
        }

        let mut seen = HashSet::new();
        for (index, service_id) in self.service_ids.iter().enumerate() {
            validate_prefixed_id(&format!("service_ids[{}]", index), service_id, 'V')?;
            if !seen.insert(service_id.as_str()) {
                return Err(ValidationError::InvalidValue {
                    field: "service_ids".to_string(),
                    value: service_id.clone(),
                    reason: "Duplicate service found".to_string(),
                });
            }
        }

        if self.scheduled_at <= Utc::now() {
            return Err(ValidationError::InvalidValue {
                field: "scheduled_at".to_string(),
                value: self.scheduled_at.to_rfc3339(),
                reason: "Appointments must be scheduled in the future".to_string(),
            });
        }

        if let Some(notes) = &self.notes {
            validate_max_length("notes", notes, MAX_NOTES_LENGTH)?;
        }

        Ok(())
    }
}

impl Validate for UpdateOrderStatusRequest {
    fn validate(&self) -> ValidationResult<()> {
        if let Some(reason) = &self.reason {
            validate_max_length("reason", reason, MAX_REASON_LENGTH)?;
        }
        Ok(())
    }
}

impl Validate for SubmitQuizRequest {
    fn validate(&self) -> ValidationResult<()> {
        if self.answers.is_empty() {
            return Err(ValidationError::RequiredField {
                field: "answers".to_string(),
            });
        }

        if self.answers.len() > MAX_QUIZ_ANSWERS {
            return Err(ValidationError::OutOfRange {
                field: "answers".to_string(),
                min: "1".to_string(),
                max: MAX_QUIZ_ANSWERS.to_string(),
                value: self.answers.len().to_string(),
            });
        }

        let mut seen = HashSet::new();
        for (index, answer) in self.answers.iter().enumerate() {
            validate_prefixed_id(
                &format!("answers[{}].question_id", index),
                &answer.question_id,
                'Q',
            )?;
            if !seen.insert(answer.question_id.as_str()) {
                return Err(ValidationError::InvalidValue {
                    field: "answers".to_string(),
                    value: answer.question_id.clone(),
                    reason: "Question answered more than once".to_string(),
                });
            }
            validate_length(
                &format!("answers[{}].answer", index),
                &answer.answer,
                1,
                MAX_ANSWER_LENGTH,
            )?;
        }

        Ok(())
    }
}

/// Validate a display name
pub fn validate_user_name(name: &str) -> ValidationResult<()> {
    validate_length("name", name, 1, MAX_USER_NAME_LENGTH)?;

    if name
        .chars()
        .any(|c| c.is_control() && c != '\n' && c != '\r' && c != '\t')
    {
        return Err(ValidationError::InvalidValue {
            field: "name".to_string(),
            value: name.to_string(),
            reason: "Contains invalid control characters".to_string(),
        });
    }

    Ok(())
}

/// Validate an email address: one `@`, non-empty local part, dotted domain
pub fn validate_email(email: &str) -> ValidationResult<()> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::RequiredField {
            field: "email".to_string(),
        });
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong {
            field: "email".to_string(),
            max_length: MAX_EMAIL_LENGTH,
            actual_length: trimmed.len(),
        });
    }

    let invalid = || ValidationError::InvalidFormat {
        field: "email".to_string(),
        expected: "local@domain.tld".to_string(),
    };

    let mut parts = trimmed.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => (local, domain),
        _ => return Err(invalid()),
    };

    if local.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return Err(invalid());
    }

    Ok(())
}

/// Validate password length
pub fn validate_password(password: &str) -> ValidationResult<()> {
    let length = password.chars().count();

    if length < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort {
            field: "password".to_string(),
            min_length: MIN_PASSWORD_LENGTH,
            actual_length: length,
        });
    }

    if length > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong {
            field: "password".to_string(),
            max_length: MAX_PASSWORD_LENGTH,
            actual_length: length,
        });
    }

    Ok(())
}

pub fn validate_store_name(name: &str) -> ValidationResult<()> {
    validate_length("store_name", name, 1, MAX_STORE_NAME_LENGTH)
}

pub fn validate_address(address: &str) -> ValidationResult<()> {
    validate_length("address", address, MIN_ADDRESS_LENGTH, MAX_ADDRESS_LENGTH)
}

fn validate_description(description: &Option<String>) -> ValidationResult<()> {
    if let Some(description) = description {
        validate_max_length("description", description, MAX_DESCRIPTION_LENGTH)?;
    }
    Ok(())
}

/// Validate an offering price
pub fn validate_price(price: &Decimal) -> ValidationResult<()> {
    if *price < MIN_PRICE || *price > MAX_PRICE {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: MIN_PRICE.to_string(),
            max: MAX_PRICE.to_string(),
            value: price.to_string(),
        });
    }

    // Check for reasonable decimal places (max 2)
    if price.normalize().scale() > 2 {
        return Err(ValidationError::InvalidValue {
            field: "price".to_string(),
            value: price.to_string(),
            reason: "Price cannot have more than 2 decimal places".to_string(),
        });
    }

    Ok(())
}

pub fn validate_duration(duration_minutes: u32) -> ValidationResult<()> {
    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&duration_minutes) {
        return Err(ValidationError::OutOfRange {
            field: "duration_minutes".to_string(),
            min: MIN_DURATION_MINUTES.to_string(),
            max: MAX_DURATION_MINUTES.to_string(),
            value: duration_minutes.to_string(),
        });
    }
    Ok(())
}

/// Validate an identifier of the form `<prefix><alphanumeric...>`.
/// Ids are looked up verbatim, so surrounding whitespace is rejected.
pub fn validate_prefixed_id(field: &str, id: &str, prefix: char) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::RequiredField {
            field: field.to_string(),
        });
    }

    if !id.starts_with(prefix)
        || id.len() < 2
        || !id[1..].chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            expected: format!("{} followed by alphanumeric characters", prefix),
        });
    }

    Ok(())
}

fn validate_length(field: &str, value: &str, min: usize, max: usize) -> ValidationResult<()> {
    let trimmed = value.trim();
    let length = trimmed.chars().count();

    if length == 0 {
        return Err(ValidationError::RequiredField {
            field: field.to_string(),
        });
    }

    if length < min {
        return Err(ValidationError::TooShort {
            field: field.to_string(),
            min_length: min,
            actual_length: length,
        });
    }

    if length > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max_length: max,
            actual_length: length,
        });
    }

    Ok(())
}

fn validate_max_length(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let length = value.trim().chars().count();
    if length > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max_length: max,
            actual_length: length,
        });
    }
    Ok(())
}
