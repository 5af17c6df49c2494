use crate::{
    auth::{hash_password, verify_password},
    entities::user,
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

lazy_static! {
    static ref PHONE_RE: Regex = Regex::new(r"^\+?1?\d{9,15}$").expect("valid phone regex");
    static ref TAG_RE: Regex = Regex::new(r"<[^>]*>").expect("valid tag regex");
}

const EMAIL_IN_USE: &str = "This email is already in use.";

fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    if phone.trim().is_empty() || PHONE_RE.is_match(phone.trim()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("phone");
        err.message = Some(
            "Phone number must be entered in the format: '+999999999'. Up to 15 digits allowed."
                .into(),
        );
        Err(err)
    }
}

fn validate_optional_email(email: &str) -> Result<(), ValidationError> {
    if email.trim().is_empty() || validator::validate_email(email.trim()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("email");
        err.message = Some("Enter a valid email address.".into());
        Err(err)
    }
}

/// Removes HTML tags and surrounding whitespace; blank results become `None`.
pub fn strip_tags(value: Option<String>) -> Option<String> {
    value
        .map(|v| TAG_RE.replace_all(&v, "").trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterInput {
    #[validate(
        email(message = "Enter a valid email address."),
        length(max = 254, message = "Email must be at most 254 characters.")
    )]
    #[serde(deserialize_with = "super::trimmed")]
    pub email: String,
    #[validate(length(min = 1, max = 50, message = "First name must be 1-50 characters."))]
    #[serde(deserialize_with = "super::trimmed")]
    pub first_name: String,
    #[validate(length(min = 1, max = 50, message = "Last name must be 1-50 characters."))]
    #[serde(deserialize_with = "super::trimmed")]
    pub last_name: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters."))]
    pub password1: String,
    pub password2: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LoginInput {
    #[validate(length(min = 1, message = "This field is required."))]
    pub email: String,
    #[validate(length(min = 1, message = "This field is required."))]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateAccountInput {
    #[validate(length(min = 1, max = 50, message = "First name must be 1-50 characters."))]
    #[serde(deserialize_with = "super::trimmed")]
    pub first_name: String,
    #[validate(length(min = 1, max = 50, message = "Last name must be 1-50 characters."))]
    #[serde(deserialize_with = "super::trimmed")]
    pub last_name: String,
    /// Blank keeps the current email
    #[serde(default)]
    #[validate(custom = "validate_optional_email")]
    pub email: Option<String>,
    #[serde(default)]
    #[validate(custom = "validate_phone")]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub address1: Option<String>,
    #[serde(default)]
    pub address2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
}

/// Public view of a user account
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub company: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    pub phone: Option<String>,
    pub is_staff: bool,
    pub date_joined: chrono::DateTime<Utc>,
}

impl From<user::Model> for UserProfile {
    fn from(u: user::Model) -> Self {
        let full_name = u.full_name();
        Self {
            id: u.id,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            full_name,
            company: u.company,
            address1: u.address1,
            address2: u.address2,
            city: u.city,
            country: u.country,
            province: u.province,
            postal_code: u.postal_code,
            phone: u.phone,
            is_staff: u.is_staff,
            date_joined: u.date_joined,
        }
    }
}

#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    pub async fn find(&self, user_id: Uuid) -> Result<Option<user::Model>, ServiceError> {
        Ok(user::Entity::find_by_id(user_id).one(&*self.db).await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, ServiceError> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(normalize_email(email)))
            .one(&*self.db)
            .await?)
    }

    /// Creates an active, non-staff account. Expects `input` to be validated.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: RegisterInput) -> Result<user::Model, ServiceError> {
        if self.find_by_email(&input.email).await?.is_some() {
            return Err(ServiceError::ValidationError(EMAIL_IN_USE.to_string()));
        }
        if input.password1 != input.password2 {
            return Err(ServiceError::ValidationError(
                "The two password fields didn't match.".to_string(),
            ));
        }

        let password_hash = hash_password(&input.password1)?;
        let user = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(normalize_email(&input.email)),
            password_hash: Set(password_hash),
            first_name: Set(input.first_name.trim().to_string()),
            last_name: Set(input.last_name.trim().to_string()),
            company: Set(None),
            address1: Set(None),
            address2: Set(None),
            city: Set(None),
            country: Set(None),
            province: Set(None),
            postal_code: Set(None),
            phone: Set(None),
            is_active: Set(true),
            is_staff: Set(false),
            date_joined: Set(Utc::now()),
            last_login: Set(None),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::UserRegistered(user.id))
            .await;
        info!(user_id = %user.id, "registered user");
        Ok(user)
    }

    /// Checks credentials and stamps `last_login`.
    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<user::Model, ServiceError> {
        let invalid = || ServiceError::Unauthorized("Invalid email or password.".to_string());

        let user = self.find_by_email(email).await?.ok_or_else(invalid)?;
        if !verify_password(password, &user.password_hash) {
            warn!(user_id = %user.id, "failed login attempt");
            return Err(invalid());
        }
        if !user.is_active {
            return Err(ServiceError::Forbidden(
                "This account is inactive.".to_string(),
            ));
        }

        let mut active: user::ActiveModel = user.into();
        active.last_login = Set(Some(Utc::now()));
        let user = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::UserLoggedIn(user.id))
            .await;
        Ok(user)
    }

    /// Applies account form changes. Expects `input` to be validated.
    #[instrument(skip(self, input))]
    pub async fn update_account(
        &self,
        user_id: Uuid,
        input: UpdateAccountInput,
    ) -> Result<user::Model, ServiceError> {
        let user = self
            .find(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

        let email = match input.email.as_deref().map(str::trim) {
            Some(e) if !e.is_empty() => {
                let normalized = normalize_email(e);
                if normalized != user.email {
                    if let Some(other) = self.find_by_email(&normalized).await? {
                        if other.id != user.id {
                            return Err(ServiceError::ValidationError(EMAIL_IN_USE.to_string()));
                        }
                    }
                }
                normalized
            }
            _ => user.email.clone(),
        };

        let mut active: user::ActiveModel = user.into();
        active.first_name = Set(input.first_name.trim().to_string());
        active.last_name = Set(input.last_name.trim().to_string());
        active.email = Set(email);
        active.phone = Set(input
            .phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty()));
        active.company = Set(strip_tags(input.company));
        active.address1 = Set(strip_tags(input.address1));
        active.address2 = Set(strip_tags(input.address2));
        active.city = Set(strip_tags(input.city));
        active.country = Set(strip_tags(input.country));
        active.province = Set(strip_tags(input.province));
        active.postal_code = Set(strip_tags(input.postal_code));

        let updated = active.update(&*self.db).await?;
        info!(user_id = %updated.id, "account updated");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_tags_removes_markup_and_blanks() {
        assert_eq!(
            strip_tags(Some("<b>Main</b> Street 5".into())),
            Some("Main Street 5".into())
        );
        assert_eq!(strip_tags(Some("  <i></i> ".into())), None);
        assert_eq!(strip_tags(None), None);
    }

    #[test]
    fn phone_format() {
        assert!(validate_phone("+994501234567").is_ok());
        assert!(validate_phone("123456789").is_ok());
        assert!(validate_phone("").is_ok());
        assert!(validate_phone("12-34").is_err());
        assert!(validate_phone("+1234567890123456").is_ok());
        assert!(validate_phone("+12345678901234567").is_err());
    }

    #[test]
    fn register_form_rules() {
        let valid = RegisterInput {
            email: "ayla@example.com".into(),
            first_name: "Ayla".into(),
            last_name: "Karimova".into(),
            password1: "s3cret-pass".into(),
            password2: "s3cret-pass".into(),
        };
        assert!(valid.validate().is_ok());

        let short = RegisterInput {
            password1: "short".into(),
            ..valid.clone()
        };
        assert!(short.validate().is_err());

        let long_name = RegisterInput {
            first_name: "x".repeat(51),
            ..valid
        };
        assert!(long_name.validate().is_err());
    }

    #[test]
    fn update_form_allows_blank_email_and_phone() {
        let input = UpdateAccountInput {
            first_name: "Ayla".into(),
            last_name: "Karimova".into(),
            email: Some(String::new()),
            phone: Some(String::new()),
            ..Default::default()
        };
        assert!(input.validate().is_ok());

        let bad_email = UpdateAccountInput {
            email: Some("not-an-email".into()),
            ..input
        };
        assert!(bad_email.validate().is_err());
    }
}
